//! One-time move of the legacy preference document into the per coin
//! documents of the transaction store.

use crate::{
    ports::KeyValueStore,
    types::CoinType,
};
use anyhow::Context;
use serde_json::{
    Map,
    Value,
};

/// Preference flag set once the migration ran.
pub const MIGRATED_FLAG_KEY: &str = "wallet.transactions.migrated_to_db";
/// Legacy document shaped `{coin: {network_id: {tx_id: record}}}`.
pub const LEGACY_TRANSACTIONS_KEY: &str = "wallet.transactions";

/// Copies the legacy transactions into the store, once.
///
/// Records that lack a `chain_id` get the one of the network they were
/// filed under. Records already in the store are kept. The legacy document
/// itself is left untouched. Returns whether anything was copied.
pub async fn migrate_transactions_from_prefs_to_db(
    prefs: &dyn KeyValueStore,
    store: &dyn KeyValueStore,
) -> anyhow::Result<bool> {
    let migrated = prefs.get(MIGRATED_FLAG_KEY).await?;
    if migrated.as_ref().and_then(Value::as_bool) == Some(true) {
        return Ok(false)
    }

    let Some(legacy) = prefs.get(LEGACY_TRANSACTIONS_KEY).await? else {
        prefs.set(MIGRATED_FLAG_KEY, Value::Bool(true)).await?;
        return Ok(false)
    };
    let Value::Object(legacy) = legacy else {
        tracing::warn!("legacy transaction document is not an object, skipping it");
        prefs.set(MIGRATED_FLAG_KEY, Value::Bool(true)).await?;
        return Ok(false)
    };

    let mut copied = 0usize;
    for (coin_key, networks) in legacy {
        let Some(coin) = CoinType::from_pref_key(&coin_key) else {
            tracing::warn!(%coin_key, "skipping transactions of unknown coin");
            continue
        };
        let Value::Object(networks) = networks else {
            continue
        };

        let storage_key = coin.storage_key();
        let mut document = match store.get(&storage_key).await? {
            Some(Value::Object(document)) => document,
            _ => Map::new(),
        };
        for (network_id, txs) in networks {
            let Value::Object(txs) = txs else {
                continue
            };
            let chain_id = chain_id_of(coin, &network_id);
            let chain_txs = document
                .entry(chain_id.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            let Some(chain_txs) = chain_txs.as_object_mut() else {
                continue
            };
            for (id, mut record) in txs {
                if let Some(record) = record.as_object_mut() {
                    let has_chain_id = record
                        .get("chain_id")
                        .and_then(Value::as_str)
                        .is_some_and(|chain_id| !chain_id.is_empty());
                    if !has_chain_id {
                        record.insert("chain_id".to_string(), Value::String(chain_id.clone()));
                    }
                }
                if !chain_txs.contains_key(&id) {
                    chain_txs.insert(id, record);
                    copied = copied.saturating_add(1);
                }
            }
        }
        store
            .set(&storage_key, Value::Object(document))
            .await
            .with_context(|| format!("failed to write {storage_key}"))?;
    }

    prefs.set(MIGRATED_FLAG_KEY, Value::Bool(true)).await?;
    tracing::info!(copied, "legacy transactions migrated");
    Ok(true)
}

/// Chain id of a network the legacy document was keyed by. Custom networks
/// were already keyed by their chain id.
fn chain_id_of(coin: CoinType, network_id: &str) -> String {
    let known = match (coin, network_id) {
        (CoinType::Ethereum, "mainnet") => Some("0x1"),
        (CoinType::Ethereum, "goerli") => Some("0x5"),
        (CoinType::Ethereum, "sepolia") => Some("0xaa36a7"),
        (CoinType::Ethereum, "localhost") => Some("0x539"),
        (CoinType::Solana, "mainnet") => Some("0x65"),
        (CoinType::Solana, "testnet") => Some("0x66"),
        (CoinType::Solana, "devnet") => Some("0x67"),
        (CoinType::Solana, "localhost") => Some("0x4"),
        (CoinType::Filecoin, "mainnet") => Some("f"),
        (CoinType::Filecoin, "testnet" | "localhost") => Some("t"),
        _ => None,
    };
    known.unwrap_or(network_id).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(CoinType::Ethereum, "mainnet", "0x1")]
    #[test_case(CoinType::Ethereum, "0x89", "0x89")]
    #[test_case(CoinType::Solana, "devnet", "0x67")]
    #[test_case(CoinType::Filecoin, "testnet", "t")]
    fn chain_id_of_network(coin: CoinType, network_id: &str, expected: &str) {
        assert_eq!(chain_id_of(coin, network_id), expected);
    }
}
