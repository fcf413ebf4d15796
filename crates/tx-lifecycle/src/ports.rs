use crate::types::{
    CoinType,
    TxMeta,
    TxReceipt,
};
use serde_json::Value;

/// Key-value store holding the persisted transaction documents.
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the document stored under `key`, if any.
    async fn get(&self, key: &str) -> anyhow::Result<Option<Value>>;

    /// Replaces the document stored under `key`.
    async fn set(&self, key: &str, value: Value) -> anyhow::Result<()>;
}

/// Network queries of one coin type.
#[async_trait::async_trait]
pub trait ChainRpc: Send + Sync {
    /// Number of transactions sent from `address`, i.e. its next network nonce.
    async fn get_transaction_count(
        &self,
        address: &str,
        chain_id: &str,
    ) -> anyhow::Result<u64>;

    /// Receipt of the transaction, or `None` while it is not included.
    async fn get_transaction_receipt(
        &self,
        tx_hash: &str,
        chain_id: &str,
    ) -> anyhow::Result<Option<TxReceipt>>;

    async fn get_block_number(&self, chain_id: &str) -> anyhow::Result<u64>;

    /// Broadcasts a signed transaction and returns its hash.
    async fn send_transaction(
        &self,
        chain_id: &str,
        signed_tx: &[u8],
    ) -> anyhow::Result<String>;
}

/// Signs transactions with keys held outside of this crate.
pub trait TxSigner: Send + Sync {
    fn sign_transaction(&self, coin: CoinType, meta: &TxMeta) -> anyhow::Result<Vec<u8>>;
}
