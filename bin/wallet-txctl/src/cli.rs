use crate::offline::{
    NoKeys,
    OfflineRpc,
};
use anyhow::Context;
use clap::{
    Args,
    Parser,
};
use std::{
    env,
    path::PathBuf,
    str::FromStr,
    sync::Arc,
};
use tracing_subscriber::{
    EnvFilter,
    Layer,
    layer::SubscriberExt,
    registry,
};
use wallet_tx_lifecycle::{
    CoinType,
    Config,
    TransactionStatus,
    TxManager,
    TxMeta,
    TxService,
    store::FileStore,
};

pub const LOG_FILTER: &str = "RUST_LOG";
pub const HUMAN_LOGGING: &str = "HUMAN_LOGGING";

pub fn init_logging() -> anyhow::Result<()> {
    let filter = match env::var_os(LOG_FILTER) {
        Some(_) => EnvFilter::try_from_default_env()
            .context("Invalid `RUST_LOG` provided")?,
        None => EnvFilter::new("info"),
    };

    let human_logging = match env::var(HUMAN_LOGGING) {
        Ok(raw) => bool::from_str(&raw).with_context(|| {
            format!("Expected `true` or `false` to be provided for `{HUMAN_LOGGING}`")
        })?,
        Err(_) => true,
    };

    let layer = tracing_subscriber::fmt::Layer::default().with_writer(std::io::stderr);
    let fmt = if human_logging {
        layer.with_ansi(true).with_level(true).boxed()
    } else {
        layer.with_ansi(false).with_level(true).json().boxed()
    };

    let subscriber = registry::Registry::default().with(filter).with(fmt);
    tracing::subscriber::set_global_default(subscriber)
        .context("setting global default failed")?;
    Ok(())
}

#[derive(Debug, Args)]
pub struct StoreArgs {
    /// Directory holding the transaction documents.
    #[arg(long = "store-dir", env = "WALLET_TX_STORE_DIR")]
    pub store_dir: PathBuf,

    /// Directory holding the legacy preferences. Defaults to the store.
    #[arg(long = "prefs-dir", env = "WALLET_TX_PREFS_DIR")]
    pub prefs_dir: Option<PathBuf>,
}

impl StoreArgs {
    /// Opens the stores and loads every coin, migrating legacy data first.
    async fn open_service(&self) -> anyhow::Result<TxService> {
        let store = Arc::new(FileStore::open(&self.store_dir).await?);
        let prefs = match &self.prefs_dir {
            Some(dir) => Arc::new(FileStore::open(dir).await?),
            None => store.clone(),
        };

        let mut service = TxService::new(store, prefs, Config::default());
        for coin in [CoinType::Ethereum, CoinType::Solana, CoinType::Filecoin] {
            service.register_coin(coin, Arc::new(OfflineRpc), Arc::new(NoKeys))?;
        }
        service.initialize().await?;
        Ok(service)
    }
}

#[derive(Debug, Args)]
pub struct ListCommand {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long, value_parser = CoinType::from_str)]
    pub coin: CoinType,

    #[arg(long = "chain-id")]
    pub chain_id: Option<String>,

    #[arg(long)]
    pub from: Option<String>,

    #[arg(long, value_parser = TransactionStatus::from_str)]
    pub status: Option<TransactionStatus>,
}

#[derive(Debug, Args)]
pub struct ShowCommand {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long, value_parser = CoinType::from_str)]
    pub coin: CoinType,

    #[arg(long = "chain-id")]
    pub chain_id: String,

    #[arg(long)]
    pub id: String,
}

#[derive(Debug, Args)]
pub struct WipeCommand {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Only wipe this coin.
    #[arg(long, value_parser = CoinType::from_str)]
    pub coin: Option<CoinType>,
}

/// Inspect and maintain a wallet transaction store
#[derive(Debug, Parser)]
#[command(name = "wallet-txctl", version)]
pub enum Command {
    /// Print the transactions of a coin as JSON.
    List(ListCommand),
    /// Print one transaction as JSON.
    Show(ShowCommand),
    /// Print how many transactions wait for approval.
    CountPending(StoreArgs),
    /// Delete stored transactions.
    Wipe(WipeCommand),
    /// Copy legacy preference transactions into the store.
    Migrate(StoreArgs),
}

impl Command {
    pub async fn exec(&self) -> anyhow::Result<()> {
        match self {
            Command::List(cmd) => {
                let service = cmd.store.open_service().await?;
                let txs: Vec<TxMeta> = service
                    .get_all_transaction_info(
                        cmd.coin,
                        cmd.chain_id.as_deref(),
                        cmd.from.as_deref(),
                    )?
                    .into_iter()
                    .filter(|meta| cmd.status.is_none_or(|status| meta.status == status))
                    .collect();
                print_json(&txs)
            }
            Command::Show(cmd) => {
                let service = cmd.store.open_service().await?;
                let meta = service
                    .get_transaction_info(cmd.coin, &cmd.chain_id, &cmd.id)?
                    .with_context(|| {
                        format!("transaction {} not found on {}", cmd.id, cmd.chain_id)
                    })?;
                print_json(&[meta])
            }
            Command::CountPending(store) => {
                let service = store.open_service().await?;
                println!("{}", service.get_pending_transactions_count());
                Ok(())
            }
            Command::Wipe(cmd) => {
                let service = cmd.store.open_service().await?;
                match cmd.coin {
                    Some(coin) => service.manager(coin)?.reset().await,
                    None => service.reset().await,
                }
                Ok(())
            }
            Command::Migrate(store) => {
                // Opening the service runs the migration.
                store.open_service().await?;
                Ok(())
            }
        }
    }
}

fn print_json(txs: &[TxMeta]) -> anyhow::Result<()> {
    let values = txs
        .iter()
        .map(TxMeta::to_value)
        .collect::<Result<Vec<_>, _>>()?;
    println!("{}", serde_json::to_string_pretty(&values)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_list_filters() {
        let command = Command::try_parse_from([
            "wallet-txctl",
            "list",
            "--store-dir",
            "/tmp/wallet",
            "--coin",
            "eth",
            "--status",
            "submitted",
        ])
        .unwrap();

        let Command::List(list) = command else {
            panic!("expected the list command");
        };
        assert_eq!(list.coin, CoinType::Ethereum);
        assert_eq!(list.status, Some(TransactionStatus::Submitted));
        assert_eq!(list.chain_id, None);
    }

    #[test]
    fn rejects_unknown_coin() {
        let result = Command::try_parse_from([
            "wallet-txctl",
            "count-pending",
            "--store-dir",
            "/tmp/wallet",
        ]);
        assert!(result.is_ok());

        let result = Command::try_parse_from([
            "wallet-txctl",
            "list",
            "--store-dir",
            "/tmp/wallet",
            "--coin",
            "doge",
        ]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn wipe_then_count_on_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = StoreArgs {
            store_dir: dir.path().to_path_buf(),
            prefs_dir: None,
        };

        Command::Wipe(WipeCommand {
            store,
            coin: Some(CoinType::Ethereum),
        })
        .exec()
        .await
        .unwrap();

        let service = StoreArgs {
            store_dir: dir.path().to_path_buf(),
            prefs_dir: None,
        }
        .open_service()
        .await
        .unwrap();
        assert_eq!(service.get_pending_transactions_count(), 0);
        assert!(dir.path().join("transactions.ethereum.json").exists());
    }
}
