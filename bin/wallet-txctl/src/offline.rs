use anyhow::anyhow;
use wallet_tx_lifecycle::{
    CoinType,
    TxMeta,
    TxReceipt,
    ports::{
        ChainRpc,
        TxSigner,
    },
};

/// Network access for a tool that never talks to a node.
pub struct OfflineRpc;

#[async_trait::async_trait]
impl ChainRpc for OfflineRpc {
    async fn get_transaction_count(&self, _: &str, _: &str) -> anyhow::Result<u64> {
        Err(anyhow!("offline"))
    }

    async fn get_transaction_receipt(
        &self,
        _: &str,
        _: &str,
    ) -> anyhow::Result<Option<TxReceipt>> {
        Err(anyhow!("offline"))
    }

    async fn get_block_number(&self, _: &str) -> anyhow::Result<u64> {
        Err(anyhow!("offline"))
    }

    async fn send_transaction(&self, _: &str, _: &[u8]) -> anyhow::Result<String> {
        Err(anyhow!("offline"))
    }
}

/// The inspector holds no keys.
pub struct NoKeys;

impl TxSigner for NoKeys {
    fn sign_transaction(&self, coin: CoinType, meta: &TxMeta) -> anyhow::Result<Vec<u8>> {
        Err(anyhow!("no key available to sign {} on {coin}", meta.id))
    }
}
