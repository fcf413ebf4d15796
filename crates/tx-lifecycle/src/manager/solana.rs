use super::{
    ManagerCore,
    NewTransaction,
    PendingPollResult,
    TxManager,
};
use crate::{
    config::Config,
    error::{
        Error,
        Result,
    },
    events::EventBus,
    ports::{
        ChainRpc,
        KeyValueStore,
        TxSigner,
    },
    state_manager::TxStateManager,
    types::CoinType,
};
use std::sync::Arc;

/// Manager of Solana transactions. They carry a recent blockhash instead of
/// a nonce, so nothing is reserved on approval and they can not be replaced.
pub struct SolanaTxManager {
    core: ManagerCore,
}

impl SolanaTxManager {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        rpc: Arc<dyn ChainRpc>,
        signer: Arc<dyn TxSigner>,
        events: EventBus,
        config: Config,
    ) -> Self {
        let (core, _) =
            ManagerCore::new(CoinType::Solana, store, rpc, signer, events, config);
        Self { core }
    }
}

#[async_trait::async_trait]
impl TxManager for SolanaTxManager {
    fn coin(&self) -> CoinType {
        CoinType::Solana
    }

    fn state(&self) -> &TxStateManager {
        self.core.state()
    }

    async fn add_unapproved_transaction(&self, tx: NewTransaction) -> Result<String> {
        self.core.add_unapproved_transaction(tx).await
    }

    async fn approve_transaction(&self, chain_id: &str, id: &str) -> Result<()> {
        self.core.approve_transaction(chain_id, id, None).await
    }

    async fn reject_transaction(&self, chain_id: &str, id: &str) -> Result<()> {
        self.core.reject_transaction(chain_id, id).await
    }

    async fn speedup_or_cancel_transaction(
        &self,
        _chain_id: &str,
        _id: &str,
        cancel: bool,
    ) -> Result<String> {
        let operation = if cancel { "cancel" } else { "speedup" };
        Err(Error::Unsupported(operation, CoinType::Solana))
    }

    async fn retry_transaction(&self, chain_id: &str, id: &str) -> Result<String> {
        self.core.retry_transaction(chain_id, id).await
    }

    async fn update_pending_transactions(
        &self,
        chain_id: Option<&str>,
    ) -> PendingPollResult {
        self.core
            .update_pending_transactions(chain_id, self.pending_chain_ids())
            .await
    }

    async fn block_number(&self, chain_id: &str) -> Result<u64> {
        self.core.block_number(chain_id).await
    }

    async fn reset(&self) {
        self.core.reset().await
    }
}
