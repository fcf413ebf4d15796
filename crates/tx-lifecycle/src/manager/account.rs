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
    nonce_tracker::NonceTracker,
    ports::{
        ChainRpc,
        KeyValueStore,
        TxSigner,
    },
    state_manager::TxStateManager,
    types::CoinType,
};
use std::sync::Arc;

/// Manager of a nonce ordered coin, Ethereum or Filecoin.
pub struct AccountTxManager {
    core: ManagerCore,
    nonce_tracker: NonceTracker,
}

impl AccountTxManager {
    pub fn new(
        coin: CoinType,
        store: Arc<dyn KeyValueStore>,
        rpc: Arc<dyn ChainRpc>,
        signer: Arc<dyn TxSigner>,
        events: EventBus,
        config: Config,
    ) -> Result<Self> {
        if !coin.is_account_based() {
            return Err(Error::Unsupported("nonce tracking", coin))
        }
        let (core, nonce_tracker) =
            ManagerCore::new(coin, store, rpc, signer, events, config);
        Ok(Self {
            core,
            nonce_tracker,
        })
    }

    pub fn nonce_tracker(&self) -> &NonceTracker {
        &self.nonce_tracker
    }
}

#[async_trait::async_trait]
impl TxManager for AccountTxManager {
    fn coin(&self) -> CoinType {
        self.core.state().coin()
    }

    fn state(&self) -> &TxStateManager {
        self.core.state()
    }

    async fn add_unapproved_transaction(&self, tx: NewTransaction) -> Result<String> {
        self.core.add_unapproved_transaction(tx).await
    }

    async fn approve_transaction(&self, chain_id: &str, id: &str) -> Result<()> {
        self.core
            .approve_transaction(chain_id, id, Some(&self.nonce_tracker))
            .await
    }

    async fn reject_transaction(&self, chain_id: &str, id: &str) -> Result<()> {
        self.core.reject_transaction(chain_id, id).await
    }

    async fn speedup_or_cancel_transaction(
        &self,
        chain_id: &str,
        id: &str,
        cancel: bool,
    ) -> Result<String> {
        self.core
            .speedup_or_cancel_transaction(chain_id, id, cancel)
            .await
    }

    async fn retry_transaction(&self, chain_id: &str, id: &str) -> Result<String> {
        self.core.retry_transaction(chain_id, id).await
    }

    async fn set_gas_price_and_limit_for_unapproved_transaction(
        &self,
        chain_id: &str,
        id: &str,
        gas_price: &str,
        gas_limit: &str,
    ) -> Result<()> {
        self.core
            .set_gas_price_and_limit(chain_id, id, gas_price, gas_limit)
            .await
    }

    async fn set_gas_fee_and_limit_for_unapproved_transaction(
        &self,
        chain_id: &str,
        id: &str,
        max_priority_fee_per_gas: &str,
        max_fee_per_gas: &str,
        gas_limit: &str,
    ) -> Result<()> {
        self.core
            .set_gas_fee_and_limit(
                chain_id,
                id,
                max_priority_fee_per_gas,
                max_fee_per_gas,
                gas_limit,
            )
            .await
    }

    async fn set_data_for_unapproved_transaction(
        &self,
        chain_id: &str,
        id: &str,
        data: Vec<u8>,
    ) -> Result<()> {
        self.core.set_data(chain_id, id, data).await
    }

    async fn set_nonce_for_unapproved_transaction(
        &self,
        chain_id: &str,
        id: &str,
        nonce: Option<u64>,
    ) -> Result<()> {
        self.core.set_nonce(chain_id, id, nonce).await
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
