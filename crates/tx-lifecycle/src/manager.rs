//! Per coin transaction managers.
//!
//! Every manager owns the state of one coin type and drives its
//! transactions through approval, signing, broadcast and the pending polls.
//! Account based coins also reserve nonces; signature based ones do not.

use crate::{
    codec::hex_quantity,
    config::Config,
    error::{
        Error,
        Result,
    },
    events::EventBus,
    nonce_tracker::NonceTracker,
    pending_tracker::PendingTxTracker,
    ports::{
        ChainRpc,
        KeyValueStore,
        TxSigner,
    },
    state_manager::TxStateManager,
    types::{
        CoinType,
        Timestamp,
        TransactionStatus,
        TxData,
        TxMeta,
    },
    utils::KeyedMutex,
};
use std::{
    collections::BTreeSet,
    sync::Arc,
};

pub use account::AccountTxManager;
pub use solana::SolanaTxManager;

mod account;
mod solana;

/// Request to create an unapproved transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub chain_id: String,
    pub from: String,
    pub tx: TxData,
    pub origin: Option<String>,
    pub group_id: Option<String>,
}

impl NewTransaction {
    pub fn new(chain_id: impl Into<String>, from: impl Into<String>, tx: TxData) -> Self {
        Self {
            chain_id: chain_id.into(),
            from: from.into(),
            tx,
            origin: None,
            group_id: None,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    fn into_meta(self) -> Result<TxMeta> {
        if self.from.trim().is_empty() {
            return Err(Error::InvalidAddress(self.from))
        }
        let origin = self.origin.as_deref().map(normalize_origin).transpose()?;

        let mut meta = TxMeta::new(self.chain_id, self.from, self.tx);
        meta.origin = origin;
        meta.group_id = self.group_id;
        Ok(meta)
    }
}

/// Reduces a URL to its `scheme://host[:port]` origin.
fn normalize_origin(raw: &str) -> Result<String> {
    let url = url::Url::parse(raw).map_err(|e| Error::InvalidOrigin(format!("{raw}: {e}")))?;
    let origin = url.origin();
    if !origin.is_tuple() {
        return Err(Error::InvalidOrigin(raw.to_string()))
    }
    Ok(origin.ascii_serialization())
}

/// Outcome of one pending poll.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PendingPollResult {
    /// False if a network request failed on any polled chain.
    pub succeeded: bool,
    /// Chains still holding submitted transactions after the poll.
    pub pending_chain_ids: BTreeSet<String>,
}

#[async_trait::async_trait]
pub trait TxManager: Send + Sync {
    fn coin(&self) -> CoinType;

    /// The state owned by this manager.
    fn state(&self) -> &TxStateManager;

    /// Loads the persisted transactions.
    async fn initialize(&self) -> Result<()> {
        self.state().initialize().await
    }

    /// Stores a new unapproved transaction and returns its id.
    async fn add_unapproved_transaction(&self, tx: NewTransaction) -> Result<String>;

    /// Signs and broadcasts an unapproved transaction.
    async fn approve_transaction(&self, chain_id: &str, id: &str) -> Result<()>;

    async fn reject_transaction(&self, chain_id: &str, id: &str) -> Result<()>;

    /// Creates a replacement of a submitted transaction, either paying more
    /// gas or, with `cancel`, sending nothing to the sender itself. Returns
    /// the id of the replacement.
    async fn speedup_or_cancel_transaction(
        &self,
        chain_id: &str,
        id: &str,
        cancel: bool,
    ) -> Result<String>;

    /// Creates a fresh unapproved copy of a failed or dropped transaction.
    async fn retry_transaction(&self, chain_id: &str, id: &str) -> Result<String>;

    /// Sets the legacy gas price and the gas limit of an unapproved
    /// transaction.
    async fn set_gas_price_and_limit_for_unapproved_transaction(
        &self,
        _chain_id: &str,
        _id: &str,
        _gas_price: &str,
        _gas_limit: &str,
    ) -> Result<()> {
        Err(Error::Unsupported("gas price", self.coin()))
    }

    /// Sets the EIP-1559 fees and the gas limit of an unapproved
    /// transaction.
    async fn set_gas_fee_and_limit_for_unapproved_transaction(
        &self,
        _chain_id: &str,
        _id: &str,
        _max_priority_fee_per_gas: &str,
        _max_fee_per_gas: &str,
        _gas_limit: &str,
    ) -> Result<()> {
        Err(Error::Unsupported("gas fee", self.coin()))
    }

    async fn set_data_for_unapproved_transaction(
        &self,
        _chain_id: &str,
        _id: &str,
        _data: Vec<u8>,
    ) -> Result<()> {
        Err(Error::Unsupported("transaction data", self.coin()))
    }

    /// Pins the nonce of an unapproved transaction, or with `None` lets
    /// approval pick the next one.
    async fn set_nonce_for_unapproved_transaction(
        &self,
        _chain_id: &str,
        _id: &str,
        _nonce: Option<u64>,
    ) -> Result<()> {
        Err(Error::Unsupported("custom nonce", self.coin()))
    }

    fn get_transaction_info(&self, chain_id: &str, id: &str) -> Option<TxMeta> {
        self.state().get_tx(chain_id, id)
    }

    fn get_all_transaction_info(
        &self,
        chain_id: Option<&str>,
        from: Option<&str>,
    ) -> Vec<TxMeta> {
        self.state().get_transactions_by_status(chain_id, None, from)
    }

    /// Polls the submitted transactions of `chain_id`, or of every chain
    /// holding some.
    async fn update_pending_transactions(&self, chain_id: Option<&str>)
    -> PendingPollResult;

    /// Chains holding at least one submitted transaction.
    fn pending_chain_ids(&self) -> BTreeSet<String> {
        self.state()
            .get_transactions_by_status(None, Some(TransactionStatus::Submitted), None)
            .into_iter()
            .map(|meta| meta.chain_id)
            .collect()
    }

    async fn block_number(&self, chain_id: &str) -> Result<u64>;

    /// Deletes every transaction and forgets the polling bookkeeping.
    async fn reset(&self);
}

/// Behavior shared by every manager.
pub(crate) struct ManagerCore {
    coin: CoinType,
    state: TxStateManager,
    rpc: Arc<dyn ChainRpc>,
    signer: Arc<dyn TxSigner>,
    pending_tracker: tokio::sync::Mutex<PendingTxTracker>,
    record_locks: KeyedMutex<(String, String)>,
}

impl ManagerCore {
    pub(crate) fn new(
        coin: CoinType,
        store: Arc<dyn KeyValueStore>,
        rpc: Arc<dyn ChainRpc>,
        signer: Arc<dyn TxSigner>,
        events: EventBus,
        config: Config,
    ) -> (Self, NonceTracker) {
        let drop_threshold = config.drop_threshold;
        let state = TxStateManager::new(coin, store, events, config);
        let nonce_tracker = NonceTracker::new(state.clone(), rpc.clone());
        let pending_tracker = PendingTxTracker::new(
            state.clone(),
            rpc.clone(),
            nonce_tracker.clone(),
            drop_threshold,
        );
        let core = Self {
            coin,
            state,
            rpc,
            signer,
            pending_tracker: tokio::sync::Mutex::new(pending_tracker),
            record_locks: KeyedMutex::new(),
        };
        (core, nonce_tracker)
    }

    pub(crate) fn state(&self) -> &TxStateManager {
        &self.state
    }

    pub(crate) async fn add_unapproved_transaction(
        &self,
        tx: NewTransaction,
    ) -> Result<String> {
        let meta = tx.into_meta()?;
        self.state.add_or_update_tx(&meta).await?;
        tracing::debug!(
            coin = %self.coin,
            chain_id = %meta.chain_id,
            tx_id = %meta.id,
            "unapproved transaction added"
        );
        Ok(meta.id)
    }

    /// Approves, signs and broadcasts. With a `nonce_tracker`, a record
    /// without a nonce gets the next one of its sender.
    pub(crate) async fn approve_transaction(
        &self,
        chain_id: &str,
        id: &str,
        nonce_tracker: Option<&NonceTracker>,
    ) -> Result<()> {
        let _record = self.lock_record(chain_id, id).await;
        let mut meta = self.existing_tx(chain_id, id)?;
        expect_status(&meta, &[TransactionStatus::Unapproved], "Unapproved")?;

        // Held until the nonce is visible as submitted, or released by failure.
        let reservation = match nonce_tracker {
            Some(tracker) if meta.nonce().is_none() => {
                Some(tracker.reserve_next_nonce(chain_id, &meta.from).await?)
            }
            _ => None,
        };
        if let Some(reservation) = &reservation {
            meta.tx.nonce = Some(reservation.nonce());
        }

        meta.status = TransactionStatus::Approved;
        self.state.add_or_update_tx(&meta).await?;

        let signed = match self.signer.sign_transaction(self.coin, &meta) {
            Ok(signed) => signed,
            Err(err) => {
                tracing::warn!(%chain_id, tx_id = %id, %err, "failed to sign transaction");
                meta.status = TransactionStatus::Error;
                self.state.add_or_update_tx(&meta).await?;
                return Err(Error::Signing(err.to_string()))
            }
        };
        meta.status = TransactionStatus::Signed;
        self.state.add_or_update_tx(&meta).await?;

        match self.rpc.send_transaction(chain_id, &signed).await {
            Ok(tx_hash) => {
                meta.tx_hash = tx_hash;
                meta.status = TransactionStatus::Submitted;
                meta.submitted_time = Some(Timestamp::now());
                self.state.add_or_update_tx(&meta).await?;
                tracing::info!(
                    coin = %self.coin,
                    %chain_id,
                    tx_id = %id,
                    tx_hash = %meta.tx_hash,
                    nonce = ?meta.nonce(),
                    "transaction submitted"
                );
                Ok(())
            }
            Err(err) => {
                tracing::warn!(%chain_id, tx_id = %id, %err, "failed to broadcast transaction");
                meta.status = TransactionStatus::Error;
                self.state.add_or_update_tx(&meta).await?;
                Err(Error::NetworkUnavailable(err.to_string()))
            }
        }
    }

    pub(crate) async fn reject_transaction(&self, chain_id: &str, id: &str) -> Result<()> {
        let _record = self.lock_record(chain_id, id).await;
        let mut meta = self.existing_tx(chain_id, id)?;
        expect_status(&meta, &[TransactionStatus::Unapproved], "Unapproved")?;

        meta.status = TransactionStatus::Rejected;
        self.state.add_or_update_tx(&meta).await
    }

    pub(crate) async fn speedup_or_cancel_transaction(
        &self,
        chain_id: &str,
        id: &str,
        cancel: bool,
    ) -> Result<String> {
        let _record = self.lock_record(chain_id, id).await;
        let meta = self.existing_tx(chain_id, id)?;
        expect_status(&meta, &[TransactionStatus::Submitted], "Submitted")?;

        let mut tx = meta.tx.clone();
        tx.gas_price = bump_gas_price(&tx.gas_price);
        tx.max_priority_fee_per_gas = tx.max_priority_fee_per_gas.as_deref().map(bump_gas_price);
        tx.max_fee_per_gas = tx.max_fee_per_gas.as_deref().map(bump_gas_price);
        if cancel {
            tx.to = meta.from.clone();
            tx.value = "0x0".to_string();
            tx.data.clear();
        }

        let mut replacement = TxMeta::new(chain_id, meta.from.clone(), tx);
        replacement.origin = meta.origin.clone();
        replacement.group_id = meta.group_id.clone();
        self.state.add_or_update_tx(&replacement).await?;
        tracing::debug!(
            %chain_id,
            tx_id = %id,
            replacement_id = %replacement.id,
            cancel,
            "replacement transaction added"
        );
        Ok(replacement.id)
    }

    pub(crate) async fn retry_transaction(&self, chain_id: &str, id: &str) -> Result<String> {
        let _record = self.lock_record(chain_id, id).await;
        let meta = self.existing_tx(chain_id, id)?;
        expect_status(
            &meta,
            &[TransactionStatus::Error, TransactionStatus::Dropped],
            "Error or Dropped",
        )?;

        let mut tx = meta.tx.clone();
        tx.nonce = None;
        let mut retried = TxMeta::new(chain_id, meta.from.clone(), tx);
        retried.origin = meta.origin.clone();
        retried.group_id = meta.group_id.clone();
        self.state.add_or_update_tx(&retried).await?;
        Ok(retried.id)
    }

    pub(crate) async fn set_gas_price_and_limit(
        &self,
        chain_id: &str,
        id: &str,
        gas_price: &str,
        gas_limit: &str,
    ) -> Result<()> {
        let gas_price = hex_quantity_param("gas_price", gas_price)?;
        let gas_limit = hex_quantity_param("gas_limit", gas_limit)?;
        self.edit_unapproved(chain_id, id, |tx| {
            tx.gas_price = gas_price;
            tx.gas_limit = gas_limit;
        })
        .await
    }

    pub(crate) async fn set_gas_fee_and_limit(
        &self,
        chain_id: &str,
        id: &str,
        max_priority_fee_per_gas: &str,
        max_fee_per_gas: &str,
        gas_limit: &str,
    ) -> Result<()> {
        let max_priority_fee_per_gas =
            hex_quantity_param("max_priority_fee_per_gas", max_priority_fee_per_gas)?;
        let max_fee_per_gas = hex_quantity_param("max_fee_per_gas", max_fee_per_gas)?;
        let gas_limit = hex_quantity_param("gas_limit", gas_limit)?;
        self.edit_unapproved(chain_id, id, |tx| {
            tx.max_priority_fee_per_gas = Some(max_priority_fee_per_gas);
            tx.max_fee_per_gas = Some(max_fee_per_gas);
            tx.gas_limit = gas_limit;
        })
        .await
    }

    pub(crate) async fn set_data(&self, chain_id: &str, id: &str, data: Vec<u8>) -> Result<()> {
        self.edit_unapproved(chain_id, id, |tx| tx.data = data).await
    }

    pub(crate) async fn set_nonce(
        &self,
        chain_id: &str,
        id: &str,
        nonce: Option<u64>,
    ) -> Result<()> {
        self.edit_unapproved(chain_id, id, |tx| tx.nonce = nonce).await
    }

    /// Applies `edit` to the payload of an unapproved transaction.
    async fn edit_unapproved<F>(&self, chain_id: &str, id: &str, edit: F) -> Result<()>
    where
        F: FnOnce(&mut TxData) + Send,
    {
        let _record = self.lock_record(chain_id, id).await;
        let mut meta = self.existing_tx(chain_id, id)?;
        expect_status(&meta, &[TransactionStatus::Unapproved], "Unapproved")?;

        edit(&mut meta.tx);
        self.state.update_unapproved_tx(&meta).await
    }

    pub(crate) async fn update_pending_transactions(
        &self,
        chain_id: Option<&str>,
        pending_chain_ids: BTreeSet<String>,
    ) -> PendingPollResult {
        let chain_ids: Vec<String> = match chain_id {
            Some(chain_id) => vec![chain_id.to_string()],
            None => pending_chain_ids.into_iter().collect(),
        };

        let mut result = PendingPollResult {
            succeeded: true,
            pending_chain_ids: BTreeSet::new(),
        };
        let mut tracker = self.pending_tracker.lock().await;
        for chain_id in chain_ids {
            let succeeded = tracker
                .update_pending_transactions(&chain_id, &mut result.pending_chain_ids)
                .await;
            result.succeeded &= succeeded;
        }
        result
    }

    pub(crate) async fn block_number(&self, chain_id: &str) -> Result<u64> {
        self.rpc
            .get_block_number(chain_id)
            .await
            .map_err(|e| Error::NetworkUnavailable(e.to_string()))
    }

    pub(crate) async fn reset(&self) {
        self.pending_tracker.lock().await.reset();
        self.state.wipe_txs().await;
    }

    async fn lock_record(&self, chain_id: &str, id: &str) -> tokio::sync::OwnedMutexGuard<()> {
        self.record_locks
            .lock((chain_id.to_string(), id.to_string()))
            .await
    }

    fn existing_tx(&self, chain_id: &str, id: &str) -> Result<TxMeta> {
        self.state.get_tx(chain_id, id).ok_or_else(|| Error::NotFound {
            chain_id: chain_id.to_string(),
            id: id.to_string(),
        })
    }
}

fn expect_status(
    meta: &TxMeta,
    allowed: &[TransactionStatus],
    expected: &'static str,
) -> Result<()> {
    if allowed.contains(&meta.status) {
        Ok(())
    } else {
        Err(Error::InvalidStatus {
            id: meta.id.clone(),
            actual: meta.status,
            expected,
        })
    }
}

fn hex_quantity_param(name: &'static str, raw: &str) -> Result<String> {
    match hex_quantity::parse_u128(raw) {
        Some(_) => Ok(raw.to_string()),
        None => Err(Error::InvalidParameter(name, raw.to_string())),
    }
}

/// Raises a hex quantity by 10%, rounding up. Unparsable prices are kept.
pub(crate) fn bump_gas_price(price: &str) -> String {
    match hex_quantity::parse_u128(price) {
        Some(price) => format!("{:#x}", price.saturating_add(price.div_ceil(10))),
        None => price.to_string(),
    }
}
