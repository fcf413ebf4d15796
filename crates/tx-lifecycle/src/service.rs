//! Entry point routing wallet requests to the manager of their coin type.

use crate::{
    config::Config,
    error::{
        Error,
        Result,
    },
    events::{
        EventBus,
        TxEvent,
        TxObserver,
    },
    manager::{
        AccountTxManager,
        NewTransaction,
        SolanaTxManager,
        TxManager,
    },
    migration::migrate_transactions_from_prefs_to_db,
    ports::{
        ChainRpc,
        KeyValueStore,
        TxSigner,
    },
    types::{
        CoinType,
        TransactionStatus,
        TxData,
        TxMeta,
    },
};
use std::{
    collections::BTreeMap,
    sync::Arc,
};
use tokio::sync::broadcast;

pub use poller::{
    PendingTxPoller,
    new_pending_tx_poller,
};

mod poller;

/// Payload of a new transaction, tagged with the chain family it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxDataUnion {
    Ethereum(TxData),
    Solana(TxData),
    Filecoin(TxData),
}

impl TxDataUnion {
    pub fn coin(&self) -> CoinType {
        match self {
            TxDataUnion::Ethereum(_) => CoinType::Ethereum,
            TxDataUnion::Solana(_) => CoinType::Solana,
            TxDataUnion::Filecoin(_) => CoinType::Filecoin,
        }
    }

    pub fn into_tx_data(self) -> TxData {
        match self {
            TxDataUnion::Ethereum(tx)
            | TxDataUnion::Solana(tx)
            | TxDataUnion::Filecoin(tx) => tx,
        }
    }
}

pub struct TxService {
    managers: BTreeMap<CoinType, Arc<dyn TxManager>>,
    store: Arc<dyn KeyValueStore>,
    prefs: Arc<dyn KeyValueStore>,
    events: EventBus,
    config: Config,
}

impl TxService {
    /// Creates a service without any manager. `prefs` holds the legacy
    /// transaction document and the migration flag.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        prefs: Arc<dyn KeyValueStore>,
        config: Config,
    ) -> Self {
        Self {
            managers: BTreeMap::new(),
            store,
            prefs,
            events: EventBus::new(config.event_channel_capacity),
            config,
        }
    }

    /// Creates and registers the manager of `coin`, sharing the store and
    /// the event bus of the service.
    pub fn register_coin(
        &mut self,
        coin: CoinType,
        rpc: Arc<dyn ChainRpc>,
        signer: Arc<dyn TxSigner>,
    ) -> Result<()> {
        let store = self.store.clone();
        let events = self.events.clone();
        let config = self.config.clone();
        let manager: Arc<dyn TxManager> = match coin {
            CoinType::Ethereum | CoinType::Filecoin => Arc::new(AccountTxManager::new(
                coin, store, rpc, signer, events, config,
            )?),
            CoinType::Solana => {
                Arc::new(SolanaTxManager::new(store, rpc, signer, events, config))
            }
            CoinType::Bitcoin => return Err(Error::UnsupportedCoinType(coin)),
        };
        self.register_manager(manager);
        Ok(())
    }

    /// Registers a manager, replacing the one of the same coin.
    pub fn register_manager(&mut self, manager: Arc<dyn TxManager>) {
        let coin = manager.coin();
        if self.managers.insert(coin, manager).is_some() {
            tracing::warn!(%coin, "replaced transaction manager");
        }
    }

    pub fn manager(&self, coin: CoinType) -> Result<&Arc<dyn TxManager>> {
        self.managers
            .get(&coin)
            .ok_or(Error::UnsupportedCoinType(coin))
    }

    pub fn managers(&self) -> impl Iterator<Item = (&CoinType, &Arc<dyn TxManager>)> {
        self.managers.iter()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TxEvent> {
        self.events.subscribe()
    }

    pub fn add_observer(&self, observer: Arc<dyn TxObserver>) {
        self.events.add_observer(observer)
    }

    /// Runs the legacy migration, then loads the state of every manager.
    ///
    /// Managers failing to load keep running from memory and their writes
    /// are held back; the first such failure is returned after every manager
    /// was tried. Calling it again retries only the managers that failed,
    /// and [`PendingTxPoller`] retries them on every tick.
    pub async fn initialize(&self) -> Result<()> {
        if let Err(err) =
            migrate_transactions_from_prefs_to_db(self.prefs.as_ref(), self.store.as_ref())
                .await
        {
            tracing::error!(%err, "failed to migrate legacy transactions");
        }

        let mut first_error = None;
        for (coin, manager) in &self.managers {
            if let Err(err) = manager.initialize().await {
                tracing::error!(%coin, %err, "failed to load transactions");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    pub async fn add_unapproved_transaction(
        &self,
        tx_data: TxDataUnion,
        chain_id: &str,
        from: &str,
        origin: Option<&str>,
    ) -> Result<String> {
        let manager = self.manager(tx_data.coin())?;
        let mut tx = NewTransaction::new(chain_id, from, tx_data.into_tx_data());
        if let Some(origin) = origin {
            tx = tx.with_origin(origin);
        }
        manager.add_unapproved_transaction(tx).await
    }

    pub async fn approve_transaction(
        &self,
        coin: CoinType,
        chain_id: &str,
        id: &str,
    ) -> Result<()> {
        self.manager(coin)?.approve_transaction(chain_id, id).await
    }

    pub async fn reject_transaction(
        &self,
        coin: CoinType,
        chain_id: &str,
        id: &str,
    ) -> Result<()> {
        self.manager(coin)?.reject_transaction(chain_id, id).await
    }

    pub async fn speedup_or_cancel_transaction(
        &self,
        coin: CoinType,
        chain_id: &str,
        id: &str,
        cancel: bool,
    ) -> Result<String> {
        self.manager(coin)?
            .speedup_or_cancel_transaction(chain_id, id, cancel)
            .await
    }

    pub async fn retry_transaction(
        &self,
        coin: CoinType,
        chain_id: &str,
        id: &str,
    ) -> Result<String> {
        self.manager(coin)?.retry_transaction(chain_id, id).await
    }

    pub async fn set_gas_price_and_limit_for_unapproved_transaction(
        &self,
        coin: CoinType,
        chain_id: &str,
        id: &str,
        gas_price: &str,
        gas_limit: &str,
    ) -> Result<()> {
        self.manager(coin)?
            .set_gas_price_and_limit_for_unapproved_transaction(
                chain_id, id, gas_price, gas_limit,
            )
            .await
    }

    pub async fn set_gas_fee_and_limit_for_unapproved_transaction(
        &self,
        coin: CoinType,
        chain_id: &str,
        id: &str,
        max_priority_fee_per_gas: &str,
        max_fee_per_gas: &str,
        gas_limit: &str,
    ) -> Result<()> {
        self.manager(coin)?
            .set_gas_fee_and_limit_for_unapproved_transaction(
                chain_id,
                id,
                max_priority_fee_per_gas,
                max_fee_per_gas,
                gas_limit,
            )
            .await
    }

    pub async fn set_data_for_unapproved_transaction(
        &self,
        coin: CoinType,
        chain_id: &str,
        id: &str,
        data: Vec<u8>,
    ) -> Result<()> {
        self.manager(coin)?
            .set_data_for_unapproved_transaction(chain_id, id, data)
            .await
    }

    pub async fn set_nonce_for_unapproved_transaction(
        &self,
        coin: CoinType,
        chain_id: &str,
        id: &str,
        nonce: Option<u64>,
    ) -> Result<()> {
        self.manager(coin)?
            .set_nonce_for_unapproved_transaction(chain_id, id, nonce)
            .await
    }

    pub fn get_transaction_info(
        &self,
        coin: CoinType,
        chain_id: &str,
        id: &str,
    ) -> Result<Option<TxMeta>> {
        Ok(self.manager(coin)?.get_transaction_info(chain_id, id))
    }

    pub fn get_all_transaction_info(
        &self,
        coin: CoinType,
        chain_id: Option<&str>,
        from: Option<&str>,
    ) -> Result<Vec<TxMeta>> {
        Ok(self.manager(coin)?.get_all_transaction_info(chain_id, from))
    }

    /// Number of transactions waiting for the user, over every coin.
    pub fn get_pending_transactions_count(&self) -> usize {
        if self.managers.is_empty() {
            return 0
        }
        self.managers.values().fold(0usize, |count, manager| {
            let unapproved = manager
                .state()
                .get_transactions_by_status(
                    None,
                    Some(TransactionStatus::Unapproved),
                    None,
                )
                .len();
            count.saturating_add(unapproved)
        })
    }

    /// Deletes every transaction of every coin.
    pub async fn reset(&self) {
        for manager in self.managers.values() {
            manager.reset().await;
        }
        tracing::info!("transaction service reset");
        self.events.publish(TxEvent::TxServiceReset);
    }
}
