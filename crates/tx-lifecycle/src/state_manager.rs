use crate::{
    config::Config,
    error::{
        Error,
        Result,
    },
    events::{
        EventBus,
        TxEvent,
    },
    ports::KeyValueStore,
    types::{
        CoinType,
        TransactionStatus,
        TxMeta,
    },
};
use parking_lot::RwLock;
use serde_json::{
    Map,
    Value,
};
use std::{
    collections::HashSet,
    sync::Arc,
};

struct Document {
    /// `{chain_id: {tx_id: record}}`
    txs: Map<String, Value>,
    initialized: bool,
    /// Set by a wipe issued before the load, which then discards the
    /// persisted document.
    wiped_before_load: bool,
    /// `(chain_id, tx_id)` deleted before the load.
    deleted_before_load: HashSet<(String, String)>,
}

impl Document {
    fn new() -> Self {
        Self {
            txs: Map::new(),
            initialized: false,
            wiped_before_load: false,
            deleted_before_load: HashSet::new(),
        }
    }
}

/// Owner of the transaction records of one coin type.
///
/// Records are served from memory. Every mutation is written through to the
/// [`KeyValueStore`] under [`CoinType::storage_key`]; writes issued before
/// [`TxStateManager::initialize`] completes wait for it a bounded number of
/// times and are skipped afterwards.
#[derive(Clone)]
pub struct TxStateManager {
    coin: CoinType,
    storage_key: Arc<str>,
    document: Arc<RwLock<Document>>,
    store: Arc<dyn KeyValueStore>,
    events: EventBus,
    config: Arc<Config>,
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl TxStateManager {
    pub fn new(
        coin: CoinType,
        store: Arc<dyn KeyValueStore>,
        events: EventBus,
        config: Config,
    ) -> Self {
        Self {
            coin,
            storage_key: coin.storage_key().into(),
            document: Arc::new(RwLock::new(Document::new())),
            store,
            events,
            config: Arc::new(config),
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn coin(&self) -> CoinType {
        self.coin
    }

    pub fn is_initialized(&self) -> bool {
        self.document.read().initialized
    }

    /// Loads the persisted document.
    ///
    /// Records added before the load completed take precedence over the
    /// persisted ones with the same id, unless the persisted record reached
    /// a final status the new one does not share. Deletes and wipes issued
    /// before the load are applied to the persisted document.
    ///
    /// A failed load leaves the manager uninitialized: writes keep waiting
    /// for a later successful call and are skipped once their retries run
    /// out, so callers are expected to call it again.
    pub async fn initialize(&self) -> Result<()> {
        if self.is_initialized() {
            return Ok(())
        }
        let loaded = self
            .store
            .get(&self.storage_key)
            .await
            .map_err(|e| Error::StorageUnavailable(e.to_string()))?;

        let mut document = self.document.write();
        let document = &mut *document;
        if document.initialized {
            return Ok(())
        }
        match loaded {
            Some(Value::Object(_)) if document.wiped_before_load => {
                tracing::debug!(
                    coin = %self.coin,
                    "discarding persisted transactions wiped before load"
                );
            }
            Some(Value::Object(persisted)) => {
                merge_persisted(&mut document.txs, persisted, &document.deleted_before_load)
            }
            Some(other) => {
                tracing::warn!(
                    coin = %self.coin,
                    "ignoring malformed transaction document: {other}"
                );
            }
            None => {}
        }
        document.initialized = true;
        document.wiped_before_load = false;
        document.deleted_before_load.clear();
        tracing::debug!(coin = %self.coin, "transaction state loaded");
        Ok(())
    }

    /// Inserts the record, or replaces the one with the same id.
    ///
    /// Replacing a record that reached a final status with a different
    /// status is refused.
    pub async fn add_or_update_tx(&self, meta: &TxMeta) -> Result<()> {
        let value = meta.to_value()?;
        let is_add = {
            let mut document = self.document.write();
            let document = &mut *document;
            if !document.initialized {
                document
                    .deleted_before_load
                    .remove(&(meta.chain_id.clone(), meta.id.clone()));
            }
            let chain_txs = chain_txs_mut(&mut document.txs, &meta.chain_id)?;

            let previous_status = chain_txs.get(&meta.id).and_then(stored_status);
            if let Some(previous) = previous_status {
                if previous.is_final() && previous != meta.status {
                    return Err(Error::StatusRegression {
                        id: meta.id.clone(),
                        from: previous,
                        to: meta.status,
                    })
                }
            }

            let is_add = chain_txs.insert(meta.id.clone(), value).is_none();
            if is_add {
                // Only the most recent confirmed and rejected records are kept.
                self.retire_tx_by_status(
                    chain_txs,
                    TransactionStatus::Confirmed,
                    self.config.max_confirmed_txs,
                );
                self.retire_tx_by_status(
                    chain_txs,
                    TransactionStatus::Rejected,
                    self.config.max_rejected_txs,
                );
            }
            is_add
        };

        tracing::debug!(
            coin = %self.coin,
            chain_id = %meta.chain_id,
            tx_id = %meta.id,
            status = %meta.status,
            is_add,
            "transaction stored"
        );
        let event = if is_add {
            TxEvent::NewUnapprovedTx(meta.clone())
        } else {
            TxEvent::TransactionStatusChanged(meta.clone())
        };
        self.events.publish(event);

        self.schedule_write().await;
        Ok(())
    }

    /// Replaces an unapproved record with an edited copy of it. Publishes
    /// [`TxEvent::UnapprovedTxUpdated`] rather than a status change.
    pub async fn update_unapproved_tx(&self, meta: &TxMeta) -> Result<()> {
        let value = meta.to_value()?;
        {
            let mut document = self.document.write();
            let chain_txs = chain_txs_mut(&mut document.txs, &meta.chain_id)?;
            let Some(current) = chain_txs.get_mut(&meta.id) else {
                return Err(Error::NotFound {
                    chain_id: meta.chain_id.clone(),
                    id: meta.id.clone(),
                })
            };
            let actual = stored_status(current)
                .filter(|status| *status != TransactionStatus::Unapproved)
                .unwrap_or(meta.status);
            if actual != TransactionStatus::Unapproved {
                return Err(Error::InvalidStatus {
                    id: meta.id.clone(),
                    actual,
                    expected: "Unapproved",
                })
            }
            *current = value;
        }

        tracing::debug!(
            coin = %self.coin,
            chain_id = %meta.chain_id,
            tx_id = %meta.id,
            "unapproved transaction updated"
        );
        self.events.publish(TxEvent::UnapprovedTxUpdated(meta.clone()));
        self.schedule_write().await;
        Ok(())
    }

    pub fn get_tx(&self, chain_id: &str, id: &str) -> Option<TxMeta> {
        let document = self.document.read();
        let value = document.txs.get(chain_id)?.get(id)?;
        decode_or_skip(value)
    }

    /// Removes the record. Before the load, the deletion also applies to
    /// the persisted record with the same id.
    pub async fn delete_tx(&self, chain_id: &str, id: &str) {
        let (removed, initialized) = {
            let mut document = self.document.write();
            let removed = document
                .txs
                .get_mut(chain_id)
                .and_then(Value::as_object_mut)
                .and_then(|chain_txs| chain_txs.remove(id))
                .is_some();
            if !document.initialized {
                document
                    .deleted_before_load
                    .insert((chain_id.to_string(), id.to_string()));
            }
            (removed, document.initialized)
        };
        if removed || !initialized {
            tracing::debug!(coin = %self.coin, %chain_id, tx_id = %id, "transaction deleted");
            self.schedule_write().await;
        }
    }

    /// Removes every record of every chain, persisted ones included, even
    /// when called before the load. Irreversible.
    pub async fn wipe_txs(&self) {
        {
            let mut document = self.document.write();
            document.txs.clear();
            if !document.initialized {
                document.wiped_before_load = true;
                document.deleted_before_load.clear();
            }
        }
        tracing::info!(coin = %self.coin, "all transactions wiped");
        self.schedule_write().await;
    }

    /// Records matching every given filter. Without a chain, all chains of
    /// the coin are searched.
    pub fn get_transactions_by_status(
        &self,
        chain_id: Option<&str>,
        status: Option<TransactionStatus>,
        from: Option<&str>,
    ) -> Vec<TxMeta> {
        let document = self.document.read();
        let chains: Vec<&Value> = match chain_id {
            Some(chain_id) => document.txs.get(chain_id).into_iter().collect(),
            None => document.txs.values().collect(),
        };

        chains
            .into_iter()
            .filter_map(Value::as_object)
            .flat_map(|chain_txs| chain_txs.values())
            .filter_map(decode_or_skip)
            .filter(|meta| status.is_none_or(|status| meta.status == status))
            .filter(|meta| from.is_none_or(|from| meta.from == from))
            .collect()
    }

    /// Chains holding at least one record.
    pub fn chain_ids(&self) -> Vec<String> {
        self.document
            .read()
            .txs
            .iter()
            .filter(|(_, chain_txs)| {
                chain_txs.as_object().is_some_and(|txs| !txs.is_empty())
            })
            .map(|(chain_id, _)| chain_id.clone())
            .collect()
    }

    fn retire_tx_by_status(
        &self,
        chain_txs: &mut Map<String, Value>,
        status: TransactionStatus,
        max_num: usize,
    ) {
        let retired_by = |meta: &TxMeta| match status {
            TransactionStatus::Confirmed => meta.confirmed_time,
            _ => meta.created_time,
        };
        let metas: Vec<TxMeta> = chain_txs
            .values()
            .filter(|value| stored_status(value) == Some(status))
            .filter_map(decode_or_skip)
            .collect();
        if metas.len() <= max_num {
            return
        }

        if let Some(oldest) = metas.iter().min_by_key(|meta| retired_by(meta)) {
            tracing::debug!(
                coin = %self.coin,
                chain_id = %oldest.chain_id,
                tx_id = %oldest.id,
                %status,
                "retiring oldest transaction"
            );
            chain_txs.remove(&oldest.id);
        }
    }

    async fn schedule_write(&self) {
        if self.is_initialized() {
            self.write().await;
            return
        }

        let manager = self.clone();
        tokio::spawn(async move {
            for _ in 0..manager.config.storage_init_retry_attempts {
                tokio::time::sleep(manager.config.storage_init_retry_delay).await;
                if manager.is_initialized() {
                    manager.write().await;
                    return
                }
            }
            tracing::error!(
                coin = %manager.coin,
                "transaction store is not initialized after maximum retry attempts, write skipped"
            );
        });
    }

    async fn write(&self) {
        // Serialized, so the last write always carries the newest snapshot.
        let _guard = self.write_lock.lock().await;
        let snapshot = Value::Object(self.document.read().txs.clone());
        if let Err(err) = self.store.set(&self.storage_key, snapshot).await {
            tracing::error!(coin = %self.coin, %err, "failed to persist transactions");
        }
    }
}

fn chain_txs_mut<'a>(
    txs: &'a mut Map<String, Value>,
    chain_id: &str,
) -> Result<&'a mut Map<String, Value>> {
    let entry = txs
        .entry(chain_id.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        tracing::warn!(%chain_id, "replacing malformed chain entry");
        *entry = Value::Object(Map::new());
    }
    entry
        .as_object_mut()
        .ok_or_else(|| Error::InvalidRecord(format!("chain entry {chain_id}")))
}

fn merge_persisted(
    txs: &mut Map<String, Value>,
    persisted: Map<String, Value>,
    deleted: &HashSet<(String, String)>,
) {
    for (chain_id, persisted_chain) in persisted {
        let Value::Object(persisted_chain) = persisted_chain else {
            continue
        };
        let Ok(chain_txs) = chain_txs_mut(txs, &chain_id) else {
            continue
        };
        for (id, record) in persisted_chain {
            if deleted.contains(&(chain_id.clone(), id.clone())) {
                continue
            }
            match chain_txs.get_mut(&id) {
                None => {
                    chain_txs.insert(id, record);
                }
                Some(current) => {
                    // A final persisted status is never regressed by an
                    // earlier in-memory write.
                    let persisted_status = stored_status(&record);
                    if persisted_status.is_some_and(|status| status.is_final())
                        && stored_status(current) != persisted_status
                    {
                        tracing::warn!(
                            %chain_id,
                            tx_id = %id,
                            "keeping persisted transaction in a final status"
                        );
                        *current = record;
                    }
                }
            }
        }
    }
}

fn stored_status(value: &Value) -> Option<TransactionStatus> {
    let status = value.get("status")?.as_u64()?;
    TransactionStatus::try_from(u8::try_from(status).ok()?).ok()
}

fn decode_or_skip(value: &Value) -> Option<TxMeta> {
    match TxMeta::from_value(value) {
        Ok(meta) => Some(meta),
        Err(err) => {
            tracing::warn!(%err, "skipping invalid transaction record");
            None
        }
    }
}
