use crate::{
    nonce_tracker::NonceTracker,
    ports::ChainRpc,
    state_manager::TxStateManager,
    types::{
        Timestamp,
        TransactionStatus,
        TxMeta,
        TxReceipt,
    },
};
use std::{
    collections::{
        BTreeSet,
        HashMap,
        HashSet,
    },
    sync::Arc,
};

/// Per-tracker bookkeeping deciding when a submitted transaction is
/// considered dropped.
#[derive(Debug, Default)]
pub struct DropDetector {
    threshold: u32,
    /// Last observed network nonce, keyed by `(address, chain_id)`.
    network_nonces: HashMap<(String, String), u64>,
    /// Consecutive polls that saw a higher network nonce, keyed by tx hash.
    dropped_polls: HashMap<String, u32>,
}

impl DropDetector {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            ..Default::default()
        }
    }

    /// Feeds the network nonce observed for the sender of `meta` in the
    /// current poll. Returns true once the transaction should be dropped.
    pub fn should_tx_dropped(&mut self, meta: &TxMeta, network_nonce: u64) -> bool {
        let Some(tx_nonce) = meta.nonce() else {
            return false
        };
        let key = (meta.from.clone(), meta.chain_id.clone());
        let Some(cached) = self.network_nonces.get_mut(&key) else {
            self.network_nonces.insert(key, network_nonce);
            return false
        };
        *cached = network_nonce;

        if network_nonce <= tx_nonce {
            self.dropped_polls.remove(&meta.tx_hash);
            return false
        }

        let polls = self.dropped_polls.entry(meta.tx_hash.clone()).or_default();
        if *polls >= self.threshold {
            self.dropped_polls.remove(&meta.tx_hash);
            self.network_nonces.remove(&key);
            return true
        }
        *polls = polls.saturating_add(1);
        false
    }

    pub fn cached_network_nonce(&self, address: &str, chain_id: &str) -> Option<u64> {
        self.network_nonces
            .get(&(address.to_string(), chain_id.to_string()))
            .copied()
    }

    pub fn dropped_polls(&self, tx_hash: &str) -> Option<u32> {
        self.dropped_polls.get(tx_hash).copied()
    }

    /// Forgets the polls counted for a transaction that left the
    /// submitted state.
    pub fn forget(&mut self, tx_hash: &str) {
        self.dropped_polls.remove(tx_hash);
    }

    pub fn clear(&mut self) {
        self.network_nonces.clear();
        self.dropped_polls.clear();
    }
}

/// Network state gathered before any record is touched.
#[derive(Default)]
struct Observations {
    /// Receipts keyed by tx id.
    receipts: HashMap<String, TxReceipt>,
    /// Network nonces keyed by sender address.
    network_nonces: HashMap<String, u64>,
}

/// Reconciles submitted transactions with the network.
pub struct PendingTxTracker {
    state: TxStateManager,
    rpc: Arc<dyn ChainRpc>,
    nonce_tracker: NonceTracker,
    drop_detector: DropDetector,
}

impl PendingTxTracker {
    pub fn new(
        state: TxStateManager,
        rpc: Arc<dyn ChainRpc>,
        nonce_tracker: NonceTracker,
        drop_threshold: u32,
    ) -> Self {
        Self {
            state,
            rpc,
            nonce_tracker,
            drop_detector: DropDetector::new(drop_threshold),
        }
    }

    /// Polls the outcome of every submitted transaction on `chain_id`.
    ///
    /// Returns false, without touching any record, if a network request
    /// failed. The chain is added to `pending_chain_ids` when some of its
    /// transactions are still outstanding after the poll.
    pub async fn update_pending_transactions(
        &mut self,
        chain_id: &str,
        pending_chain_ids: &mut BTreeSet<String>,
    ) -> bool {
        let pending = self.state.get_transactions_by_status(
            Some(chain_id),
            Some(TransactionStatus::Submitted),
            None,
        );
        if pending.is_empty() {
            return true
        }

        let observations = match self.observe(chain_id, &pending).await {
            Ok(observations) => observations,
            Err(err) => {
                tracing::warn!(%chain_id, %err, "failed to poll pending transactions");
                return false
            }
        };

        // Confirmations go first, a superseded sibling is never pending.
        let mut resolved = HashSet::new();
        for meta in &pending {
            if resolved.contains(&meta.id) {
                continue
            }
            if let Some(receipt) = observations.receipts.get(&meta.id) {
                let superseded = self.confirm(meta.clone(), receipt.clone()).await;
                self.drop_detector.forget(&meta.tx_hash);
                resolved.insert(meta.id.clone());
                for other in superseded {
                    self.drop_detector.forget(&other.tx_hash);
                    resolved.insert(other.id);
                }
            }
        }

        for meta in pending.iter().filter(|meta| !resolved.contains(&meta.id)) {
            if self.nonce_tracker.is_nonce_taken(meta) {
                self.drop_transaction(meta).await;
                self.drop_detector.forget(&meta.tx_hash);
                continue
            }
            let network_nonce = observations.network_nonces.get(&meta.from).copied();
            let dropped = network_nonce
                .is_some_and(|nonce| self.should_tx_dropped(meta, nonce));
            if dropped {
                self.drop_transaction(meta).await;
            } else {
                pending_chain_ids.insert(meta.chain_id.clone());
            }
        }

        true
    }

    /// See [`DropDetector::should_tx_dropped`].
    pub fn should_tx_dropped(&mut self, meta: &TxMeta, network_nonce: u64) -> bool {
        self.drop_detector.should_tx_dropped(meta, network_nonce)
    }

    /// Removes a transaction that will never be mined.
    pub async fn drop_transaction(&self, meta: &TxMeta) {
        tracing::info!(
            chain_id = %meta.chain_id,
            tx_id = %meta.id,
            tx_hash = %meta.tx_hash,
            nonce = ?meta.nonce(),
            "dropping transaction"
        );
        self.state.delete_tx(&meta.chain_id, &meta.id).await;
    }

    pub fn drop_detector(&self) -> &DropDetector {
        &self.drop_detector
    }

    pub fn reset(&mut self) {
        self.drop_detector.clear();
    }

    async fn observe(
        &self,
        chain_id: &str,
        pending: &[TxMeta],
    ) -> anyhow::Result<Observations> {
        let mut observations = Observations::default();

        for meta in pending.iter().filter(|meta| !meta.tx_hash.is_empty()) {
            let receipt = self
                .rpc
                .get_transaction_receipt(&meta.tx_hash, chain_id)
                .await?;
            if let Some(receipt) = receipt {
                observations.receipts.insert(meta.id.clone(), receipt);
            }
        }

        let unresolved_senders: BTreeSet<&str> = pending
            .iter()
            .filter(|meta| meta.nonce().is_some())
            .filter(|meta| !observations.receipts.contains_key(&meta.id))
            .map(|meta| meta.from.as_str())
            .collect();
        for address in unresolved_senders {
            let nonce = self.rpc.get_transaction_count(address, chain_id).await?;
            observations.network_nonces.insert(address.to_string(), nonce);
        }

        Ok(observations)
    }

    /// Marks the transaction confirmed and deletes the records competing
    /// for its nonce. Returns the deleted records.
    async fn confirm(&self, mut meta: TxMeta, receipt: TxReceipt) -> Vec<TxMeta> {
        meta.status = TransactionStatus::Confirmed;
        meta.confirmed_time = Some(Timestamp::now());
        meta.tx_receipt = Some(receipt);
        if let Err(err) = self.state.add_or_update_tx(&meta).await {
            tracing::warn!(tx_id = %meta.id, %err, "failed to confirm transaction");
            return Vec::new()
        }
        tracing::info!(
            chain_id = %meta.chain_id,
            tx_id = %meta.id,
            tx_hash = %meta.tx_hash,
            "transaction confirmed"
        );

        let Some(nonce) = meta.nonce() else {
            return Vec::new()
        };
        let superseded: Vec<TxMeta> = self
            .state
            .get_transactions_by_status(Some(&meta.chain_id), None, Some(&meta.from))
            .into_iter()
            .filter(|other| other.id != meta.id && other.nonce() == Some(nonce))
            .filter(|other| {
                matches!(
                    other.status,
                    TransactionStatus::Submitted | TransactionStatus::Signed
                )
            })
            .collect();

        for other in &superseded {
            tracing::info!(
                chain_id = %other.chain_id,
                tx_id = %other.id,
                nonce,
                superseded_by = %meta.id,
                "deleting transaction superseded by a confirmed one"
            );
            self.state.delete_tx(&other.chain_id, &other.id).await;
        }
        superseded
    }
}
