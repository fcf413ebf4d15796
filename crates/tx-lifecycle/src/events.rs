use crate::types::TxMeta;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Lifecycle notifications for UI layers and other collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxEvent {
    /// A transaction was added to the store.
    NewUnapprovedTx(TxMeta),
    /// A stored transaction was replaced.
    TransactionStatusChanged(TxMeta),
    /// The payload of a transaction awaiting approval was edited.
    UnapprovedTxUpdated(TxMeta),
    /// Every manager dropped its state; the history must be rebuilt.
    TxServiceReset,
}

/// Callback style subscriber, invoked synchronously on publication.
pub trait TxObserver: Send + Sync {
    fn on_new_unapproved_tx(&self, _meta: &TxMeta) {}

    fn on_transaction_status_changed(&self, _meta: &TxMeta) {}

    fn on_unapproved_tx_updated(&self, _meta: &TxMeta) {}

    fn on_tx_service_reset(&self) {}
}

/// Fan-out of [`TxEvent`]s to channel subscribers and registered observers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<TxEvent>,
    observers: Arc<RwLock<Vec<Arc<dyn TxObserver>>>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            observers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TxEvent> {
        self.sender.subscribe()
    }

    pub fn add_observer(&self, observer: Arc<dyn TxObserver>) {
        self.observers.write().push(observer);
    }

    pub fn publish(&self, event: TxEvent) {
        let observers = self.observers.read().clone();
        for observer in observers {
            match &event {
                TxEvent::NewUnapprovedTx(meta) => observer.on_new_unapproved_tx(meta),
                TxEvent::TransactionStatusChanged(meta) => {
                    observer.on_transaction_status_changed(meta)
                }
                TxEvent::UnapprovedTxUpdated(meta) => observer.on_unapproved_tx_updated(meta),
                TxEvent::TxServiceReset => observer.on_tx_service_reset(),
            }
        }

        // Nobody listening is not an error.
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
