use crate::{
    error::{
        Error,
        Result,
    },
    ports::ChainRpc,
    state_manager::TxStateManager,
    types::{
        TransactionStatus,
        TxMeta,
    },
    utils::KeyedMutex,
};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

/// A nonce together with the exclusive right to use it.
///
/// Other reservations for the same chain and address wait until this one
/// is dropped, which must happen only after the transaction carrying the
/// nonce has been stored.
pub struct NonceReservation {
    nonce: u64,
    _guard: OwnedMutexGuard<()>,
}

impl NonceReservation {
    pub fn nonce(&self) -> u64 {
        self.nonce
    }
}

/// Hands out the next nonce of an address on a chain.
#[derive(Clone)]
pub struct NonceTracker {
    state: TxStateManager,
    rpc: Arc<dyn ChainRpc>,
    locks: Arc<KeyedMutex<(String, String)>>,
}

impl NonceTracker {
    pub fn new(state: TxStateManager, rpc: Arc<dyn ChainRpc>) -> Self {
        Self {
            state,
            rpc,
            locks: Arc::new(KeyedMutex::new()),
        }
    }

    /// The nonce a new transaction from `address` should use.
    pub async fn get_next_nonce(&self, chain_id: &str, address: &str) -> Result<u64> {
        self.reserve_next_nonce(chain_id, address)
            .await
            .map(|reservation| reservation.nonce())
    }

    /// Like [`Self::get_next_nonce`], keeping the per-address critical
    /// section open for as long as the reservation lives.
    pub async fn reserve_next_nonce(
        &self,
        chain_id: &str,
        address: &str,
    ) -> Result<NonceReservation> {
        let guard = self
            .locks
            .lock((chain_id.to_string(), address.to_string()))
            .await;

        let network_nonce = self
            .rpc
            .get_transaction_count(address, chain_id)
            .await
            .map_err(|e| Error::NetworkUnavailable(e.to_string()))?;
        let local_nonce = self.highest_local_nonce(chain_id, address);
        let nonce = match local_nonce {
            Some(local) => network_nonce.max(local.saturating_add(1)),
            None => network_nonce,
        };

        tracing::debug!(
            %chain_id,
            %address,
            network_nonce,
            ?local_nonce,
            nonce,
            "next nonce computed"
        );
        Ok(NonceReservation {
            nonce,
            _guard: guard,
        })
    }

    /// Whether a confirmed transaction already used the nonce of `meta`.
    pub fn is_nonce_taken(&self, meta: &TxMeta) -> bool {
        let Some(nonce) = meta.nonce() else {
            return false
        };
        self.state
            .get_transactions_by_status(
                Some(&meta.chain_id),
                Some(TransactionStatus::Confirmed),
                Some(&meta.from),
            )
            .iter()
            .any(|confirmed| confirmed.id != meta.id && confirmed.nonce() == Some(nonce))
    }

    fn highest_local_nonce(&self, chain_id: &str, address: &str) -> Option<u64> {
        [TransactionStatus::Confirmed, TransactionStatus::Submitted]
            .into_iter()
            .flat_map(|status| {
                self.state.get_transactions_by_status(
                    Some(chain_id),
                    Some(status),
                    Some(address),
                )
            })
            .filter_map(|meta| meta.nonce())
            .max()
    }
}
