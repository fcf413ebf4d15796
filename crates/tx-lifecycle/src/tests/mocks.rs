use crate::{
    ports::{
        ChainRpc,
        KeyValueStore,
        TxSigner,
    },
    store::InMemoryStore,
    types::{
        CoinType,
        TxMeta,
        TxReceipt,
    },
};
use anyhow::anyhow;
use parking_lot::Mutex;
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{
            AtomicBool,
            Ordering,
        },
    },
};

mockall::mock! {
    pub Signer {}

    impl TxSigner for Signer {
        fn sign_transaction(&self, coin: CoinType, meta: &TxMeta) -> anyhow::Result<Vec<u8>>;
    }
}

impl MockSigner {
    /// Signs everything with a fixed payload.
    pub fn accepting() -> Self {
        let mut signer = MockSigner::default();
        signer
            .expect_sign_transaction()
            .returning(|_, _| Ok(vec![0xf8, 0x6c]));
        signer
    }
}

#[derive(Default)]
struct ChainState {
    transaction_counts: HashMap<(String, String), u64>,
    receipts: HashMap<String, TxReceipt>,
    block_numbers: HashMap<String, u64>,
    sent: Vec<(String, Vec<u8>)>,
    failing: bool,
    count_queries: usize,
}

/// Scripted network. Unknown addresses have a zero transaction count,
/// unknown hashes have no receipt.
#[derive(Clone, Default)]
pub struct MockChainRpc {
    state: Arc<Mutex<ChainState>>,
}

impl MockChainRpc {
    pub fn set_transaction_count(&self, address: &str, chain_id: &str, count: u64) {
        self.state
            .lock()
            .transaction_counts
            .insert((address.to_string(), chain_id.to_string()), count);
    }

    pub fn set_receipt(&self, tx_hash: &str, block_number: u64) {
        let receipt = TxReceipt {
            transaction_hash: tx_hash.to_string(),
            block_hash: format!("0xb{block_number:x}"),
            block_number,
            gas_used: 21_000,
            status: true,
            ..Default::default()
        };
        self.state
            .lock()
            .receipts
            .insert(tx_hash.to_string(), receipt);
    }

    pub fn set_block_number(&self, chain_id: &str, block_number: u64) {
        self.state
            .lock()
            .block_numbers
            .insert(chain_id.to_string(), block_number);
    }

    /// Makes every request fail until reverted.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    pub fn sent(&self) -> Vec<(String, Vec<u8>)> {
        self.state.lock().sent.clone()
    }

    pub fn count_queries(&self) -> usize {
        self.state.lock().count_queries
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.state.lock().failing {
            Err(anyhow!("connection refused"))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl ChainRpc for MockChainRpc {
    async fn get_transaction_count(
        &self,
        address: &str,
        chain_id: &str,
    ) -> anyhow::Result<u64> {
        self.check()?;
        let mut state = self.state.lock();
        state.count_queries = state.count_queries.saturating_add(1);
        Ok(state
            .transaction_counts
            .get(&(address.to_string(), chain_id.to_string()))
            .copied()
            .unwrap_or_default())
    }

    async fn get_transaction_receipt(
        &self,
        tx_hash: &str,
        _: &str,
    ) -> anyhow::Result<Option<TxReceipt>> {
        self.check()?;
        Ok(self.state.lock().receipts.get(tx_hash).cloned())
    }

    async fn get_block_number(&self, chain_id: &str) -> anyhow::Result<u64> {
        self.check()?;
        Ok(self
            .state
            .lock()
            .block_numbers
            .get(chain_id)
            .copied()
            .unwrap_or_default())
    }

    async fn send_transaction(
        &self,
        chain_id: &str,
        signed_tx: &[u8],
    ) -> anyhow::Result<String> {
        self.check()?;
        let mut state = self.state.lock();
        state.sent.push((chain_id.to_string(), signed_tx.to_vec()));
        Ok(format!("0x{:064x}", state.sent.len()))
    }
}

/// Store whose reads always fail.
pub struct UnavailableStore;

#[async_trait::async_trait]
impl KeyValueStore for UnavailableStore {
    async fn get(&self, _: &str) -> anyhow::Result<Option<Value>> {
        Err(anyhow!("database is locked"))
    }

    async fn set(&self, _: &str, _: Value) -> anyhow::Result<()> {
        Err(anyhow!("database is locked"))
    }
}

/// In-memory store that can be switched unavailable.
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryStore,
    unavailable: AtomicBool,
}

impl FlakyStore {
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn document(&self, key: &str) -> Option<Value> {
        self.inner.document(key)
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(anyhow!("database is locked"))
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> anyhow::Result<()> {
        self.check()?;
        self.inner.set(key, value).await
    }
}
