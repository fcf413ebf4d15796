use std::{
    collections::HashMap,
    hash::Hash,
    sync::Arc,
};
use tokio::sync::{
    Mutex,
    OwnedMutexGuard,
};

/// Async mutual exclusion scoped to a key.
///
/// Callers locking different keys never wait on each other. Entries are
/// removed once nobody holds or waits for them.
pub struct KeyedMutex<K> {
    locks: parking_lot::Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K> KeyedMutex<K>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            locks: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    pub async fn lock(&self, key: K) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(key).or_default().clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

impl<K> Default for KeyedMutex<K>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
