use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Confirmed transactions kept per chain before the oldest is evicted.
    pub max_confirmed_txs: usize,
    /// Rejected transactions kept per chain before the oldest is evicted.
    pub max_rejected_txs: usize,
    /// How many times a write waits for the store to finish loading.
    pub storage_init_retry_attempts: usize,
    /// Delay between two attempts of a write waiting for the store.
    pub storage_init_retry_delay: Duration,
    /// Consecutive polls observing a higher network nonce before a
    /// submitted transaction is dropped.
    pub drop_threshold: u32,
    /// Interval of the pending transaction poller.
    pub poll_interval: Duration,
    /// Capacity of the lifecycle event channel.
    pub event_channel_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_confirmed_txs: 500,
            max_rejected_txs: 500,
            storage_init_retry_attempts: 3,
            storage_init_retry_delay: Duration::from_millis(500),
            drop_threshold: 3,
            poll_interval: Duration::from_secs(5),
            event_channel_capacity: 1024,
        }
    }
}
