use super::TxService;
use crate::{
    config::Config,
    types::CoinType,
};
use fuel_core_services::{
    EmptyShared,
    RunnableService,
    RunnableTask,
    ServiceRunner,
    StateWatcher,
    TaskNextAction,
};
use std::{
    collections::HashMap,
    sync::Arc,
    time::Duration,
};
use tokio::time::{
    Interval,
    MissedTickBehavior,
};

/// Periodically polls the submitted transactions of every coin.
pub struct PendingTxPoller {
    service: Arc<TxService>,
    poll_interval: Duration,
}

pub struct Task {
    service: Arc<TxService>,
    interval: Interval,
    /// Block number seen by the last successful poll of a chain.
    last_blocks: HashMap<(CoinType, String), u64>,
}

#[async_trait::async_trait]
impl RunnableService for PendingTxPoller {
    const NAME: &'static str = "PendingTxPoller";

    type SharedData = EmptyShared;
    type Task = Task;
    type TaskParams = ();

    fn shared_data(&self) -> Self::SharedData {
        EmptyShared
    }

    async fn into_task(
        self,
        _: &StateWatcher,
        _: Self::TaskParams,
    ) -> anyhow::Result<Self::Task> {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Ok(Task {
            service: self.service,
            interval,
            last_blocks: HashMap::new(),
        })
    }
}

impl Task {
    /// Polls every chain with submitted transactions whose head moved since
    /// its last successful poll. Managers whose state failed to load are
    /// loaded again first.
    pub async fn poll(&mut self) {
        for (coin, manager) in self.service.managers() {
            if !manager.state().is_initialized() {
                if let Err(err) = manager.initialize().await {
                    tracing::warn!(
                        %coin,
                        %err,
                        "failed to load transactions, retrying next tick"
                    );
                    continue
                }
                tracing::info!(%coin, "transactions loaded after a failed attempt");
            }
            for chain_id in manager.pending_chain_ids() {
                let block = match manager.block_number(&chain_id).await {
                    Ok(block) => block,
                    Err(err) => {
                        tracing::warn!(%coin, %chain_id, %err, "failed to read block number");
                        continue
                    }
                };
                let key = (*coin, chain_id);
                if self.last_blocks.get(&key) == Some(&block) {
                    continue
                }

                let result = manager.update_pending_transactions(Some(&key.1)).await;
                if result.succeeded {
                    self.last_blocks.insert(key, block);
                } else {
                    tracing::warn!(%coin, chain_id = %key.1, "pending poll failed");
                }
            }
        }
    }
}

impl RunnableTask for Task {
    async fn run(&mut self, watcher: &mut StateWatcher) -> TaskNextAction {
        tokio::select! {
            biased;

            _ = watcher.while_started() => {
                TaskNextAction::Stop
            }

            _ = self.interval.tick() => {
                self.poll().await;
                TaskNextAction::Continue
            }
        }
    }

    async fn shutdown(self) -> anyhow::Result<()> {
        Ok(())
    }
}

pub fn new_pending_tx_poller(
    service: Arc<TxService>,
    config: &Config,
) -> ServiceRunner<PendingTxPoller> {
    ServiceRunner::new(PendingTxPoller {
        service,
        poll_interval: config.poll_interval,
    })
}
