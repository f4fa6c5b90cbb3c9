/// Expiry sweeper: periodic `del_all_expired` on a background task.
///
/// Sweeps once at startup, then once per interval. A failed sweep is
/// logged and the next one runs on the normal schedule; there is no
/// backoff and no retry. Stopped by `SweeperHandle::shutdown` or by
/// dropping the handle.
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::storage::MessageStorage;

pub struct Sweeper;

impl Sweeper {
    /// Start sweeping `storage` every `interval`. Must be called within a
    /// Tokio runtime.
    pub fn spawn(storage: Arc<dyn MessageStorage>, interval: Duration) -> SweeperHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run(storage, interval, stop_rx));
        tracing::info!("expiry sweeper started (interval {interval:?})");
        SweeperHandle { stop_tx, task }
    }
}

async fn run(storage: Arc<dyn MessageStorage>, interval: Duration, mut stop_rx: watch::Receiver<bool>) {
    loop {
        match storage.del_all_expired().await {
            Ok(report) => tracing::info!(
                "expiry sweep removed {} message(s) across {} node(s)",
                report.removed,
                report.nodes
            ),
            Err(e) => tracing::error!("expiry sweep failed: {e}"),
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            // Fires on an explicit stop and when the handle is dropped.
            _ = stop_rx.changed() => break,
        }
    }
    tracing::info!("expiry sweeper stopped");
}

/// Owner of a running sweeper.
pub struct SweeperHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the sweeper and wait for it to exit. A sweep already in
    /// progress runs to completion first.
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!("expiry sweeper task ended abnormally: {e}");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use crate::error::StorageError;
    use crate::types::{DeletionRequest, Message, SequenceId, SweepReport};

    /// Counts sweeps; optionally fails every one.
    #[derive(Default)]
    struct Counting {
        sweeps: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl MessageStorage for Counting {
        async fn save(&self, _: &str, _: &Message, _: SequenceId) -> Result<(), StorageError> {
            Ok(())
        }

        async fn get(&self, _: &str, _: SequenceId) -> Result<Vec<String>, StorageError> {
            Ok(Vec::new())
        }

        async fn del_multi(&self, _: &DeletionRequest) -> Result<(), StorageError> {
            Ok(())
        }

        async fn del_key(&self, _: &str) -> Result<(), StorageError> {
            Ok(())
        }

        async fn del_all_expired(&self) -> Result<SweepReport, StorageError> {
            self.sweeps.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(StorageError::NoConnection {
                    node: "node1".into(),
                });
            }
            Ok(SweepReport { nodes: 1, removed: 0 })
        }
    }

    fn sweeps(storage: &Counting) -> u32 {
        storage.sweeps.load(Ordering::SeqCst)
    }

    #[tokio::test(start_paused = true)]
    async fn sweeps_immediately_then_every_interval() {
        let storage = Arc::new(Counting::default());
        let handle = Sweeper::spawn(storage.clone(), Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(sweeps(&storage), 1);

        tokio::time::sleep(Duration::from_secs(34)).await;
        // t = 0, 10, 20, 30
        assert_eq!(sweeps(&storage), 4);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failures_keep_the_same_cadence() {
        let storage = Arc::new(Counting {
            fail: true,
            ..Default::default()
        });
        let handle = Sweeper::spawn(storage.clone(), Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(sweeps(&storage), 4);
        assert!(!handle.is_finished());

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_sweeping() {
        let storage = Arc::new(Counting::default());
        let handle = Sweeper::spawn(storage.clone(), Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(15)).await;
        handle.shutdown().await;
        let after_stop = sweeps(&storage);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(sweeps(&storage), after_stop);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handle_stops_sweeping() {
        let storage = Arc::new(Counting::default());
        let handle = Sweeper::spawn(storage.clone(), Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(handle);
        tokio::time::sleep(Duration::from_secs(1)).await;
        let after_drop = sweeps(&storage);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(sweeps(&storage), after_drop);
        assert_eq!(after_drop, 1);
    }
}
