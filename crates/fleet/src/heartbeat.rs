//! Worker heartbeat context.
//!
//! While a job is being processed, a background task POSTs `state=WORKING`
//! to the coordinator on a fixed period so the assignment stays alive. A
//! failed POST is remembered in a flag that the driver polls between
//! pipeline steps; stopping the context signals the task and joins it, so
//! shutdown latency is bounded by one period and there is never more than
//! one heartbeat task per job.

use crate::client::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;
use uuid::Uuid;

/// Period between worker heartbeats.
pub const WORKER_HEARTBEAT_PERIOD: Duration = Duration::from_secs(5);

/// Scoped heartbeat task bound to one job id.
pub struct HeartbeatContext {
    connection_failed: Arc<AtomicBool>,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl HeartbeatContext {
    /// Start heartbeating `job_id` every `period`.
    pub fn start(client: Client, job_id: Uuid, period: Duration) -> Self {
        let connection_failed = Arc::new(AtomicBool::new(false));
        let failed = connection_failed.clone();
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = tokio::time::sleep(period) => {
                        if let Err(e) = client.report_working(job_id).await {
                            warn!("Heartbeat for job {} failed: {}", job_id, e);
                            failed.store(true, Ordering::SeqCst);
                        }
                    }
                }
            }
        });

        Self {
            connection_failed,
            stop_tx,
            task,
        }
    }

    /// True once any heartbeat POST has failed.
    pub fn connection_failed(&self) -> bool {
        self.connection_failed.load(Ordering::SeqCst)
    }

    /// Signal the task to stop and join it.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.task.await;
    }
}
