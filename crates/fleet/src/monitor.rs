//! Heartbeat monitor for the coordinator.
//!
//! A worker that dies silently leaves its job stuck in Working; the monitor
//! reclaims such jobs and, once every queue is empty, asks its own server
//! to shut down.

use crate::queue::QueueManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// How often the monitor scans for dead workers.
pub const HEARTBEAT_CHECK_PERIOD: Duration = Duration::from_secs(10);

/// Age after which a working job's assignment is considered dead. Several
/// multiples of the worker heartbeat period, to tolerate network hiccups.
pub const HEARTBEAT_TIMEOUT_PERIOD: Duration = Duration::from_secs(30);

/// Monitor timing, overridable for tests.
#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    /// Scan period.
    pub check_period: Duration,
    /// Assignment timeout.
    pub timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_period: HEARTBEAT_CHECK_PERIOD,
            timeout: HEARTBEAT_TIMEOUT_PERIOD,
        }
    }
}

/// Start the periodic timeout scan.
///
/// Every check period, requeues all timed-out working jobs; when Waiting
/// and Working are both empty, POSTs to the server's shutdown route and
/// ends the task.
pub fn start_heartbeat_monitor(
    queue: Arc<QueueManager>,
    shutdown_url: String,
    config: MonitorConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let client = reqwest::Client::new();

        loop {
            tokio::time::sleep(config.check_period).await;

            for job_id in queue.scan_timeouts(config.timeout) {
                error!("Job {} timed out", job_id);
                queue.requeue(job_id);
            }

            if queue.is_drained() {
                info!("No jobs left. Shutting down server...");
                if let Err(e) = client.post(&shutdown_url).send().await {
                    warn!("Shutdown request failed: {}", e);
                }
                return;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Job;
    use crate::queue::QueueManager;
    use crate::server::{run_dispatch_server, AppState};
    use ripfleet_config::{HandbrakeConfig, RipConfig};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn make_queue(temp_root: &TempDir, count: usize) -> Arc<QueueManager> {
        let jobs = (0..count)
            .map(|i| {
                Job::create(
                    PathBuf::from(format!("/srv/isos/{}.iso", i)),
                    RipConfig::default(),
                    HandbrakeConfig::default(),
                    Vec::new(),
                    temp_root.path(),
                )
                .unwrap()
            })
            .collect();
        Arc::new(QueueManager::new(jobs))
    }

    fn fast_config() -> MonitorConfig {
        MonitorConfig {
            check_period: Duration::from_millis(20),
            timeout: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn test_monitor_requeues_timed_out_jobs() {
        let temp_root = TempDir::new().unwrap();
        let queue = make_queue(&temp_root, 2);

        // One claimed job goes silent, plus one left waiting so the
        // monitor keeps running instead of shutting down.
        let job = queue.claim("10.0.0.1").unwrap();

        let handle = start_heartbeat_monitor(
            queue.clone(),
            "http://127.0.0.1:1/shutdown".to_string(),
            fast_config(),
        );

        tokio::time::sleep(Duration::from_millis(200)).await;

        let counts = queue.counts();
        assert_eq!(counts.working, 0);
        assert_eq!(counts.waiting, 2);

        // The reclaimed job can be claimed again
        let reclaimed = queue.claim("10.0.0.2").unwrap();
        assert_eq!(reclaimed.id, job.id);

        handle.abort();
    }

    #[tokio::test]
    async fn test_monitor_shuts_down_drained_server() {
        let temp_root = TempDir::new().unwrap();
        let queue = make_queue(&temp_root, 0);
        let out_dir = TempDir::new().unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = AppState::new(queue.clone(), out_dir.path().to_path_buf());

        let monitor = start_heartbeat_monitor(
            queue,
            format!("http://{}/shutdown", addr),
            fast_config(),
        );

        // The server returns once the monitor posts the shutdown
        let served = tokio::time::timeout(
            Duration::from_secs(5),
            run_dispatch_server(listener, state),
        )
        .await
        .expect("server should shut down");
        assert!(served.is_ok());

        tokio::time::timeout(Duration::from_secs(1), monitor)
            .await
            .expect("monitor should end")
            .unwrap();
    }
}
