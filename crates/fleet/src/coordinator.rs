//! Coordinator assembly and run loop.
//!
//! Startup sequence: load config, create the process temp root, scan the
//! input directory into jobs, then serve the dispatch API with the
//! heartbeat monitor alongside until the queues drain and the monitor
//! shuts the server down.

use crate::job::{scan_input_jobs, JobError};
use crate::monitor::{start_heartbeat_monitor, MonitorConfig};
use crate::queue::QueueManager;
use crate::server::{run_dispatch_server, AppState, ServerError};
use ripfleet_config::CoordinatorConfig;
use std::io;
use std::sync::Arc;
use tempfile::TempDir;
use thiserror::Error;
use tracing::info;

/// Error type for coordinator operations
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Job creation or input scan failed
    #[error("Input scan failed: {0}")]
    Job(#[from] JobError),

    /// Server error
    #[error(transparent)]
    Server(#[from] ServerError),

    /// IO error (temp root, listener)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Coordinator state: config, queues and the staging temp root.
#[derive(Debug)]
pub struct Coordinator {
    config: CoordinatorConfig,
    queue: Arc<QueueManager>,
    /// Process-lifetime root for per-job staging dirs; removed on drop.
    temp_root: TempDir,
}

impl Coordinator {
    /// Build the coordinator: create the temp root and scan the input
    /// directory into the initial job queue.
    pub fn new(config: CoordinatorConfig) -> Result<Self, CoordinatorError> {
        if !config.fixes.is_empty() {
            info!("Active fixes:");
            for fix in &config.fixes {
                info!("  {}", fix);
            }
        }

        let temp_root = TempDir::new()?;
        let jobs = scan_input_jobs(&config, temp_root.path())?;
        info!("Created {} jobs", jobs.len());

        Ok(Self {
            queue: Arc::new(QueueManager::new(jobs)),
            config,
            temp_root,
        })
    }

    /// Job queues, for inspection.
    pub fn queue(&self) -> Arc<QueueManager> {
        self.queue.clone()
    }

    /// Serve the dispatch API until the monitor drains and stops it.
    pub async fn run(self) -> Result<(), CoordinatorError> {
        self.run_with_monitor(MonitorConfig::default()).await
    }

    /// Like [`run`](Self::run) with explicit monitor timing.
    pub async fn run_with_monitor(self, monitor: MonitorConfig) -> Result<(), CoordinatorError> {
        let bind = format!("{}:{}", self.config.ip, self.config.port);
        let listener = tokio::net::TcpListener::bind(&bind).await?;
        let addr = listener.local_addr()?;
        info!("Dispatch server listening on {}", addr);

        let shutdown_url = format!("http://127.0.0.1:{}/shutdown", addr.port());
        let monitor_handle = start_heartbeat_monitor(self.queue.clone(), shutdown_url, monitor);

        let state = AppState::new(self.queue.clone(), self.config.out_path.clone());
        run_dispatch_server(listener, state).await?;

        monitor_handle.abort();
        self.temp_root.close()?;
        Ok(())
    }
}
