//! Worker driver: the claim-process-upload loop.
//!
//! One job runs at a time. While it runs, the heartbeat context keeps the
//! coordinator's assignment alive in parallel with the pipeline; a failure
//! in any step abandons the job (scratch deleted, heartbeat stopped) and
//! the loop claims the next one. The worker exits once the coordinator
//! reports a drained queue.

use crate::client::{Client, ClientError};
use crate::handbrake::{encode_titles, scan_image, EncodeOptions};
use crate::heartbeat::{HeartbeatContext, WORKER_HEARTBEAT_PERIOD};
use crate::protocol::JobDescriptor;
use crate::startup::{check_handbrake_available, StartupError};
use crate::titles::{filter_titles, remove_duplicate_titles};
use ripfleet_config::{Fix, WorkerConfig};
use std::io;
use std::path::Path;
use tempfile::TempDir;
use thiserror::Error;
use tracing::{info, warn};

/// Minimum free space in the scratch filesystem before a warning is
/// emitted, in GiB. A DVD image plus its outputs fit comfortably below
/// this.
pub const MIN_DISK_SPACE_LEFT_GIB: u64 = 15;

/// Fatal worker errors; per-job failures are handled inside the loop.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Startup check failed
    #[error("Startup check failed: {0}")]
    Startup(#[from] StartupError),

    /// The coordinator could not be reached
    #[error("Coordinator unavailable: {0}")]
    ServerUnavailable(ClientError),

    /// Coordinator and worker run different versions
    #[error("Version mismatch: coordinator runs {coordinator}, worker runs {worker}")]
    VersionMismatch { coordinator: String, worker: String },
}

/// Why one job was abandoned.
#[derive(Debug, Error)]
enum JobFailure {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Transfer failed: {0}")]
    Transfer(#[from] ClientError),

    #[error("Connection to coordinator lost")]
    ConnectionLost,
}

/// Run the worker until the coordinator's queue drains.
pub async fn run_worker(config: &WorkerConfig) -> Result<(), WorkerError> {
    check_handbrake_available()?;

    let client = Client::new(&config.ip, config.port);

    let coordinator_version = client
        .fetch_version()
        .await
        .map_err(WorkerError::ServerUnavailable)?;
    if coordinator_version != crate::VERSION {
        return Err(WorkerError::VersionMismatch {
            coordinator: coordinator_version,
            worker: crate::VERSION.to_string(),
        });
    }

    loop {
        let descriptor = match client.claim_job().await {
            Ok(Some(descriptor)) => descriptor,
            Ok(None) => {
                info!("No jobs left");
                return Ok(());
            }
            Err(e) => return Err(WorkerError::ServerUnavailable(e)),
        };

        info!("Processing job {}", descriptor.name);
        let heartbeat = HeartbeatContext::start(
            client.clone(),
            descriptor.name,
            WORKER_HEARTBEAT_PERIOD,
        );

        let outcome = process_job(&client, &descriptor, &heartbeat).await;
        heartbeat.stop().await;

        match outcome {
            Ok(()) => info!("Job {} done", descriptor.name),
            Err(e) => warn!("Job {} failed: {}", descriptor.name, e),
        }
    }
}

/// Run one claimed job through fetch, probe, transcode and upload.
async fn process_job(
    client: &Client,
    descriptor: &JobDescriptor,
    heartbeat: &HeartbeatContext,
) -> Result<(), JobFailure> {
    let scratch = TempDir::new()?;

    if let Some(free) = free_space_gib(scratch.path()) {
        if free < MIN_DISK_SPACE_LEFT_GIB {
            warn!(
                "Free space in scratch dir might not be enough ({} GiB left)",
                free
            );
        }
    }

    let image_path = client.fetch_input(descriptor.name, scratch.path()).await?;
    ensure_connected(heartbeat)?;

    let opts = EncodeOptions::from_fixes(&descriptor.fixes);
    let titles = scan_image(&image_path, opts.use_libdvdread).await;
    let titles = filter_titles(
        titles,
        descriptor.rip_config.len_range,
        &descriptor.rip_config.a_lang,
        &descriptor.rip_config.s_lang,
    );
    let titles = if descriptor.fixes.contains(&Fix::RemoveDuplicateTracks) {
        remove_duplicate_titles(titles)
    } else {
        titles
    };
    info!("{} title(s) selected", titles.len());
    ensure_connected(heartbeat)?;

    let outputs = encode_titles(
        &descriptor.hb_config,
        &opts,
        &titles,
        &image_path,
        scratch.path(),
    )
    .await;
    ensure_connected(heartbeat)?;

    client
        .send_results(descriptor.name, scratch.path(), &outputs)
        .await?;
    Ok(())
}

/// Step-boundary check of the heartbeat flag.
fn ensure_connected(heartbeat: &HeartbeatContext) -> Result<(), JobFailure> {
    if heartbeat.connection_failed() {
        Err(JobFailure::ConnectionLost)
    } else {
        Ok(())
    }
}

/// Available space of the filesystem holding `path`, in GiB.
fn free_space_gib(path: &Path) -> Option<u64> {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|disk| path.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space() / (1024 * 1024 * 1024))
}
