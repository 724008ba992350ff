//! ripfleet
//!
//! Distributed transcoding fleet: one coordinator hands disc-image jobs to
//! a pool of workers over an HTTP pull protocol; workers probe, filter and
//! transcode the titles and upload the results.

pub mod client;
pub mod coordinator;
pub mod handbrake;
pub mod heartbeat;
pub mod intake;
pub mod job;
pub mod monitor;
pub mod protocol;
pub mod queue;
pub mod server;
pub mod startup;
pub mod titles;
pub mod worker;

pub use ripfleet_config as config;
pub use ripfleet_config::{
    ConfigError, CoordinatorConfig, Fix, HandbrakeConfig, RipConfig, SplitSpec, WorkerConfig,
};

pub use client::{parse_attachment_filename, Client, ClientError};
pub use coordinator::{Coordinator, CoordinatorError};
pub use handbrake::{
    build_handbrake_command, encode_titles, parse_title_set, plan_chunks, scan_image,
    EncodeOptions, HANDBRAKE_CLI_BIN, PROBE_TIMEOUT,
};
pub use heartbeat::{HeartbeatContext, WORKER_HEARTBEAT_PERIOD};
pub use intake::{deliver_outputs, move_into};
pub use job::{scan_input_jobs, Assignment, Job, JobError};
pub use monitor::{
    start_heartbeat_monitor, MonitorConfig, HEARTBEAT_CHECK_PERIOD, HEARTBEAT_TIMEOUT_PERIOD,
};
pub use protocol::{JobDescriptor, ReportState};
pub use queue::{QueueCounts, QueueManager, TouchOutcome};
pub use server::{create_dispatch_router, run_dispatch_server, AppState, ServerError};
pub use startup::{check_handbrake_available, StartupError};
pub use titles::{expand_langs, filter_titles, remove_duplicate_titles, Chapter, Title, Track};
pub use worker::{run_worker, WorkerError, MIN_DISK_SPACE_LEFT_GIB};

/// Protocol version; workers refuse to attach to a mismatched coordinator.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
