//! CLI entry point for ripfleet
//!
//! Starts either the coordinator (distributes image files to workers) or a
//! worker (processes image files provided by the coordinator), each from
//! its own JSON config file.

use clap::{ArgGroup, Parser};
use ripfleet::{Coordinator, VERSION};
use ripfleet_config::{CoordinatorConfig, WorkerConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Distributed video transcoder based on HandBrake
#[derive(Parser, Debug)]
#[command(name = "ripfleet")]
#[command(author, version = VERSION, about, long_about = None)]
#[command(group(
    ArgGroup::new("mode")
        .required(true)
        .args(["coordinator", "worker"]),
))]
struct Args {
    /// Start as coordinator, distributing image files to the workers
    #[arg(long, value_name = "CONFIG")]
    coordinator: Option<PathBuf>,

    /// Start as worker, processing image files from the coordinator
    #[arg(long, value_name = "CONFIG")]
    worker: Option<PathBuf>,

    /// Increase log verbosity (-v: debug, -vv: trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ripfleet={0},ripfleet_cli={0}", default_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Some(config_path) = args.coordinator {
        run_coordinator(&config_path).await
    } else if let Some(config_path) = args.worker {
        run_worker(&config_path).await
    } else {
        // clap's arg group guarantees one mode is present
        ExitCode::FAILURE
    }
}

async fn run_coordinator(config_path: &PathBuf) -> ExitCode {
    let config = match CoordinatorConfig::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let coordinator = match Coordinator::new(config) {
        Ok(coordinator) => coordinator,
        Err(e) => {
            error!("Failed to start coordinator: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match coordinator.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Coordinator error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_worker(config_path: &PathBuf) -> ExitCode {
    let config = match WorkerConfig::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match ripfleet::worker::run_worker(&config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Worker error: {}", e);
            ExitCode::FAILURE
        }
    }
}
