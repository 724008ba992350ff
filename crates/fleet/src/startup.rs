//! Startup checks for the worker.
//!
//! The worker cannot do anything without the transcoder binary, so its
//! presence is verified before attaching to a coordinator.

use crate::handbrake::HANDBRAKE_CLI_BIN;
use std::process::Command;
use thiserror::Error;

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Transcoder not available: {0}")]
    HandbrakeUnavailable(String),
}

/// Check that the transcoder runs by invoking `HandBrakeCLI --version`.
pub fn check_handbrake_available() -> Result<(), StartupError> {
    let output = Command::new(HANDBRAKE_CLI_BIN)
        .arg("--version")
        .output()
        .map_err(|e| {
            StartupError::HandbrakeUnavailable(format!(
                "HandBrakeCLI --version failed; is HandBrake installed and in PATH? Error: {}",
                e
            ))
        })?;

    if !output.status.success() {
        return Err(StartupError::HandbrakeUnavailable(
            "HandBrakeCLI --version exited with an error".to_string(),
        ));
    }

    Ok(())
}
