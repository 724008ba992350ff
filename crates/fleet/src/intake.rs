//! Result intake: landing uploaded files in the output directory.
//!
//! Runs when a job's DONE report arrives: every staged result file and the
//! consumed source image are moved into the output directory, and the
//! staging directory is removed. Moves of multi-gigabyte files can take
//! minutes, so callers run this off the async runtime.

use crate::job::Job;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{error, info, warn};

/// Move `src` into the directory `dir`, keeping its leaf name.
///
/// Refuses to overwrite: an existing file of the same name is an error.
/// Falls back to copy-and-remove when a plain rename crosses filesystems.
pub fn move_into(src: &Path, dir: &Path) -> io::Result<()> {
    let name = src
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "source has no file name"))?;
    let dest = dir.join(name);

    if dest.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", dest.display()),
        ));
    }

    match fs::rename(src, &dest) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(src, &dest)?;
            fs::remove_file(src)
        }
    }
}

/// Land a finished job's files in the output directory.
///
/// Each received file is moved into `out_path`; a name collision is logged
/// and that file skipped while the rest still land. Afterwards the staging
/// directory is removed and the source image is moved out of the input
/// directory.
pub fn deliver_outputs(job: &Job, out_path: &Path) {
    for file in &job.received_files {
        match move_into(file, out_path) {
            Ok(()) => info!("Delivered {}", file.display()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                error!(
                    "Output file {} already exists. Skipping file...",
                    file.display()
                );
            }
            Err(e) => error!("Failed to deliver {}: {}", file.display(), e),
        }
    }

    if let Err(e) = fs::remove_dir_all(&job.temp_path) {
        warn!("Failed to remove staging dir {}: {}", job.temp_path.display(), e);
    }

    if let Err(e) = move_into(&job.source_path, out_path) {
        error!(
            "Failed to move source image {}: {}",
            job.source_path.display(),
            e
        );
    }
}
