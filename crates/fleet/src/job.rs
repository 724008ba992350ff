//! Job model for the coordinator.
//!
//! A job is one source disc image to be transcoded end-to-end. Jobs are
//! created at startup from a flat scan of the input directory and live
//! until the coordinator exits; uploads are staged in a per-job directory
//! under a process-lifetime temp root.

use crate::protocol::JobDescriptor;
use ripfleet_config::{CoordinatorConfig, Fix, HandbrakeConfig, RipConfig};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;
use walkdir::WalkDir;

/// Error type for job creation and input scanning.
#[derive(Debug, Error)]
pub enum JobError {
    /// IO error creating the staging directory or reading the input dir
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The input directory contains a subdirectory
    #[error("Subdirectories are not supported in input path {0}")]
    SubdirUnsupported(PathBuf),
}

/// One source image to be transcoded end-to-end.
#[derive(Debug, Clone)]
pub struct Job {
    /// Unique job identifier, stable for the job's lifetime.
    pub id: Uuid,
    /// Coordinator-local path of the source image.
    pub source_path: PathBuf,
    /// Leaf name of the source image, presented to workers.
    pub source_name: String,
    /// Title selection policy.
    pub rip_config: RipConfig,
    /// Transcoder settings.
    pub hb_config: HandbrakeConfig,
    /// Active fixes.
    pub fixes: Vec<Fix>,
    /// Staging directory for received result files.
    pub temp_path: PathBuf,
    /// Result files received so far (append-only while the job is working).
    pub received_files: Vec<PathBuf>,
}

impl Job {
    /// Create a job for one source image.
    ///
    /// The staging directory `temp_root/<id>` is created here and removed
    /// on successful completion (or emptied on requeue).
    pub fn create(
        source_path: PathBuf,
        rip_config: RipConfig,
        hb_config: HandbrakeConfig,
        fixes: Vec<Fix>,
        temp_root: &Path,
    ) -> Result<Self, JobError> {
        let id = Uuid::new_v4();
        let source_name = source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let temp_path = temp_root.join(id.to_string());
        fs::create_dir(&temp_path)?;

        Ok(Self {
            id,
            source_path,
            source_name,
            rip_config,
            hb_config,
            fixes,
            temp_path,
            received_files: Vec::new(),
        })
    }

    /// Wire descriptor handed to the claiming worker.
    pub fn descriptor(&self) -> JobDescriptor {
        JobDescriptor {
            name: self.id,
            rip_config: self.rip_config.clone(),
            hb_config: self.hb_config.clone(),
            fixes: self.fixes.clone(),
        }
    }
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Mutable claim state of a working job.
#[derive(Debug, Clone)]
pub struct Assignment {
    /// Remote host identity captured at claim time.
    pub worker_address: String,
    /// Most recent valid worker contact.
    pub last_heartbeat: Instant,
}

impl Assignment {
    /// New assignment for the given worker, stamped now.
    pub fn new(worker_address: String) -> Self {
        Self {
            worker_address,
            last_heartbeat: Instant::now(),
        }
    }
}

/// Scan the input directory and create one job per source image.
///
/// The scan is flat: a subdirectory in `in_path` is an error. Files are
/// processed in name order.
pub fn scan_input_jobs(config: &CoordinatorConfig, temp_root: &Path) -> Result<Vec<Job>, JobError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(&config.in_path).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| JobError::Io(io::Error::other(e)))?;
        if entry.file_type().is_dir() {
            return Err(JobError::SubdirUnsupported(entry.path().to_path_buf()));
        }
        files.push(entry.path().to_path_buf());
    }
    files.sort();

    let mut jobs = Vec::with_capacity(files.len());
    for path in files {
        let job = Job::create(
            path,
            config.rip_config.clone(),
            config.hb_config.clone(),
            config.fixes.clone(),
            temp_root,
        )?;
        debug!("Created job {} for {}", job.id, job.source_name);
        jobs.push(job);
    }

    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(in_path: PathBuf, out_path: PathBuf) -> CoordinatorConfig {
        CoordinatorConfig {
            hb_config: HandbrakeConfig::default(),
            rip_config: RipConfig::default(),
            fixes: vec![Fix::RemoveDuplicateTracks],
            in_path,
            out_path,
            ip: "127.0.0.1".to_string(),
            port: 0,
        }
    }

    #[test]
    fn test_create_job() {
        let temp_root = TempDir::new().unwrap();

        let job = Job::create(
            PathBuf::from("/srv/isos/MOVIE.iso"),
            RipConfig::default(),
            HandbrakeConfig::default(),
            vec![Fix::UseLibdvdread],
            temp_root.path(),
        )
        .expect("should create job");

        assert_eq!(job.source_name, "MOVIE.iso");
        assert!(job.temp_path.starts_with(temp_root.path()));
        assert!(job.temp_path.is_dir());
        assert!(job.received_files.is_empty());

        let descriptor = job.descriptor();
        assert_eq!(descriptor.name, job.id);
        assert_eq!(descriptor.fixes, vec![Fix::UseLibdvdread]);
    }

    #[test]
    fn test_scan_input_jobs_sorted() {
        let in_dir = TempDir::new().unwrap();
        let temp_root = TempDir::new().unwrap();
        std::fs::write(in_dir.path().join("B.iso"), b"b").unwrap();
        std::fs::write(in_dir.path().join("A.iso"), b"a").unwrap();

        let config = test_config(in_dir.path().to_path_buf(), PathBuf::from("/out"));
        let jobs = scan_input_jobs(&config, temp_root.path()).expect("should scan");

        let names: Vec<&str> = jobs.iter().map(|j| j.source_name.as_str()).collect();
        assert_eq!(names, vec!["A.iso", "B.iso"]);

        // Distinct staging directories per job
        assert_ne!(jobs[0].temp_path, jobs[1].temp_path);
        assert!(jobs[0].temp_path.is_dir());
    }

    #[test]
    fn test_scan_input_jobs_rejects_subdirs() {
        let in_dir = TempDir::new().unwrap();
        let temp_root = TempDir::new().unwrap();
        std::fs::write(in_dir.path().join("A.iso"), b"a").unwrap();
        std::fs::create_dir(in_dir.path().join("nested")).unwrap();

        let config = test_config(in_dir.path().to_path_buf(), PathBuf::from("/out"));
        let err = scan_input_jobs(&config, temp_root.path()).unwrap_err();
        assert!(matches!(err, JobError::SubdirUnsupported(_)));
    }

    #[test]
    fn test_scan_input_jobs_empty_dir() {
        let in_dir = TempDir::new().unwrap();
        let temp_root = TempDir::new().unwrap();

        let config = test_config(in_dir.path().to_path_buf(), PathBuf::from("/out"));
        let jobs = scan_input_jobs(&config, temp_root.path()).unwrap();
        assert!(jobs.is_empty());
    }
}
