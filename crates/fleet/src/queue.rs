//! Queue manager: waiting, working and done job collections.
//!
//! All state transitions are serialized under a single mutex; contention is
//! negligible next to transcoding time. Waiting is popped from the tail, so
//! the most recently (re)queued job is handed out first.

use crate::job::{Assignment, Job};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of a heartbeat touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchOutcome {
    /// Heartbeat accepted, timestamp updated.
    Updated,
    /// Host did not match the assignment; the job was requeued.
    Reassigned,
    /// No working job with that id.
    Unknown,
}

/// Queue lengths, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueCounts {
    pub waiting: usize,
    pub working: usize,
    pub done: usize,
}

#[derive(Debug)]
struct WorkingJob {
    job: Job,
    assignment: Assignment,
}

#[derive(Default, Debug)]
struct QueueState {
    waiting: Vec<Job>,
    working: HashMap<Uuid, WorkingJob>,
    done: Vec<Job>,
}

/// The three job queues plus per-job assignment state, behind one mutex.
#[derive(Debug)]
pub struct QueueManager {
    state: Mutex<QueueState>,
}

impl QueueManager {
    /// Build a manager holding the given jobs in Waiting, in order.
    pub fn new(jobs: Vec<Job>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                waiting: jobs,
                working: HashMap::new(),
                done: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        // Queue entries stay consistent per-operation, so keep serving
        // even if a previous holder panicked.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Atomically move one job from Waiting to Working for this worker.
    ///
    /// Pops from the tail of Waiting. Returns a snapshot of the claimed job
    /// or `None` when Waiting is empty.
    pub fn claim(&self, worker_address: &str) -> Option<Job> {
        let mut state = self.lock();
        let job = state.waiting.pop()?;
        info!("Job {} assigned to {}", job.id, worker_address);
        let snapshot = job.clone();
        state.working.insert(
            job.id,
            WorkingJob {
                job,
                assignment: Assignment::new(worker_address.to_string()),
            },
        );
        Some(snapshot)
    }

    /// Record a heartbeat from `worker_address` for a working job.
    ///
    /// A heartbeat from any other host revokes the assignment: the job is
    /// requeued under the same lock and `Reassigned` is returned.
    pub fn touch(&self, job_id: Uuid, worker_address: &str) -> TouchOutcome {
        let mut state = self.lock();
        let Some(working) = state.working.get_mut(&job_id) else {
            return TouchOutcome::Unknown;
        };

        if working.assignment.worker_address == worker_address {
            working.assignment.last_heartbeat = std::time::Instant::now();
            TouchOutcome::Updated
        } else {
            requeue_locked(&mut state, job_id);
            TouchOutcome::Reassigned
        }
    }

    /// Move a working job to Done and drop its assignment.
    ///
    /// Returns a snapshot of the completed job, or `None` for an unknown id
    /// (e.g. the job timed out and was requeued meanwhile).
    pub fn complete(&self, job_id: Uuid) -> Option<Job> {
        let mut state = self.lock();
        let working = state.working.remove(&job_id)?;
        let snapshot = working.job.clone();
        state.done.push(working.job);
        Some(snapshot)
    }

    /// Move a working job back to the tail of Waiting.
    ///
    /// Any received result files are discarded and the staging directory is
    /// emptied. Returns false for an unknown id.
    pub fn requeue(&self, job_id: Uuid) -> bool {
        let mut state = self.lock();
        requeue_locked(&mut state, job_id)
    }

    /// Ids of all working jobs whose last heartbeat is older than `timeout`.
    pub fn scan_timeouts(&self, timeout: Duration) -> Vec<Uuid> {
        let state = self.lock();
        state
            .working
            .values()
            .filter(|w| w.assignment.last_heartbeat.elapsed() > timeout)
            .map(|w| w.job.id)
            .collect()
    }

    /// Append a received result file to a working job.
    ///
    /// Returns false when the job is not working (the file is then an
    /// orphan the caller should discard).
    pub fn record_file(&self, job_id: Uuid, path: PathBuf) -> bool {
        let mut state = self.lock();
        match state.working.get_mut(&job_id) {
            Some(working) => {
                working.job.received_files.push(path);
                true
            }
            None => false,
        }
    }

    /// Snapshot of a working job, including files received so far.
    pub fn working_snapshot(&self, job_id: Uuid) -> Option<Job> {
        let state = self.lock();
        state.working.get(&job_id).map(|w| w.job.clone())
    }

    /// True when both Waiting and Working are empty.
    pub fn is_drained(&self) -> bool {
        let state = self.lock();
        state.waiting.is_empty() && state.working.is_empty()
    }

    /// Current queue lengths.
    pub fn counts(&self) -> QueueCounts {
        let state = self.lock();
        QueueCounts {
            waiting: state.waiting.len(),
            working: state.working.len(),
            done: state.done.len(),
        }
    }
}

/// Requeue under an already-held lock: drop received files, reset the
/// staging directory, push to the tail of Waiting.
fn requeue_locked(state: &mut QueueState, job_id: Uuid) -> bool {
    let Some(mut working) = state.working.remove(&job_id) else {
        return false;
    };

    working.job.received_files.clear();
    if let Err(e) = fs::remove_dir_all(&working.job.temp_path)
        .and_then(|_| fs::create_dir_all(&working.job.temp_path))
    {
        warn!(
            "Failed to reset staging dir for job {}: {}",
            working.job.id, e
        );
    }

    info!("Job {} requeued", working.job.id);
    state.waiting.push(working.job);
    true
}
