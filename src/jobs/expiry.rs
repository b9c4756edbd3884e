//! Retention scheduling and the background sweep loop.
//!
//! One min-heap of `(deadline, job)` pairs drained by a single task, instead
//! of a timer per job.

use crate::types::{Event, JobId};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::Path;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::JobManager;

/// Pending job deletions, earliest deadline first
#[derive(Debug, Default)]
pub(crate) struct ExpiryScheduler {
    heap: Mutex<BinaryHeap<Reverse<(Instant, JobId)>>>,
    wakeup: Notify,
}

impl ExpiryScheduler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue `id` for deletion at `deadline` and wake the sweep loop
    pub(crate) async fn schedule(&self, id: JobId, deadline: Instant) {
        self.heap.lock().await.push(Reverse((deadline, id)));
        self.wakeup.notify_one();
    }

    /// Remove and return every entry due at or before `now`, earliest first
    pub(crate) async fn pop_due(&self, now: Instant) -> Vec<JobId> {
        let mut heap = self.heap.lock().await;
        let mut due = Vec::new();
        while let Some(Reverse((deadline, _))) = heap.peek() {
            if *deadline > now {
                break;
            }
            if let Some(Reverse((_, id))) = heap.pop() {
                due.push(id);
            }
        }
        due
    }

    /// Queue an entry without waking the sweep loop
    #[cfg(test)]
    pub(crate) async fn schedule_quietly(&self, id: JobId, deadline: Instant) {
        self.heap.lock().await.push(Reverse((deadline, id)));
    }

    /// Earliest pending deadline
    pub(crate) async fn next_deadline(&self) -> Option<Instant> {
        self.heap.lock().await.peek().map(|Reverse((deadline, _))| *deadline)
    }

    /// Number of scheduled deletions
    pub(crate) async fn len(&self) -> usize {
        self.heap.lock().await.len()
    }

    async fn changed(&self) {
        self.wakeup.notified().await
    }
}

impl JobManager {
    /// Schedule deletion of a terminal job after the retention window
    pub(crate) async fn schedule_expiry(&self, id: JobId) {
        let deadline = Instant::now() + self.config.storage.retention;
        self.expiry.schedule(id, deadline).await;
        tracing::debug!(
            job_id = %id,
            retention_secs = self.config.storage.retention.as_secs(),
            "Expiry scheduled"
        );
    }

    /// Spawn the sweep loop; it runs until shutdown
    pub(crate) fn start_expiry_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            manager.run_expiry_sweeper().await;
        })
    }

    async fn run_expiry_sweeper(&self) {
        let idle = self.config.storage.sweep_interval;
        tracing::debug!(idle_secs = idle.as_secs(), "Expiry sweeper started");

        loop {
            let now = Instant::now();
            for id in self.expiry.pop_due(now).await {
                self.expire(&id).await;
            }

            let wake_at = match self.expiry.next_deadline().await {
                Some(deadline) => deadline.min(now + idle),
                None => now + idle,
            };

            tokio::select! {
                _ = self.shutdown_token.cancelled() => {
                    tracing::debug!("Expiry sweeper stopped");
                    break;
                }
                _ = tokio::time::sleep_until(wake_at) => {}
                _ = self.expiry.changed() => {}
            }
        }
    }

    /// Delete a job and its files
    ///
    /// File removal is best-effort; a failure is logged and the job stays deleted.
    pub(crate) async fn expire(&self, id: &JobId) {
        let job = match self.store.delete(id).await {
            Ok(Some(job)) => job,
            Ok(None) => return,
            Err(e) => {
                tracing::error!(job_id = %id, error = %e, "Failed to delete expired job");
                return;
            }
        };

        remove_best_effort(id, &job.file_path).await;
        remove_best_effort(id, &job.temp_path).await;

        tracing::info!(job_id = %id, filename = %job.filename, "Job expired");
        self.emit_event(Event::Expired { id: *id });
    }
}

async fn remove_best_effort(id: &JobId, path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(job_id = %id, path = %path.display(), "Removed file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(job_id = %id, path = %path.display(), error = %e, "Failed to remove file")
        }
    }
}
