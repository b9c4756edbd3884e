//! State transitions, events and shutdown coordination.

use crate::error::{Error, Result};
use crate::types::{Event, Job, JobEvent, JobId, JobState};
use std::sync::atomic::Ordering;
use tokio::time::Instant;

use super::JobManager;

impl JobManager {
    /// Apply a lifecycle event to a stored job
    ///
    /// Only the job's own worker calls this, so writes per job are already
    /// serialized. Entering a terminal state schedules the job for expiry.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the job is no longer stored
    /// - [`Error::InvalidTransition`] if the event is illegal in the current state
    pub(crate) async fn apply_event(&self, id: JobId, event: JobEvent) -> Result<Job> {
        let mut job = self
            .store
            .get(&id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let next = job.state.apply(&event).inspect_err(|e| {
            tracing::warn!(job_id = %id, error = %e, "Rejected job transition");
        })?;
        if next == job.state {
            return Ok(job);
        }

        job.state = next;
        if job.state.is_terminal() {
            job.finished_at = Some(chrono::Utc::now());
        }
        self.store.put(job.clone()).await?;

        match &job.state {
            JobState::Pending => {}
            JobState::Downloading { progress } => {
                tracing::debug!(job_id = %id, progress, "Progress updated");
                self.emit_event(Event::Downloading {
                    id,
                    percent: *progress,
                });
            }
            JobState::Completed => {
                tracing::info!(job_id = %id, filename = %job.filename, "Download completed");
                self.emit_event(Event::Completed {
                    id,
                    final_url: job.final_url.clone(),
                });
                self.schedule_expiry(id).await;
            }
            JobState::Failed { error } => {
                tracing::warn!(job_id = %id, error = %error, "Download failed");
                self.emit_event(Event::Failed {
                    id,
                    error: error.clone(),
                });
                self.schedule_expiry(id).await;
            }
        }

        Ok(job)
    }

    /// Stop accepting jobs and stop the expiry sweep loop
    ///
    /// Expiries already due are carried out before returning. In-flight
    /// fetches keep running to their terminal state, but nothing expires
    /// after this call: those jobs, and any whose retention has not yet
    /// elapsed, stay resolvable with their files on disk until the process
    /// exits.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new jobs");

        self.shutdown_token.cancel();

        let due = self.expiry.pop_due(Instant::now()).await;
        if !due.is_empty() {
            tracing::info!(count = due.len(), "Expiring due jobs before shutdown");
        }
        for id in due {
            self.expire(&id).await;
        }

        let pending_expiries = self.expiry.len().await;
        if pending_expiries > 0 {
            tracing::info!(
                pending_expiries,
                "Expiry sweep stopped with jobs still scheduled"
            );
        }

        self.emit_event(Event::Shutdown);
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Whether [`shutdown`](Self::shutdown) has been called
    pub fn is_shutting_down(&self) -> bool {
        !self.accepting_new.load(Ordering::SeqCst)
    }
}
