//! The single fetch task run for each job.

use crate::error::Result;
use crate::fetcher::ProgressSink;
use crate::types::{JobEvent, JobId};
use async_trait::async_trait;

use super::JobManager;

/// Forwards fetch progress into the job's state
struct JobProgress<'a> {
    manager: &'a JobManager,
    id: JobId,
    last_percent: Option<u8>,
}

#[async_trait]
impl ProgressSink for JobProgress<'_> {
    async fn on_started(&mut self, total_bytes: Option<u64>) -> Result<()> {
        tracing::info!(job_id = %self.id, total_bytes = ?total_bytes, "Download started");
        self.manager.apply_event(self.id, JobEvent::Start).await?;
        Ok(())
    }

    async fn on_chunk(&mut self, _downloaded_bytes: u64, percent: Option<u8>) -> Result<()> {
        // Unknown size leaves progress at 0
        let Some(percent) = percent else {
            return Ok(());
        };
        if self.last_percent == Some(percent) {
            return Ok(());
        }
        self.last_percent = Some(percent);
        self.manager
            .apply_event(self.id, JobEvent::Progress(percent))
            .await?;
        Ok(())
    }
}

impl JobManager {
    /// Fetch a registered job to completion or failure
    ///
    /// Runs exactly once per job. Every fetch or storage error ends as a
    /// `failed` state; nothing is returned to a caller.
    pub(crate) async fn process_job(&self, id: JobId) {
        let job = match self.store.get(&id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::warn!(job_id = %id, "Job vanished before its fetch started");
                return;
            }
            Err(e) => {
                tracing::error!(job_id = %id, error = %e, "Failed to load job for fetch");
                return;
            }
        };

        let mut sink = JobProgress {
            manager: self,
            id,
            last_percent: None,
        };
        let result = self
            .fetcher
            .download(
                &job.source_link,
                &job.headers,
                &job.temp_path,
                &job.file_path,
                &mut sink,
            )
            .await;

        let event = match result {
            Ok(summary) => {
                tracing::debug!(
                    job_id = %id,
                    bytes = summary.bytes_written,
                    "Body stored"
                );
                JobEvent::Complete
            }
            Err(e) => JobEvent::Fail(e.to_string()),
        };

        if let Err(e) = self.apply_event(id, event).await {
            tracing::error!(job_id = %id, error = %e, "Failed to record fetch outcome");
        }
    }
}
