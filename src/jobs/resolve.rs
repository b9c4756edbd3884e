//! Read-only lookups: redirect resolution, legacy status, listing and stats.
//!
//! Nothing here mutates job state.

use crate::error::{Error, Result};
use crate::types::{
    Job, JobBreakdown, JobId, JobState, JobStatusReport, Resolution, StatsSnapshot,
    format_uptime,
};

use super::JobManager;

impl JobManager {
    /// Decide what the smart redirect link should do for `job_id`
    ///
    /// Never-issued, malformed and expired ids all resolve to
    /// [`Resolution::NotFound`].
    pub async fn resolve(&self, job_id: &str) -> Result<Resolution> {
        let Some(job) = self.find(job_id).await? else {
            return Ok(Resolution::NotFound);
        };

        Ok(match job.state {
            JobState::Pending | JobState::Downloading { .. } => Resolution::Waiting {
                status: job.status(),
                progress: job.state.progress().unwrap_or(0),
            },
            JobState::Completed => Resolution::Redirect {
                final_url: job.final_url,
            },
            JobState::Failed { error } => Resolution::Failed { error },
        })
    }

    /// Legacy polling report
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for unknown or expired ids.
    pub async fn job_status(&self, job_id: &str) -> Result<JobStatusReport> {
        self.find(job_id)
            .await?
            .map(|job| JobStatusReport::from(&job))
            .ok_or_else(|| Error::NotFound(job_id.to_string()))
    }

    /// Look up one job
    pub async fn get_job(&self, id: &JobId) -> Result<Option<Job>> {
        self.store.get(id).await
    }

    /// Snapshot of every tracked job, oldest first
    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        self.store.list().await
    }

    /// Uptime, proxy counters and a job breakdown
    pub async fn stats(&self) -> Result<StatsSnapshot> {
        let jobs = self.store.list().await?;
        let uptime_seconds = self.started_at.elapsed().as_secs();

        Ok(StatsSnapshot {
            uptime: format_uptime(uptime_seconds),
            uptime_seconds,
            proxy_stats: self.proxy.stats().snapshot(),
            jobs: JobBreakdown::from_jobs(&jobs),
        })
    }

    async fn find(&self, job_id: &str) -> Result<Option<Job>> {
        match job_id.parse::<JobId>() {
            Ok(id) => self.store.get(&id).await,
            Err(_) => Ok(None),
        }
    }
}
