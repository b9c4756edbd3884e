//! Request validation and job registration.

use crate::error::{Error, Result};
use crate::types::{Event, Job, JobId, JobState, JobTicket};
use crate::utils::{join_url, unique_filename};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use utoipa::ToSchema;

use super::JobManager;

/// Body of a job creation request
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    /// Remote resource to fetch
    #[serde(default)]
    pub link: Option<String>,

    /// Desired filename; sanitized and prefixed before use
    #[serde(default, alias = "filename")]
    pub filename_hint: Option<String>,

    /// Outbound request headers, forwarded verbatim
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
}

impl JobManager {
    /// Register a job and start fetching it in the background
    ///
    /// Returns as soon as the job is stored in `pending`; the fetch never
    /// delays the response. `base_url` is the externally reachable origin used
    /// for the returned links.
    ///
    /// # Errors
    ///
    /// - [`Error::ShuttingDown`] once [`shutdown`](Self::shutdown) was called
    /// - [`Error::Validation`] when `link` or `filenameHint` is missing or blank
    /// - [`Error::TargetForbidden`] when the target policy rejects `link`
    pub async fn create_job(&self, request: CreateJobRequest, base_url: &str) -> Result<JobTicket> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let link = required(request.link, "link")?;
        let hint = required(request.filename_hint, "filenameHint")?;
        self.fetcher.policy().check_link(&link)?;

        let job = {
            let _guard = self.intake_lock.lock().await;
            let (id, filename) = self.allocate_name(&hint).await?;

            let job = Job {
                id,
                state: JobState::Pending,
                source_link: link,
                headers: request.headers.unwrap_or_default(),
                file_path: self.config.storage.download_dir.join(&filename),
                temp_path: self.config.storage.temp_dir.join(&filename),
                final_url: join_url(base_url, &format!("/downloads/{}", filename)),
                redirect_url: join_url(base_url, &format!("/dl/{}", id)),
                filename,
                created_at: chrono::Utc::now(),
                finished_at: None,
            };
            self.store.put(job.clone()).await?;
            job
        };

        tracing::info!(job_id = %job.id, filename = %job.filename, "Job created");
        self.emit_event(Event::JobCreated {
            id: job.id,
            filename: job.filename.clone(),
        });

        let manager = self.clone();
        let id = job.id;
        tokio::spawn(async move { manager.process_job(id).await });

        Ok(JobTicket {
            job_id: job.id,
            redirect_url: job.redirect_url,
            direct_url: job.final_url,
            filename: job.filename,
        })
    }

    /// Pick an unused id and filename
    ///
    /// Caller holds `intake_lock`. The id prefix already separates identical
    /// hints; this also rules out a prefix collision with a tracked job or a
    /// file left on disk by an earlier run.
    async fn allocate_name(&self, hint: &str) -> Result<(JobId, String)> {
        let taken: HashSet<String> = self
            .store
            .list()
            .await?
            .into_iter()
            .map(|job| job.filename)
            .collect();

        loop {
            let id = JobId::new();
            let filename = unique_filename(&id, hint);
            if taken.contains(&filename) || self.store.get(&id).await?.is_some() {
                continue;
            }
            let on_disk = tokio::fs::try_exists(self.config.storage.download_dir.join(&filename))
                .await
                .unwrap_or(false);
            if !on_disk {
                return Ok((id, filename));
            }
            tracing::debug!(filename = %filename, "Filename already on disk, picking another id");
        }
    }
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::Validation(format!("\"{}\" is required", field)))
}
