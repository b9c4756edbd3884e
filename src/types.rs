//! Core types: job identifiers, the job state machine, events and reports.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Unique identifier for a job
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a fresh random identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First 8 hex characters, used to namespace stored filenames
    pub fn short_prefix(&self) -> String {
        let mut buf = Uuid::encode_buffer();
        self.0.hyphenated().encode_lower(&mut buf)[..8].to_string()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(JobId)
            .map_err(|_| Error::NotFound(s.to_string()))
    }
}

/// Job status as exposed to clients
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Registered, fetch not yet reading a response
    Pending,
    /// Response body is being written to storage
    Downloading,
    /// File stored and reachable
    Completed,
    /// Fetch or write failed
    Failed,
}

impl JobStatus {
    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Downloading => "downloading",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a job, carrying the data valid in each state
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobState {
    /// Initial state
    Pending,
    /// Fetch is reading the response stream
    Downloading {
        /// 0-100; stays 0 when the total size is unknown
        progress: u8,
    },
    /// Terminal: file stored
    Completed,
    /// Terminal: fetch or write failed
    Failed {
        /// Human-readable reason, never empty
        error: String,
    },
}

/// Something that happened to a job's fetch
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobEvent {
    /// Response headers arrived, body is about to be read
    Start,
    /// Percentage of the known total received so far
    Progress(u8),
    /// Body fully written and moved into place
    Complete,
    /// Fetch or write failed
    Fail(String),
}

impl JobEvent {
    fn name(&self) -> &'static str {
        match self {
            JobEvent::Start => "start",
            JobEvent::Progress(_) => "progress",
            JobEvent::Complete => "complete",
            JobEvent::Fail(_) => "fail",
        }
    }
}

impl JobState {
    /// Client-facing status
    pub fn status(&self) -> JobStatus {
        match self {
            JobState::Pending => JobStatus::Pending,
            JobState::Downloading { .. } => JobStatus::Downloading,
            JobState::Completed => JobStatus::Completed,
            JobState::Failed { .. } => JobStatus::Failed,
        }
    }

    /// Current progress; `None` once failed
    pub fn progress(&self) -> Option<u8> {
        match self {
            JobState::Pending => Some(0),
            JobState::Downloading { progress } => Some(*progress),
            JobState::Completed => Some(100),
            JobState::Failed { .. } => None,
        }
    }

    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed { .. })
    }

    /// Compute the state after `event`, or reject the transition.
    ///
    /// Progress never decreases and is clamped to 100. Terminal states accept
    /// nothing.
    pub fn apply(&self, event: &JobEvent) -> Result<JobState> {
        let next = match (self, event) {
            (JobState::Pending, JobEvent::Start) => JobState::Downloading { progress: 0 },
            (JobState::Downloading { progress }, JobEvent::Progress(p)) => JobState::Downloading {
                progress: (*p).min(100).max(*progress),
            },
            (JobState::Downloading { .. }, JobEvent::Complete) => JobState::Completed,
            (JobState::Pending | JobState::Downloading { .. }, JobEvent::Fail(error)) => {
                let error = if error.trim().is_empty() {
                    "unknown error".to_string()
                } else {
                    error.clone()
                };
                JobState::Failed { error }
            }
            (state, event) => {
                return Err(Error::InvalidTransition {
                    from: state.status().to_string(),
                    event: event.name().to_string(),
                });
            }
        };
        Ok(next)
    }
}

/// One tracked download request
#[derive(Clone, Debug)]
pub struct Job {
    /// Immutable identifier
    pub id: JobId,
    /// Current lifecycle state
    pub state: JobState,
    /// Untrusted link to fetch
    pub source_link: String,
    /// Outbound request headers, forwarded verbatim
    pub headers: HashMap<String, String>,
    /// `<id prefix>-<sanitized hint>`
    pub filename: String,
    /// Where the completed file is served from
    pub file_path: PathBuf,
    /// Where bytes are written while downloading
    pub temp_path: PathBuf,
    /// Direct link to the stored file
    pub final_url: String,
    /// Stable smart redirect link
    pub redirect_url: String,
    /// Registration time
    pub created_at: DateTime<Utc>,
    /// When the job entered a terminal state
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Client-facing status
    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    /// Failure reason, present only when failed
    pub fn error(&self) -> Option<&str> {
        match &self.state {
            JobState::Failed { error } => Some(error),
            _ => None,
        }
    }

    /// Header-free view for listings
    pub fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id,
            status: self.status(),
            progress: self.state.progress(),
            source_link: self.source_link.clone(),
            filename: self.filename.clone(),
            final_url: self.final_url.clone(),
            error: self.error().map(str::to_string),
            created_at: self.created_at,
            finished_at: self.finished_at,
        }
    }
}

/// Listing view of a job; omits outbound headers, which may hold credentials
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    /// Job ID
    pub id: JobId,
    /// Current status
    pub status: JobStatus,
    /// Progress, absent once failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    /// Link being fetched
    pub source_link: String,
    /// Stored filename
    pub filename: String,
    /// Direct file link
    pub final_url: String,
    /// Failure reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Registration time
    pub created_at: DateTime<Utc>,
    /// Terminal time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Legacy polling report for `GET /api/status/:job_id`
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusReport {
    /// Always true; unknown jobs produce a 404 error body instead
    pub success: bool,
    /// Current status
    pub status: JobStatus,
    /// Human-readable summary
    pub message: String,
    /// Progress while downloading
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    /// Direct file link once completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_link: Option<String>,
    /// Stored filename once completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Failure reason once failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Job> for JobStatusReport {
    fn from(job: &Job) -> Self {
        let mut report = JobStatusReport {
            success: true,
            status: job.status(),
            message: String::new(),
            progress: None,
            download_link: None,
            filename: None,
            error: None,
        };
        match &job.state {
            JobState::Pending => {
                report.message = "Download will start shortly".to_string();
            }
            JobState::Downloading { progress } => {
                report.progress = Some(*progress);
                report.message = format!("Downloading... {}%", progress);
            }
            JobState::Completed => {
                report.message = "Download complete".to_string();
                report.download_link = Some(job.final_url.clone());
                report.filename = Some(job.filename.clone());
            }
            JobState::Failed { error } => {
                report.message = "Download failed".to_string();
                report.error = Some(error.clone());
            }
        }
        report
    }
}

/// Links returned to the client on job creation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobTicket {
    /// New job ID
    pub job_id: JobId,
    /// Smart redirect link, usable immediately
    pub redirect_url: String,
    /// Direct file link, valid once completed
    pub direct_url: String,
    /// Stored filename
    pub filename: String,
}

/// What the redirect resolver decided for a job ID
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Never issued, or already expired
    NotFound,
    /// Still pending or downloading
    Waiting {
        /// Current status
        status: JobStatus,
        /// Current progress
        progress: u8,
    },
    /// Stored file is available
    Redirect {
        /// Where to send the client
        final_url: String,
    },
    /// Job failed
    Failed {
        /// Failure reason
        error: String,
    },
}

/// Counters of the live proxy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProxyCounters {
    /// Proxied requests that received an upstream response
    pub total_requests: u64,
    /// Body bytes relayed to clients
    pub total_data_transferred: u64,
}

/// Job counts plus a listing
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct JobBreakdown {
    /// All jobs currently tracked
    pub total: usize,
    /// Pending jobs
    pub pending: usize,
    /// Downloading jobs
    pub downloading: usize,
    /// Completed jobs awaiting expiry
    pub completed: usize,
    /// Failed jobs awaiting expiry
    pub failed: usize,
    /// Every tracked job
    pub all: Vec<JobSummary>,
}

impl JobBreakdown {
    /// Count jobs by status
    pub fn from_jobs(jobs: &[Job]) -> Self {
        let count = |status: JobStatus| jobs.iter().filter(|j| j.status() == status).count();
        JobBreakdown {
            total: jobs.len(),
            pending: count(JobStatus::Pending),
            downloading: count(JobStatus::Downloading),
            completed: count(JobStatus::Completed),
            failed: count(JobStatus::Failed),
            all: jobs.iter().map(Job::summary).collect(),
        }
    }
}

/// Snapshot served by `GET /api/stats`
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Uptime as `"{d}d {h}h {m}m"`
    pub uptime: String,
    /// Uptime in whole seconds
    pub uptime_seconds: u64,
    /// Live proxy counters
    pub proxy_stats: ProxyCounters,
    /// Job breakdown
    pub jobs: JobBreakdown,
}

/// Format an uptime the way the stats page shows it
pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    format!("{}d {}h {}m", days, hours, minutes)
}

/// Event emitted during the job lifecycle
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Job registered
    JobCreated {
        /// Job ID
        id: JobId,
        /// Stored filename
        filename: String,
    },

    /// Progress changed
    Downloading {
        /// Job ID
        id: JobId,
        /// 0-100
        percent: u8,
    },

    /// File stored
    Completed {
        /// Job ID
        id: JobId,
        /// Direct file link
        final_url: String,
    },

    /// Fetch or write failed
    Failed {
        /// Job ID
        id: JobId,
        /// Failure reason
        error: String,
    },

    /// Retention elapsed; job and file removed
    Expired {
        /// Job ID
        id: JobId,
    },

    /// Manager shutting down
    Shutdown,
}
