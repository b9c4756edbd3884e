//! Job registry abstraction
//!
//! The lifecycle code only talks to [`JobStore`], so the in-memory registry can
//! be swapped for a persistent or shared backend without touching it.

use crate::error::Result;
use crate::types::{Job, JobId};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Keyed registry of job records
///
/// Implementations must tolerate concurrent calls for different keys. Per key,
/// callers serialize writes themselves (one worker owns a job until it is terminal).
///
/// # Examples
///
/// ```no_run
/// use relay_dl::store::{JobStore, MemoryJobStore};
/// use relay_dl::types::JobId;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryJobStore::new();
/// assert!(store.get(&JobId::new()).await?.is_none());
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Look up a job
    async fn get(&self, id: &JobId) -> Result<Option<Job>>;

    /// Insert or replace a job
    async fn put(&self, job: Job) -> Result<()>;

    /// Remove a job, returning it if it existed
    async fn delete(&self, id: &JobId) -> Result<Option<Job>>;

    /// Snapshot of every job
    async fn list(&self) -> Result<Vec<Job>>;
}

/// Volatile store; everything is lost on restart
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl MemoryJobStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn get(&self, id: &JobId) -> Result<Option<Job>> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn put(&self, job: Job) -> Result<()> {
        self.jobs.write().await.insert(job.id, job);
        Ok(())
    }

    async fn delete(&self, id: &JobId) -> Result<Option<Job>> {
        Ok(self.jobs.write().await.remove(id))
    }

    async fn list(&self) -> Result<Vec<Job>> {
        let mut jobs: Vec<Job> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }
}
