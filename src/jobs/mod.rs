//! Job manager split into focused submodules.
//!
//! The `JobManager` struct and its methods are organized by concern:
//! - [`intake`] - Request validation and job registration
//! - [`worker`] - The single fetch task run for each job
//! - [`lifecycle`] - State transitions, events and shutdown
//! - [`expiry`] - Retention scheduling and the sweep loop
//! - [`resolve`] - Read-only lookups for the redirect resolver, status and stats

mod expiry;
mod intake;
mod lifecycle;
mod resolve;
mod worker;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use intake::CreateJobRequest;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetcher::Fetcher;
use crate::proxy::LiveProxy;
use crate::store::{JobStore, MemoryJobStore};
use crate::types::Event;
use expiry::ExpiryScheduler;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;

/// Main manager instance (cloneable - all fields are Arc-wrapped or cheap handles)
#[derive(Clone)]
pub struct JobManager {
    /// Job registry (swappable backend)
    pub(crate) store: Arc<dyn JobStore>,
    /// Outbound fetcher shared by every job worker
    pub(crate) fetcher: Fetcher,
    /// Live proxy sharing the fetcher's client and counters read by stats
    pub(crate) proxy: LiveProxy,
    /// Pending deletions, earliest deadline first
    pub(crate) expiry: Arc<ExpiryScheduler>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Process start, for the stats uptime
    pub(crate) started_at: std::time::Instant,
    /// Flag to indicate whether new jobs are accepted (set to false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Stops the expiry sweep loop
    pub(crate) shutdown_token: CancellationToken,
    /// Serializes filename allocation so two intakes never pick the same name
    pub(crate) intake_lock: Arc<Mutex<()>>,
}

impl JobManager {
    /// Create a manager backed by the in-memory store
    ///
    /// This validates the configuration, creates the download and temp
    /// directories, builds the HTTP client and starts the expiry sweep loop.
    pub async fn new(config: Config) -> Result<Self> {
        Self::with_store(config, Arc::new(MemoryJobStore::new())).await
    }

    /// Create a manager over a caller-supplied store
    pub async fn with_store(config: Config, store: Arc<dyn JobStore>) -> Result<Self> {
        config.validate()?;

        for (dir, label) in [
            (&config.storage.download_dir, "download"),
            (&config.storage.temp_dir, "temp"),
        ] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create {} directory '{}': {}",
                        label,
                        dir.display(),
                        e
                    ),
                ))
            })?;
        }

        let fetcher = Fetcher::new(&config.fetch)?;
        let proxy = LiveProxy::new(fetcher.clone());

        // Create broadcast channel with buffer size of 1000 events
        let (event_tx, _rx) = broadcast::channel(1000);

        let manager = Self {
            store,
            fetcher,
            proxy,
            expiry: Arc::new(ExpiryScheduler::new()),
            event_tx,
            config: Arc::new(config),
            started_at: std::time::Instant::now(),
            accepting_new: Arc::new(AtomicBool::new(true)),
            shutdown_token: CancellationToken::new(),
            intake_lock: Arc::new(Mutex::new(())),
        };

        manager.start_expiry_sweeper();

        tracing::info!(
            download_dir = %manager.config.storage.download_dir.display(),
            retention_secs = manager.config.storage.retention.as_secs(),
            policy = ?manager.config.fetch.target_policy,
            "Job manager started"
        );

        Ok(manager)
    }

    /// Subscribe to job events
    ///
    /// Each subscriber receives all events independently. A subscriber that
    /// falls more than 1000 events behind gets `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Live proxy sharing this manager's target policy and counters
    pub fn proxy(&self) -> &LiveProxy {
        &self.proxy
    }

    /// Emit an event to all subscribers
    ///
    /// With no subscribers the event is dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
