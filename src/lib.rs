//! # relay-dl
//!
//! Asynchronous fetch-and-relay downloads with smart redirect links.
//!
//! A client registers a remote file and immediately gets back a stable link.
//! The file is fetched in the background; opening the link shows a
//! self-refreshing wait page until the file is ready, then redirects to the
//! stored copy. Finished jobs and their files expire after a retention window.
//! A live pass-through proxy and a stats snapshot share the same server.
//!
//! ## Quick Start
//!
//! ```no_run
//! use relay_dl::{Config, JobManager, run_with_shutdown};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = JobManager::new(Config::default()).await?;
//!
//!     // Subscribe to events
//!     let mut events = manager.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     // Serve until SIGINT/SIGTERM
//!     run_with_shutdown(manager).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Remote retrieval into local files
pub mod fetcher;
/// Job manager: intake, lifecycle, expiry, resolution
pub mod jobs;
/// Live pass-through proxy
pub mod proxy;
/// Job persistence seam
pub mod store;
/// Outbound target policy
pub mod target_policy;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use error::{ApiError, ErrorDetail, Error, FetchError, Result, StorageError, ToHttpStatus};
pub use jobs::{CreateJobRequest, JobManager};
pub use store::{JobStore, MemoryJobStore};
pub use target_policy::TargetPolicy;
pub use types::{
    Event, Job, JobId, JobState, JobStatus, JobStatusReport, JobSummary, JobTicket, Resolution,
    StatsSnapshot,
};

use std::sync::Arc;

/// Serve the API until a termination signal arrives, then shut the manager down.
///
/// The manager stops accepting jobs as soon as the signal is received, while
/// in-flight HTTP requests are allowed to finish.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use relay_dl::{Config, JobManager, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let manager = JobManager::new(Config::default()).await?;
///     run_with_shutdown(manager).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(manager: JobManager) -> Result<()> {
    let config = manager.get_config();
    let manager = Arc::new(manager);
    let listener = tokio::net::TcpListener::bind(config.server.api.bind_address).await?;

    let signalled = manager.clone();
    api::serve(listener, manager, config, async move {
        wait_for_signal().await;
        if let Err(e) = signalled.shutdown().await {
            tracing::error!(error = %e, "Shutdown failed");
        }
    })
    .await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "Could not register any signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
