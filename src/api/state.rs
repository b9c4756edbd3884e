//! Application state for the API server

use crate::{Config, JobManager};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request (cheap Arc clone).
#[derive(Clone)]
pub struct AppState {
    /// The job manager behind every handler
    pub manager: Arc<JobManager>,

    /// Configuration (read-only)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(manager: Arc<JobManager>, config: Arc<Config>) -> Self {
        Self { manager, config }
    }
}
