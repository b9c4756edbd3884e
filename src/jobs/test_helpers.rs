//! Shared test helpers for creating JobManager instances in tests.

use crate::config::Config;
use crate::jobs::JobManager;
use crate::target_policy::TargetPolicy;
use crate::types::{Job, JobId};
use std::time::Duration;
use tempfile::tempdir;

/// Base URL used for links in tests
pub(crate) const TEST_BASE_URL: &str = "http://relay.test";

/// Config rooted in `root`, fetching anything (mock servers bind to loopback)
pub(crate) fn test_config(root: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.storage.download_dir = root.join("downloads");
    config.storage.temp_dir = root.join("temp");
    config.fetch.target_policy = TargetPolicy::AllowAll;
    config
}

/// Helper to create a test JobManager with its directories in a tempdir.
/// Returns the manager and the tempdir (which must be kept alive).
pub(crate) async fn create_test_manager() -> (JobManager, tempfile::TempDir) {
    create_test_manager_with(|_| {}).await
}

/// Like [`create_test_manager`], with a hook to adjust the config first
pub(crate) async fn create_test_manager_with(
    adjust: impl FnOnce(&mut Config),
) -> (JobManager, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let mut config = test_config(temp_dir.path());
    adjust(&mut config);
    let manager = JobManager::new(config).await.unwrap();
    (manager, temp_dir)
}

/// Poll until the job satisfies `done`, failing the test after 5 seconds
pub(crate) async fn wait_for_job(
    manager: &JobManager,
    id: &JobId,
    done: impl Fn(&Job) -> bool,
) -> Job {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(job) = manager.get_job(id).await.unwrap()
                && done(&job)
            {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("job did not reach the expected state in time")
}

/// Poll until the job is gone from the store
pub(crate) async fn wait_for_removal(manager: &JobManager, id: &JobId, within: Duration) {
    tokio::time::timeout(within, async {
        while manager.get_job(id).await.unwrap().is_some() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("job was not expired in time")
}
