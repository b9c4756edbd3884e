//! Shared helpers for relay-dl end-to-end tests

use relay_dl::{Config, JobManager, TargetPolicy};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// A running server on an ephemeral loopback port
pub struct TestServer {
    pub base: String,
    pub manager: Arc<JobManager>,
    pub dir: TempDir,
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<relay_dl::Result<()>>>,
}

impl TestServer {
    /// Stop accepting connections and wait for the server task
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            stop.send(()).ok();
        }
        if let Some(handle) = self.handle.take() {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("server did not stop")
                .expect("server task panicked")
                .expect("server returned an error");
        }
    }
}

/// Start a server whose directories live in a fresh tempdir.
///
/// The target policy allows loopback sources so mock servers can be fetched.
pub async fn start_server(adjust: impl FnOnce(&mut Config)) -> TestServer {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = Config::default();
    config.storage.download_dir = dir.path().join("downloads");
    config.storage.temp_dir = dir.path().join("temp");
    config.fetch.target_policy = TargetPolicy::AllowAll;
    adjust(&mut config);

    let manager = Arc::new(JobManager::new(config).await.expect("manager"));
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let base = format!("http://{}", listener.local_addr().expect("local addr"));
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(relay_dl::api::serve(
        listener,
        manager.clone(),
        manager.get_config(),
        async move {
            stop_rx.await.ok();
        },
    ));

    TestServer {
        base,
        manager,
        dir,
        stop: Some(stop_tx),
        handle: Some(handle),
    }
}

/// HTTP client that reports redirects instead of following them
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("client")
}

/// Poll `url` until it answers with `status`, failing after 5 seconds
pub async fn wait_for_http_status(
    client: &reqwest::Client,
    url: &str,
    status: u16,
) -> reqwest::Response {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let response = client.get(url).send().await.expect("request");
            if response.status().as_u16() == status {
                return response;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{} never answered {}", url, status))
}
