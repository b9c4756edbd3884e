use super::*;
use crate::jobs::test_helpers::create_test_manager_with;
use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::http::{HeaderMap, StatusCode};
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};


const HOST: &str = "relay.test";

/// Router plus the manager behind it; keep the tempdir alive
async fn create_test_app(
    adjust: impl FnOnce(&mut Config),
) -> (Router, Arc<JobManager>, tempfile::TempDir) {
    let (manager, dir) = create_test_manager_with(adjust).await;
    let config = manager.get_config();
    let manager = Arc::new(manager);
    (create_router(manager.clone(), config), manager, dir)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("host", HOST)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("host", HOST)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn json(body: &Bytes) -> serde_json::Value {
    serde_json::from_slice(body).unwrap()
}

fn text(body: &Bytes) -> String {
    String::from_utf8(body.to_vec()).unwrap()
}

/// Create a job through the router and return its creation response
async fn create_via_api(app: &Router, link: &str, hint: &str) -> serde_json::Value {
    let (status, _, body) = send(
        app,
        post_json(
            "/api/request-download",
            serde_json::json!({"link": link, "filenameHint": hint}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED, "{}", text(&body));
    json(&body)
}

/// Poll the status endpoint until it reports `wanted`
async fn wait_for_status(app: &Router, job_id: &str, wanted: &str) -> serde_json::Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let (_, _, body) = send(app, get(&format!("/api/status/{}", job_id))).await;
            let report = json(&body);
            if report["status"] == wanted {
                return report;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("job did not reach the expected status")
}

async fn serve_bytes(route: &str, body: &'static [u8]) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn cors_headers_are_added_for_browsers() {
    let (app, _manager, _dir) = create_test_app(|_| {}).await;

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert!(headers.contains_key("access-control-allow-origin"));
}

#[tokio::test]
async fn cors_can_be_disabled() {
    let (app, _manager, _dir) = create_test_app(|config| {
        config.server.api.cors_enabled = false;
    })
    .await;

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let (_, headers, _) = send(&app, request).await;

    assert!(!headers.contains_key("access-control-allow-origin"));
}

#[tokio::test]
async fn serve_stops_on_shutdown_signal() {
    let (manager, _dir) = create_test_manager_with(|_| {}).await;
    let config = manager.get_config();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(serve(listener, Arc::new(manager), config, async move {
        stop_rx.await.ok();
    }));

    let status = reqwest::get(format!("http://{}/health", addr))
        .await
        .unwrap()
        .status();
    assert_eq!(status.as_u16(), 200);

    stop_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
