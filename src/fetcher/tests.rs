use super::*;
use crate::config::FetchConfig;
use std::net::{IpAddr, Ipv4Addr};
use tempfile::tempdir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Records every callback for assertions
#[derive(Default)]
struct RecordingSink {
    started: Option<Option<u64>>,
    chunks: Vec<(u64, Option<u8>)>,
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn on_started(&mut self, total_bytes: Option<u64>) -> Result<()> {
        self.started = Some(total_bytes);
        Ok(())
    }

    async fn on_chunk(&mut self, downloaded_bytes: u64, percent: Option<u8>) -> Result<()> {
        self.chunks.push((downloaded_bytes, percent));
        Ok(())
    }
}

fn open_fetcher() -> Fetcher {
    Fetcher::new(&FetchConfig {
        target_policy: TargetPolicy::AllowAll,
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn download_writes_body_and_reports_progress() {
    let server = MockServer::start().await;
    let body = vec![7u8; 64 * 1024];
    Mock::given(method("GET"))
        .and(path("/a.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let temp_path = dir.path().join("temp").join("a.bin");
    let file_path = dir.path().join("downloads").join("a.bin");
    let mut sink = RecordingSink::default();

    let summary = open_fetcher()
        .download(
            &format!("{}/a.bin", server.uri()),
            &HashMap::new(),
            &temp_path,
            &file_path,
            &mut sink,
        )
        .await
        .unwrap();

    assert_eq!(summary.bytes_written, body.len() as u64);
    assert_eq!(summary.total_bytes, Some(body.len() as u64));
    assert_eq!(tokio::fs::read(&file_path).await.unwrap(), body);
    assert!(!temp_path.exists(), "partial file should have been moved");

    assert_eq!(sink.started, Some(Some(body.len() as u64)));
    let percents: Vec<u8> = sink.chunks.iter().filter_map(|(_, p)| *p).collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(percents.last(), Some(&100));
}

#[tokio::test]
async fn forwarded_headers_reach_the_remote() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/private.bin"))
        .and(header("authorization", "Bearer token-123"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"secret".to_vec()))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let headers = HashMap::from([("Authorization".to_string(), "Bearer token-123".to_string())]);
    let mut sink = RecordingSink::default();

    let summary = open_fetcher()
        .download(
            &format!("{}/private.bin", server.uri()),
            &headers,
            &dir.path().join("t"),
            &dir.path().join("f"),
            &mut sink,
        )
        .await
        .unwrap();

    assert_eq!(summary.bytes_written, 6);
}

#[tokio::test]
async fn http_error_status_fails_without_leaving_files() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing.bin"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let temp_path = dir.path().join("t.bin");
    let file_path = dir.path().join("f.bin");
    let mut sink = RecordingSink::default();

    let err = open_fetcher()
        .download(
            &format!("{}/missing.bin", server.uri()),
            &HashMap::new(),
            &temp_path,
            &file_path,
            &mut sink,
        )
        .await
        .unwrap_err();

    match err {
        Error::Fetch(FetchError::HttpStatus { status, .. }) => assert_eq!(status, 404),
        other => panic!("expected HttpStatus error, got {:?}", other),
    }
    assert!(sink.started.is_none(), "download never started reading");
    assert!(!temp_path.exists());
    assert!(!file_path.exists());
}

#[tokio::test]
async fn unreachable_host_is_a_transport_error() {
    let dir = tempdir().unwrap();
    let mut sink = RecordingSink::default();

    // Port 9 (discard) is closed on loopback in test environments
    let err = open_fetcher()
        .download(
            "http://127.0.0.1:9/a.bin",
            &HashMap::new(),
            &dir.path().join("t"),
            &dir.path().join("f"),
            &mut sink,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Fetch(FetchError::Transport { .. })));
    assert!(!err.to_string().is_empty());
}

#[tokio::test]
async fn malformed_link_is_invalid_url_under_allow_all() {
    let dir = tempdir().unwrap();
    let mut sink = RecordingSink::default();

    let err = open_fetcher()
        .download(
            "definitely not a url",
            &HashMap::new(),
            &dir.path().join("t"),
            &dir.path().join("f"),
            &mut sink,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Fetch(FetchError::InvalidUrl { .. })));
}

#[tokio::test]
async fn invalid_forwarded_header_is_rejected() {
    let dir = tempdir().unwrap();
    let headers = HashMap::from([("bad header".to_string(), "x".to_string())]);
    let mut sink = RecordingSink::default();

    let err = open_fetcher()
        .download(
            "http://127.0.0.1:9/",
            &headers,
            &dir.path().join("t"),
            &dir.path().join("f"),
            &mut sink,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Fetch(FetchError::InvalidHeader { .. })));
}

#[tokio::test]
async fn deny_private_blocks_loopback_before_connecting() {
    let fetcher = Fetcher::new(&FetchConfig::default()).unwrap();

    let err = fetcher
        .send("http://127.0.0.1:9/a.bin", &HashMap::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::TargetForbidden { .. }));
}

#[tokio::test]
async fn redirect_to_private_address_is_refused() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hop"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("location", "http://10.0.0.1/internal"),
        )
        .mount(&server)
        .await;

    // Allow the mock host itself, then refuse the private redirect target
    let fetcher = Fetcher::new(&FetchConfig {
        target_policy: TargetPolicy::AllowList {
            hosts: vec!["127.0.0.1".into()],
        },
        ..Default::default()
    })
    .unwrap();

    let err = fetcher
        .send(&format!("{}/hop", server.uri()), &HashMap::new())
        .await
        .unwrap_err();

    match err {
        Error::Fetch(FetchError::Transport { reason, .. }) => {
            assert!(reason.contains("redirect"), "reason was: {reason}")
        }
        other => panic!("expected transport error, got {:?}", other),
    }
}

fn loopback_only(ip: IpAddr) -> bool {
    ip == IpAddr::V4(Ipv4Addr::LOCALHOST)
}

/// DenyPrivate fetcher whose resolver answers `names` and admits only 127.0.0.1
fn resolving_fetcher(names: &[(&str, IpAddr)]) -> Fetcher {
    let overrides = names
        .iter()
        .map(|(name, ip)| (name.to_string(), vec![*ip]))
        .collect();
    Fetcher::with_resolver(
        &FetchConfig::default(),
        Some(PublicResolver::with_overrides(overrides, loopback_only)),
    )
    .unwrap()
}

#[tokio::test]
async fn redirect_to_name_resolving_privately_is_forbidden() {
    let server = MockServer::start().await;
    let port = server.address().port();
    Mock::given(method("GET"))
        .and(path("/start"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", format!("http://intranet.test:{}/secret", port)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/secret"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"internal".to_vec()))
        .expect(0)
        .mount(&server)
        .await;

    let fetcher = resolving_fetcher(&[
        ("origin.test", IpAddr::V4(Ipv4Addr::LOCALHOST)),
        ("intranet.test", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2))),
    ]);

    let err = fetcher
        .send_raw(
            &format!("http://origin.test:{}/start", port),
            &HashMap::new(),
        )
        .await
        .unwrap_err();

    match err {
        Error::TargetForbidden { reason, .. } => {
            assert!(reason.contains("intranet.test"), "reason was: {reason}");
            assert!(reason.contains("127.0.0.2"), "reason was: {reason}");
        }
        other => panic!("expected TargetForbidden, got {:?}", other),
    }
}

#[tokio::test]
async fn name_resolving_to_allowed_address_is_fetched() {
    let server = MockServer::start().await;
    let port = server.address().port();
    Mock::given(method("GET"))
        .and(path("/start"))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("location", format!("http://mirror.test:{}/file", port)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/file"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"public".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = resolving_fetcher(&[
        ("origin.test", IpAddr::V4(Ipv4Addr::LOCALHOST)),
        ("mirror.test", IpAddr::V4(Ipv4Addr::LOCALHOST)),
    ]);

    let response = fetcher
        .send(
            &format!("http://origin.test:{}/start", port),
            &HashMap::new(),
        )
        .await
        .unwrap();

    assert_eq!(response.text().await.unwrap(), "public");
}

#[tokio::test]
async fn empty_body_counts_as_unknown_length() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/empty.bin"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let file_path = dir.path().join("f.bin");
    let mut sink = RecordingSink::default();

    let summary = open_fetcher()
        .download(
            &format!("{}/empty.bin", server.uri()),
            &HashMap::new(),
            &dir.path().join("t.bin"),
            &file_path,
            &mut sink,
        )
        .await
        .unwrap();

    assert_eq!(summary.total_bytes, None);
    assert_eq!(sink.started, Some(None));
    assert!(sink.chunks.iter().all(|(_, percent)| percent.is_none()));
    assert!(file_path.exists());
}

#[tokio::test]
async fn chunked_body_reports_no_percent() {
    // A raw listener, so the body goes out chunked with no content-length
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        use tokio::io::AsyncReadExt;
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 1024];
        let _ = socket.read(&mut request).await.unwrap();
        socket
            .write_all(
                b"HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\nconnection: close\r\n\r\n\
                  5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n",
            )
            .await
            .unwrap();
        socket.shutdown().await.unwrap();
    });

    let dir = tempdir().unwrap();
    let file_path = dir.path().join("f.bin");
    let mut sink = RecordingSink::default();

    let summary = open_fetcher()
        .download(
            &format!("http://{}/stream", addr),
            &HashMap::new(),
            &dir.path().join("t.bin"),
            &file_path,
            &mut sink,
        )
        .await
        .unwrap();

    assert_eq!(summary.bytes_written, 11);
    assert_eq!(summary.total_bytes, None);
    assert_eq!(sink.started, Some(None));
    assert!(!sink.chunks.is_empty());
    assert!(sink.chunks.iter().all(|(_, percent)| percent.is_none()));
    assert_eq!(sink.chunks.last().map(|(bytes, _)| *bytes), Some(11));
    assert_eq!(tokio::fs::read(&file_path).await.unwrap(), b"hello world");
}

#[test]
fn percent_rounding() {
    assert_eq!(percent_of(0, 100), 0);
    assert_eq!(percent_of(1, 200), 1);
    assert_eq!(percent_of(333, 1000), 33);
    assert_eq!(percent_of(150, 100), 100);
    assert_eq!(percent_of(5, 0), 0);
}
