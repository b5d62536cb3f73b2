//! Integration tests against a fake test proxy

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{HeaderMap, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use proxyshim::proxy::{RECORDING_ID_HEADER, RECORDING_MODE_HEADER, RECORDING_UPSTREAM_BASE_URI_HEADER};
use proxyshim::recording::SessionState;
use proxyshim::{HttpClient, Mode, ProxyConfig, Session, ShimError, Transport};

/// Request as the fake proxy received it
#[derive(Debug, Clone)]
struct Captured {
    method: Method,
    path_and_query: String,
    headers: HeaderMap,
    body: Bytes,
}

type Handler = fn(&Captured) -> Response<Full<Bytes>>;

/// Test proxy stand-in listening on an ephemeral port
struct FakeProxy {
    addr: SocketAddr,
    seen: Arc<Mutex<Vec<Captured>>>,
}

impl FakeProxy {
    async fn spawn(handler: Handler) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let log = Arc::clone(&log);

                tokio::spawn(async move {
                    let service = service_fn(move |request: Request<Incoming>| {
                        let log = Arc::clone(&log);
                        async move {
                            let (parts, body) = request.into_parts();
                            let body = body.collect().await.unwrap().to_bytes();
                            let captured = Captured {
                                method: parts.method,
                                path_and_query: parts
                                    .uri
                                    .path_and_query()
                                    .map(ToString::to_string)
                                    .unwrap_or_default(),
                                headers: parts.headers,
                                body,
                            };
                            let response = handler(&captured);
                            log.lock().unwrap().push(captured);
                            Ok::<_, Infallible>(response)
                        }
                    });

                    http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await
                        .ok();
                });
            }
        });

        Self { addr, seen }
    }

    fn config(&self, mode: Mode) -> ProxyConfig {
        let mut config = ProxyConfig::new(mode);
        config.host = "127.0.0.1".to_string();
        config.port = self.addr.port();
        config.recording_path = "/tmp/rec".into();
        config.timeout_ms = Some(5_000);
        config
    }

    fn seen(&self) -> Vec<Captured> {
        self.seen.lock().unwrap().clone()
    }
}

fn reply(status: StatusCode, headers: &[(&str, &str)], body: &'static str) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(status);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Full::new(Bytes::from_static(body.as_bytes()))).unwrap()
}

/// Well-behaved proxy: issues `abc123`, stops only that id, and plays back
/// a long-running table creation
fn table_proxy(request: &Captured) -> Response<Full<Bytes>> {
    let recording_id = request
        .headers
        .get(RECORDING_ID_HEADER)
        .and_then(|v| v.to_str().ok());

    match (request.method.as_str(), request.path_and_query.as_str()) {
        ("POST", "/record/start" | "/playback/start") => reply(
            StatusCode::OK,
            &[("x-recording-id", "abc123")],
            r#"{"TABLES_ACCOUNT": "fakeaccount"}"#,
        ),
        ("POST", "/record/stop" | "/playback/stop") if recording_id == Some("abc123") => {
            reply(StatusCode::OK, &[], "")
        }
        ("POST", "/record/stop" | "/playback/stop") => {
            reply(StatusCode::BAD_REQUEST, &[], "unknown recording id")
        }
        ("POST", "/Tables") => reply(
            StatusCode::ACCEPTED,
            &[("location", "/operations/1?api-version=2019-02-02")],
            "",
        ),
        ("GET", "/operations/1?api-version=2019-02-02") => reply(
            StatusCode::OK,
            &[("content-type", "application/json")],
            r#"{"status":"Succeeded"}"#,
        ),
        _ => reply(StatusCode::NOT_FOUND, &[], "no recording matches"),
    }
}

fn json_request(method: Method, url: &str, body: &'static str) -> Request<Full<Bytes>> {
    Request::builder()
        .method(method)
        .uri(url)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from_static(body.as_bytes())))
        .unwrap()
}

#[tokio::test]
async fn test_start_and_stop_against_proxy() {
    let proxy = FakeProxy::spawn(table_proxy).await;
    let mut session = Session::for_config(proxy.config(Mode::Record)).unwrap();

    session.start("TestCosmosDBTables").await.unwrap();
    assert_eq!(session.recording_id(), Some("abc123"));
    assert_eq!(session.variables()["TABLES_ACCOUNT"], "fakeaccount");

    session.stop().await.unwrap();
    assert_eq!(session.state(), &SessionState::Stopped);

    let seen = proxy.seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].path_and_query, "/record/start");
    assert_eq!(seen[0].headers["content-type"], "application/json");
    let payload: serde_json::Value = serde_json::from_slice(&seen[0].body).unwrap();
    assert_eq!(
        payload["x-recording-file"],
        "/tmp/rec/recordings/TestCosmosDBTables.json"
    );
    assert_eq!(seen[1].path_and_query, "/record/stop");
    assert_eq!(seen[1].headers[RECORDING_ID_HEADER], "abc123");
}

#[tokio::test]
async fn test_start_without_recording_id() {
    let proxy = FakeProxy::spawn(|_| reply(StatusCode::OK, &[], "recording file missing")).await;
    let mut session = Session::for_config(proxy.config(Mode::Playback)).unwrap();

    let error = session.start("TestFoo").await.unwrap_err();

    match error {
        ShimError::Protocol { body, .. } => assert_eq!(body, "recording file missing"),
        other => panic!("expected protocol error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_stop_with_unknown_recording_id() {
    let proxy = FakeProxy::spawn(table_proxy).await;
    let client = HttpClient::for_test_proxy().unwrap();
    let mut session = Session::resume(proxy.config(Mode::Playback), client, "not-issued").unwrap();

    let error = session.stop().await.unwrap_err();

    assert!(matches!(error, ShimError::Protocol { .. }));
    assert!(error.to_string().contains("unknown recording id"));
}

#[tokio::test]
async fn test_long_running_operation_polls_through_proxy() {
    let proxy = FakeProxy::spawn(table_proxy).await;
    let mut session = Session::for_config(proxy.config(Mode::Playback)).unwrap();

    let status = session
        .scoped("TestCreateTable", |client| async move {
            let accepted = client
                .send(json_request(
                    Method::POST,
                    "https://fakeaccount.table.cosmos.example.net/Tables",
                    r#"{"TableName":"gocosmos"}"#,
                ))
                .await?;

            assert_eq!(accepted.status, StatusCode::ACCEPTED);
            assert_eq!(
                accepted.url.to_string(),
                "https://fakeaccount.table.cosmos.example.net/Tables"
            );

            let poll_url = accepted.location()?.expect("location header");
            assert_eq!(
                poll_url.to_string(),
                "https://fakeaccount.table.cosmos.example.net/operations/1?api-version=2019-02-02"
            );

            let poll = client
                .send(json_request(Method::GET, &poll_url.to_string(), ""))
                .await?;
            let body: serde_json::Value = poll.json()?;

            Ok::<_, ShimError>(body["status"].as_str().unwrap_or_default().to_string())
        })
        .await
        .unwrap();

    assert_eq!(status, "Succeeded");

    let seen = proxy.seen();
    let paths: Vec<_> = seen.iter().map(|c| c.path_and_query.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            "/playback/start",
            "/Tables",
            "/operations/1?api-version=2019-02-02",
            "/playback/stop",
        ]
    );

    for forwarded in &seen[1..3] {
        assert_eq!(
            forwarded.headers[RECORDING_UPSTREAM_BASE_URI_HEADER],
            "https://fakeaccount.table.cosmos.example.net"
        );
        assert_eq!(forwarded.headers[RECORDING_MODE_HEADER], "playback");
        assert_eq!(forwarded.headers[RECORDING_ID_HEADER], "abc123");
        assert_eq!(
            forwarded.headers["host"],
            format!("127.0.0.1:{}", proxy.addr.port()).as_str()
        );
    }
    assert_eq!(seen[1].body, Bytes::from_static(br#"{"TableName":"gocosmos"}"#));
}

#[tokio::test]
async fn test_forwarded_error_status_is_passed_through() {
    let proxy = FakeProxy::spawn(table_proxy).await;
    let mut session = Session::for_config(proxy.config(Mode::Record)).unwrap();

    let response = session
        .scoped("TestMissing", |client| async move {
            client
                .send(json_request(
                    Method::GET,
                    "https://fakeaccount.table.cosmos.example.net/Tables('absent')",
                    "",
                ))
                .await
        })
        .await
        .unwrap();

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.text(), "no recording matches");
    assert_eq!(
        response.url.authority().unwrap().as_str(),
        "fakeaccount.table.cosmos.example.net"
    );
}
