//! Integration tests for the reqwest-backed transport.
//!
//! The blocking client may not run inside an async context, so each test
//! drives the mock server from its own runtime and calls the transport from
//! the plain test thread.

use fanout_config::TransportConfig;
use fanout_transport::fanout_types::{FailureKind, Method, RequestOptions};
use fanout_transport::{HttpTransport, Transport};
use serde_json::json;
use std::time::Duration;
use tokio::runtime::Runtime;
use wiremock::matchers::{body_json, body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestServer {
    server: MockServer,
    runtime: Runtime,
}

impl TestServer {
    fn start() -> Self {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let server = runtime.block_on(MockServer::start());
        Self { server, runtime }
    }

    fn mount(&self, mock: Mock) {
        self.runtime.block_on(mock.mount(&self.server));
    }

    fn url(&self, route: &str) -> String {
        format!("{}{route}", self.server.uri())
    }
}

fn transport() -> HttpTransport {
    HttpTransport::new(&TransportConfig {
        user_agent: Some("fanout-test/1.0".to_string()),
        timeout_secs: Some(5),
        ..Default::default()
    })
    .unwrap()
}

#[test]
fn get_returns_buffered_response() {
    let server = TestServer::start();
    server.mount(
        Mock::given(method("GET"))
            .and(path("/hello"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-served-by", "mock")
                    .set_body_string("hello there"),
            ),
    );

    let response = transport()
        .call(Method::Get, &server.url("/hello"), &RequestOptions::default())
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.text(), "hello there");
    assert_eq!(response.header("X-Served-By"), Some("mock"));
    assert_eq!(response.url(), server.url("/hello"));
}

#[test]
fn error_status_is_a_response_not_a_failure() {
    let server = TestServer::start();
    server.mount(
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404)),
    );

    let response = transport()
        .call(Method::Get, &server.url("/missing"), &RequestOptions::default())
        .unwrap();
    assert_eq!(response.status(), 404);
    assert!(!response.is_success());
}

#[test]
fn options_are_forwarded() {
    let server = TestServer::start();
    server.mount(
        Mock::given(method("POST"))
            .and(path("/items"))
            .and(header("x-api-key", "secret"))
            .and(header("user-agent", "fanout-test/1.0"))
            .and(query_param("dry_run", "true"))
            .and(body_json(json!({"name": "widget"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 9}))),
    );

    let options = RequestOptions::new()
        .header("x-api-key", "secret")
        .query("dry_run", "true")
        .json(json!({"name": "widget"}));
    let response = transport()
        .call(Method::Post, &server.url("/items"), &options)
        .unwrap();

    assert_eq!(response.status(), 201);
    let body: serde_json::Value = response.json().unwrap();
    assert_eq!(body["id"], 9);
}

#[test]
fn text_body_is_sent_verbatim() {
    let server = TestServer::start();
    server.mount(
        Mock::given(method("PUT"))
            .and(path("/doc"))
            .and(body_string("raw payload"))
            .respond_with(ResponseTemplate::new(204)),
    );

    let response = transport()
        .call(
            Method::Put,
            &server.url("/doc"),
            &RequestOptions::new().text("raw payload"),
        )
        .unwrap();
    assert_eq!(response.status(), 204);
}

#[test]
fn per_request_timeout_maps_to_timeout_kind() {
    let server = TestServer::start();
    server.mount(
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2))),
    );

    let err = transport()
        .call(
            Method::Get,
            &server.url("/slow"),
            &RequestOptions::new().timeout(Duration::from_millis(100)),
        )
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Timeout);
}

#[test]
fn refused_connection_maps_to_connect_kind() {
    // Port 9 (discard) on loopback is closed on any sane test host.
    let err = transport()
        .call(Method::Get, "http://127.0.0.1:9/", &RequestOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Connect);
    assert!(!err.message().is_empty());
}

#[test]
fn malformed_url_is_a_transport_error() {
    let err = transport()
        .call(Method::Get, "not a url", &RequestOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::InvalidUrl);
}
