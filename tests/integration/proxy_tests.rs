//! Proxy integration tests.
//!
//! Tests verify:
//! - Backend status codes are passed through or remapped
//! - Transport failures become 502 and 504
//! - A reply without a status line becomes 500
//! - A missing backend is an internal error
//! - Health endpoint

use std::time::Duration;

use axum::http::{header, StatusCode};
use ds_image_proxy::config::{ProxyConfig, ServiceConfig};
use ds_image_proxy::AddressingMode;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::test_utils::{
    body_bytes, body_json, get, router, router_with, service_config, MockRights,
};

const THUMBNAIL: &str = "/iip?FIF=foo.jpg&WID=100&HEI=100&CVT=jpeg";

async fn backend_answering(template: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(template)
        .mount(&server)
        .await;
    server
}

// =============================================================================
// Status Mapping
// =============================================================================

#[tokio::test]
async fn test_backend_error_status_is_passed_through() {
    for status in [404u16, 500, 503] {
        let server = backend_answering(ResponseTemplate::new(status)).await;

        let response = get(router(&server, MockRights::new()), THUMBNAIL).await;
        assert_eq!(response.status().as_u16(), status);

        let json = body_json(response).await;
        assert_eq!(json["error"], "upstream_error");
        assert_eq!(json["message"], "Unable to proxy request for 'foo.jpg'");
    }
}

#[tokio::test]
async fn test_backend_no_content_is_passed_through() {
    let server = backend_answering(ResponseTemplate::new(204)).await;

    let response = get(router(&server, MockRights::new()), THUMBNAIL).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_large_body_is_streamed_intact() {
    let payload: Vec<u8> = (0..512 * 1024).map(|i| (i % 251) as u8).collect();
    let server =
        backend_answering(ResponseTemplate::new(200).set_body_raw(payload.clone(), "image/jpeg"))
            .await;

    let response = get(router(&server, MockRights::new()), THUMBNAIL).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    assert_eq!(body_bytes(response).await.as_ref(), payload.as_slice());
}

// =============================================================================
// Transport Failures
// =============================================================================

#[tokio::test]
async fn test_unreachable_backend_is_bad_gateway() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = service_config(&format!("http://127.0.0.1:{}", port), AddressingMode::Path);

    let response = get(
        router_with(config, MockRights::new(), ProxyConfig::default()),
        THUMBNAIL,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let json = body_json(response).await;
    assert_eq!(json["error"], "upstream_error");
    assert_eq!(
        json["message"],
        "Unable to establish proxy connection for 'foo.jpg'"
    );
}

#[tokio::test]
async fn test_slow_backend_is_gateway_timeout() {
    let server = backend_answering(
        ResponseTemplate::new(200)
            .set_body_raw("late", "image/jpeg")
            .set_delay(Duration::from_secs(5)),
    )
    .await;
    let proxy = ProxyConfig {
        connect_timeout_ms: Some(1000),
        read_timeout_ms: Some(100),
    };

    let response = get(
        router_with(
            service_config(&server.uri(), AddressingMode::Path),
            MockRights::new(),
            proxy,
        ),
        THUMBNAIL,
    )
    .await;
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn test_reply_without_status_line_is_internal_error() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        let _ = socket.read(&mut buf).await;
        let _ = socket.write_all(b"GARBAGE NOT HTTP\r\n\r\n").await;
        let _ = socket.shutdown().await;
    });
    let config = service_config(&format!("http://{}", addr), AddressingMode::Path);

    let response = get(
        router_with(config, MockRights::new(), ProxyConfig::default()),
        THUMBNAIL,
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let json = body_json(response).await;
    assert_eq!(json["error"], "upstream_error");
    assert_eq!(
        json["message"],
        "Unable to proxy request for 'foo.jpg' due to proxied server error -1"
    );
}

// =============================================================================
// Configuration
// =============================================================================

#[tokio::test]
async fn test_missing_backend_is_internal_error() {
    let rights = MockRights::new();
    let response = get(
        router_with(ServiceConfig::default(), rights.clone(), ProxyConfig::default()),
        "/iiif/foo.jpg/info.json",
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["message"], "Internal server error");
    assert_eq!(rights.call_count(), 0);
}

#[tokio::test]
async fn test_health() {
    let server = MockServer::start().await;

    let response = get(router(&server, MockRights::new()), "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}
