//! DeepZoom integration tests for both backend addressing modes.

use axum::http::{header, StatusCode};
use ds_image_proxy::config::ProxyConfig;
use ds_image_proxy::AddressingMode;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::test_utils::{
    body_bytes, body_json, get, requested_uris, router, router_with, service_config, MockRights,
    IIP_PATH,
};

const DESCRIPTOR: &str = r#"<?xml version="1.0"?><Image TileSize="256" Overlap="0" Format="jpg"/>"#;

async fn backend() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(DESCRIPTOR, "application/xml"))
        .mount(&server)
        .await;
    server
}

// =============================================================================
// Path Addressing
// =============================================================================

#[tokio::test]
async fn test_descriptor_path_mode() {
    let server = backend().await;
    let rights = MockRights::new();

    let response = get(router(&server, rights.clone()), "/deepzoom/bar/foo.jpg.dzi").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/xml");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "inline; filename=\"foo.jpg.dzi\""
    );
    assert_eq!(body_bytes(response).await.as_ref(), DESCRIPTOR.as_bytes());

    assert_eq!(
        requested_uris(&server).await,
        vec!["/deepzoom/bar/foo.jpg.dzi".to_string()]
    );
    assert_eq!(rights.call_count(), 0);
}

#[tokio::test]
async fn test_tile_path_mode() {
    let server = backend().await;
    let rights = MockRights::new();

    let response = get(
        router(&server, rights.clone()),
        "/deepzoom/bar/foo.jpg_files/11/2_4.jpg?GAM=1.2&INV",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::CONTENT_DISPOSITION).is_none());

    assert_eq!(
        requested_uris(&server).await,
        vec!["/deepzoom/bar/foo.jpg_files/11/2_4.jpg?GAM=1.2&INV".to_string()]
    );

    let requests = rights.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].access_ids, vec!["bar/foo.jpg".to_string()]);
    assert_eq!(requests[0].presentation_type, "Fullsize");
}

// =============================================================================
// Parameter Addressing
// =============================================================================

#[tokio::test]
async fn test_descriptor_param_mode() {
    let server = backend().await;
    let router = router_with(
        service_config(&server.uri(), AddressingMode::Param),
        MockRights::new(),
        ProxyConfig::default(),
    );

    let response = get(router, "/deepzoom/bar/foo.jpg.dzi").await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(
        requested_uris(&server).await,
        vec![format!("{}?DeepZoom=bar/foo.jpg.dzi", IIP_PATH)]
    );
}

#[tokio::test]
async fn test_tile_param_mode() {
    let server = backend().await;
    let router = router_with(
        service_config(&server.uri(), AddressingMode::Param),
        MockRights::new(),
        ProxyConfig::default(),
    );

    let response = get(router, "/deepzoom/bar/foo.jpg_files/11/2_4.jpg?CNT=1.5&CMP=HOT&INV").await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(
        requested_uris(&server).await,
        vec![format!(
            "{}?DeepZoom=bar/foo.jpg_files/11/2_4.jpg&CNT=1.5&CMP=HOT&INV",
            IIP_PATH
        )]
    );
}

// =============================================================================
// Validation Failures
// =============================================================================

#[tokio::test]
async fn test_invalid_tile_requests() {
    let server = MockServer::start().await;
    let rights = MockRights::new();

    for (uri, field) in [
        ("/deepzoom/foo.jpg_files/eleven/2_4.jpg", "layer"),
        ("/deepzoom/foo.jpg_files/11/2-4.jpg", "tiles"),
        ("/deepzoom/foo.jpg", "imageid"),
    ] {
        let response = get(router(&server, rights.clone()), uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body_json(response).await["field"], field, "{}", uri);
    }

    assert!(requested_uris(&server).await.is_empty());
    assert_eq!(rights.call_count(), 0);
}
