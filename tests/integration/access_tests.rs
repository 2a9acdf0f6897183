//! Access gate integration tests.
//!
//! Tests verify:
//! - Denied and unknown resources get placeholder images without a backend call
//! - Rights service failures and unmatched answers are internal errors
//! - The HTTP rights client speaks the `checkAccessForIds` protocol

use axum::http::{header, StatusCode};
use ds_image_proxy::access::{AccessGate, AccessVerdict, LicenseClient, Placeholders};
use ds_image_proxy::config::{ConfigHandle, ProxyConfig};
use ds_image_proxy::proxy::ImageProxy;
use ds_image_proxy::{create_router, AddressingMode, ImageService, RouterConfig};
use serde_json::json;
use wiremock::matchers::{body_json as body_json_matcher, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::test_utils::{
    body_bytes, body_json, get, is_gif, requested_uris, router, service_config, MockRights,
};

const THUMBNAIL: &str = "/iip?FIF=foo.jpg&WID=100&HEI=100&CVT=jpeg";

#[tokio::test]
async fn test_no_access_placeholder() {
    let server = MockServer::start().await;
    let rights = MockRights::new().with_verdict("foo.jpg", AccessVerdict::NoAccess);

    let response = get(router(&server, rights.clone()), THUMBNAIL).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/gif");
    assert!(is_gif(&body_bytes(response).await));
    assert!(requested_uris(&server).await.is_empty());
    assert_eq!(rights.call_count(), 1);
}

#[tokio::test]
async fn test_non_existing_placeholder() {
    let server = MockServer::start().await;
    let rights = MockRights::new().with_verdict("foo.jpg", AccessVerdict::NonExisting);

    let response = get(router(&server, rights), "/iiif/foo.jpg/full/max/0/default.jpg").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/gif");
    assert!(is_gif(&body_bytes(response).await));
    assert!(requested_uris(&server).await.is_empty());
}

#[tokio::test]
async fn test_custom_placeholder_image() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("no-access.png");
    std::fs::write(&image, b"\x89PNGdenied").unwrap();

    let mut config = service_config(&server.uri(), AddressingMode::Path);
    config.images.no_access = Some(image);
    let placeholders = Placeholders::load(&config.images).unwrap();

    let service = ImageService::new(
        ConfigHandle::new(config),
        AccessGate::new(
            MockRights::new().with_verdict("foo.jpg", AccessVerdict::NoAccess),
            placeholders,
        ),
        ImageProxy::new(&ProxyConfig::default()).unwrap(),
    );
    let router = create_router(service, RouterConfig::new().with_tracing(false));

    let response = get(router, THUMBNAIL).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(body_bytes(response).await.as_ref(), b"\x89PNGdenied");
}

#[tokio::test]
async fn test_unmatched_resource_is_internal_error() {
    let server = MockServer::start().await;
    let rights = MockRights::new().with_unknown("foo.jpg");

    let response = get(router(&server, rights), THUMBNAIL).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = body_json(response).await;
    assert_eq!(json["error"], "internal_error");
    assert_eq!(json["message"], "Internal server error");
    assert!(requested_uris(&server).await.is_empty());
}

#[tokio::test]
async fn test_rights_failure_is_internal_error() {
    let server = MockServer::start().await;

    let response = get(router(&server, MockRights::new().failing()), THUMBNAIL).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(requested_uris(&server).await.is_empty());
}

#[tokio::test]
async fn test_license_client_end_to_end() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("jpeg", "image/jpeg"))
        .mount(&backend)
        .await;

    let licenses = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/licensemodule/checkAccessForIds"))
        .and(body_json_matcher(json!({
            "accessIds": ["foo.jpg"],
            "presentationType": "Thumbnails",
            "attributes": [{"attribute": "everybody", "values": ["yes"]}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessIds": ["foo.jpg"],
            "nonAccessIds": [],
            "nonExistingIds": []
        })))
        .expect(1)
        .mount(&licenses)
        .await;

    let mut config = service_config(&backend.uri(), AddressingMode::Path);
    config.rights.enabled = true;
    config.rights.url = Some(format!("{}/licensemodule", licenses.uri()));

    let proxy = ImageProxy::new(&ProxyConfig::default()).unwrap();
    let rights = LicenseClient::new(proxy.client().clone(), &format!("{}/licensemodule", licenses.uri()));
    let service = ImageService::new(
        ConfigHandle::new(config),
        AccessGate::new(rights, Placeholders::default()),
        proxy,
    );
    let router = create_router(service, RouterConfig::new().with_tracing(false));

    let response = get(router, THUMBNAIL).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await.as_ref(), b"jpeg");
}

#[tokio::test]
async fn test_license_service_error_status() {
    let backend = MockServer::start().await;
    let licenses = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&licenses)
        .await;

    let proxy = ImageProxy::new(&ProxyConfig::default()).unwrap();
    let rights = LicenseClient::new(proxy.client().clone(), &licenses.uri());
    let service = ImageService::new(
        ConfigHandle::new(service_config(&backend.uri(), AddressingMode::Path)),
        AccessGate::new(rights, Placeholders::default()),
        proxy,
    );
    let router = create_router(service, RouterConfig::new().with_tracing(false));

    let response = get(router, THUMBNAIL).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(requested_uris(&backend).await.is_empty());
}
