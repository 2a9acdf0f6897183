//! IIIF integration tests.
//!
//! Tests verify:
//! - Image requests map onto the backend path grammar
//! - Identifiers with `/` survive as one encoded segment
//! - Info requests bypass the access gate
//! - Grammar violations are rejected with the offending field

use axum::http::{header, StatusCode};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::test_utils::{body_bytes, body_json, get, requested_uris, router, MockRights};

const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake-png";

#[tokio::test]
async fn test_iiif_image_is_streamed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/iiif/foo.jpg/full/max/0/default.png"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(PNG_BYTES, "image/png"))
        .expect(1)
        .mount(&server)
        .await;

    let rights = MockRights::new();
    let response = get(
        router(&server, rights.clone()),
        "/iiif/foo.jpg/full/max/0/default.png",
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "inline; filename=\"foo.jpg.png\""
    );
    assert_eq!(body_bytes(response).await.as_ref(), PNG_BYTES);
    assert_eq!(rights.requests()[0].presentation_type, "Fullsize");
}

#[tokio::test]
async fn test_iiif_small_size_is_thumbnail() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(PNG_BYTES, "image/jpeg"))
        .mount(&server)
        .await;

    let rights = MockRights::new();
    let response = get(
        router(&server, rights.clone()),
        "/iiif/foo.jpg/full/!200,150/0/default.jpg",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(rights.requests()[0].presentation_type, "Thumbnails");

    assert_eq!(
        requested_uris(&server).await,
        vec!["/iiif/foo.jpg/full/!200,150/0/default.jpg".to_string()]
    );
}

#[tokio::test]
async fn test_iiif_identifier_with_slash() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(PNG_BYTES, "image/jpeg"))
        .mount(&server)
        .await;

    let rights = MockRights::new();
    let response = get(
        router(&server, rights.clone()),
        "/iiif/bar%2Fspa%20ce.jpg/full/max/0/color.jpg",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(
        requested_uris(&server).await,
        vec!["/iiif/bar%2Fspa%20ce.jpg/full/max/0/color.jpg".to_string()]
    );
    assert_eq!(rights.requests()[0].access_ids, vec!["bar/spa ce.jpg".to_string()]);
}

#[tokio::test]
async fn test_iiif_info_is_not_gated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/iiif/foo.jpg/info.json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(r#"{"width":100}"#, "application/json"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let rights = MockRights::new();
    let response = get(router(&server, rights.clone()), "/iiif/foo.jpg/info.json").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    assert!(response.headers().get(header::CONTENT_DISPOSITION).is_none());
    assert_eq!(body_json(response).await["width"], 100);
    assert_eq!(rights.call_count(), 0);
}

#[tokio::test]
async fn test_iiif_info_wrong_document() {
    let server = MockServer::start().await;

    let response = get(router(&server, MockRights::new()), "/iiif/foo.jpg/manifest.json").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["field"], "info");
    assert!(requested_uris(&server).await.is_empty());
}

#[tokio::test]
async fn test_iiif_invalid_fields() {
    let server = MockServer::start().await;
    let rights = MockRights::new();

    for (uri, field) in [
        ("/iiif/foo.jpg/1,2,3/max/0/default.jpg", "region"),
        ("/iiif/foo.jpg/full/x12,34/0/default.jpg", "size"),
        ("/iiif/foo.jpg/full/max/361/default.jpg", "rotation"),
        ("/iiif/foo.jpg/full/max/0/sepia.jpg", "quality"),
        ("/iiif/foo.jpg/full/max/0/default.bmp", "format"),
    ] {
        let response = get(router(&server, rights.clone()), uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        assert_eq!(body_json(response).await["field"], field, "{}", uri);
    }

    assert!(requested_uris(&server).await.is_empty());
    assert_eq!(rights.call_count(), 0);
}
