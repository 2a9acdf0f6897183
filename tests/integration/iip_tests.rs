//! IIP integration tests.
//!
//! Tests verify:
//! - Validated requests are forwarded with the exact backend query
//! - Response headers (content type, inline filename)
//! - Validation failures never reach the backend or the rights service

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::test_utils::{
    body_bytes, body_json, get, requested_uris, router, send, MockRights, IIP_PATH,
};

const JPEG_BYTES: &[u8] = b"\xFF\xD8\xFF\xE0fake-jpeg";

// =============================================================================
// Successful Requests
// =============================================================================

#[tokio::test]
async fn test_iip_thumbnail_is_streamed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(IIP_PATH))
        .and(query_param("FIF", "foo.jpg"))
        .and(query_param("WID", "200"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(JPEG_BYTES, "image/jpeg"))
        .expect(1)
        .mount(&server)
        .await;

    let rights = MockRights::new();
    let response = get(
        router(&server, rights.clone()),
        "/iip?FIF=foo.jpg&WID=200&HEI=100&CVT=jpeg",
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "inline; filename=\"foo.jpg.jpeg\""
    );
    assert_eq!(body_bytes(response).await.as_ref(), JPEG_BYTES);

    let requests = rights.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].access_ids, vec!["foo.jpg".to_string()]);
    assert_eq!(requests[0].presentation_type, "Thumbnails");
}

#[tokio::test]
async fn test_iip_backend_query_is_exact() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(JPEG_BYTES, "image/jpeg"))
        .mount(&server)
        .await;

    let response = get(
        router(&server, MockRights::new()),
        "/iip?fif=mount%2Fdir%2Fimage.jp2&wid=1200&hei=800&rgn=0.1,0.2,0.3,0.4&cnt=1&inv&cvt=jpg",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(
        requested_uris(&server).await,
        vec![format!(
            "{}?FIF=mount%2Fdir%2Fimage.jp2&WID=1200&HEI=800&RGN=0.1,0.2,0.3,0.4&CNT=1.0&INV&CVT=jpeg",
            IIP_PATH
        )]
    );
}

#[tokio::test]
async fn test_iip_large_size_is_fullsize() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(JPEG_BYTES, "image/jpeg"))
        .mount(&server)
        .await;

    let rights = MockRights::new();
    let response = get(
        router(&server, rights.clone()),
        "/iip?FIF=foo.jpg&WID=601&HEI=100&CVT=jpeg",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(rights.requests()[0].presentation_type, "Fullsize");
}

#[tokio::test]
async fn test_iip_tile_request_has_no_cvt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(JPEG_BYTES, "image/jpeg"))
        .mount(&server)
        .await;

    let rights = MockRights::new();
    let response = get(router(&server, rights.clone()), "/iip?FIF=foo.jpg&JTL=3,12").await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(
        requested_uris(&server).await,
        vec![format!("{}?FIF=foo.jpg&JTL=3,12", IIP_PATH)]
    );
    assert_eq!(rights.requests()[0].presentation_type, "Fullsize");
}

#[tokio::test]
async fn test_iip_accept_header_is_forwarded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(wiremock::matchers::header("accept", "image/webp"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(JPEG_BYTES, "image/jpeg"))
        .expect(1)
        .mount(&server)
        .await;

    let request = Request::builder()
        .uri("/iip?FIF=foo.jpg&CVT=jpeg")
        .header(header::ACCEPT, "image/webp")
        .body(Body::empty())
        .unwrap();
    let response = send(router(&server, MockRights::new()), request).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_iip_content_type_falls_back_to_format() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let response = get(router(&server, MockRights::new()), "/iip?FIF=foo.jpg&CVT=png").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "inline; filename=\"foo.jpg.png\""
    );
}

// =============================================================================
// Validation Failures
// =============================================================================

#[tokio::test]
async fn test_iip_missing_fif() {
    let server = MockServer::start().await;
    let rights = MockRights::new();

    let response = get(router(&server, rights.clone()), "/iip?CVT=jpeg").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = body_json(response).await;
    assert_eq!(json["error"], "invalid_argument");
    assert_eq!(json["field"], "FIF");
    assert_eq!(json["message"], "The parameter FIF must be defined");

    assert!(requested_uris(&server).await.is_empty());
    assert_eq!(rights.call_count(), 0);
}

#[tokio::test]
async fn test_iip_conflicting_output_modes() {
    let server = MockServer::start().await;
    let rights = MockRights::new();

    let response = get(
        router(&server, rights.clone()),
        "/iip?FIF=foo.jpg&JTL=1,2&CVT=jpeg",
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["field"], "JTL,CVT");
    assert!(requested_uris(&server).await.is_empty());
    assert_eq!(rights.call_count(), 0);
}

#[tokio::test]
async fn test_iip_unparseable_number() {
    let server = MockServer::start().await;

    let response = get(
        router(&server, MockRights::new()),
        "/iip?FIF=foo.jpg&WID=wide&CVT=jpeg",
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["field"], "WID");
}

#[tokio::test]
async fn test_iip_size_without_cvt() {
    let server = MockServer::start().await;

    let response = get(router(&server, MockRights::new()), "/iip?FIF=foo.jpg&WID=100").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["field"], "WID");
}
