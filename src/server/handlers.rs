//! HTTP request handlers for the image proxy.
//!
//! # Endpoints
//!
//! - `GET /iip?FIF=...` - IIP image request
//! - `GET /iiif/{identifier}/{region}/{size}/{rotation}/{quality}.{format}` - IIIF image
//! - `GET /iiif/{identifier}/info.json` - IIIF image information
//! - `GET /deepzoom/{imageid}.dzi` - DeepZoom descriptor
//! - `GET /deepzoom/{imageid}_files/{layer}/{x}_{y}.{format}` - DeepZoom tile
//! - `GET /health` - Health check endpoint

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{OriginalUri, Path, RawQuery, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::access::RightsService;
use crate::error::ServiceError;
use crate::protocol::{
    deepzoom_from_path, iiif_image_from_path, iiif_info_from_path, iip_from_query,
    ProtocolRequest,
};
use crate::proxy::RequestContext;
use crate::service::{ImageResponse, ImageService};

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the image service.
///
/// This is passed to all handlers via Axum's State extractor.
pub struct AppState<R: RightsService> {
    /// The pipeline every image request runs through
    pub image_service: Arc<ImageService<R>>,
}

impl<R: RightsService> AppState<R> {
    pub fn new(image_service: ImageService<R>) -> Self {
        Self {
            image_service: Arc::new(image_service),
        }
    }
}

impl<R: RightsService> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            image_service: Arc::clone(&self.image_service),
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "invalid_argument", "upstream_error")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// Offending request parameter, for invalid arguments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    /// Create a new error response with status code.
    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            field: None,
            status: Some(status.as_u16()),
        }
    }

    pub fn with_field(mut self, field: Option<&str>) -> Self {
        self.field = field.map(str::to_string);
        self
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Convert ServiceError to HTTP response.
///
/// Internal errors are reported to the caller with a generic message; the
/// detail goes to the log only.
impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            ServiceError::InvalidArgument { .. } => {
                (StatusCode::BAD_REQUEST, "invalid_argument", self.to_string())
            }
            ServiceError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error".to_string(),
            ),
            ServiceError::Upstream { status, message } => (
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
                "upstream_error",
                message.clone(),
            ),
        };

        // Log errors based on severity
        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                self
            );
        } else if status == StatusCode::NOT_FOUND {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Resource not found: {}",
                message
            );
        } else if status.is_client_error() {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                field = self.field(),
                "Client error: {}",
                message
            );
        }

        let error_response =
            ErrorResponse::with_status(error_type, message, status).with_field(self.field());

        (status, Json(error_response)).into_response()
    }
}

// =============================================================================
// Response Building
// =============================================================================

fn header_value(value: &str, fallback: &'static str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static(fallback))
}

/// `inline` disposition with `name` as a quoted-string filename.
///
/// Backslash and double quote are escaped, control characters dropped.
fn content_disposition(name: &str) -> Option<HeaderValue> {
    let mut quoted = String::with_capacity(name.len());
    for c in name.chars().filter(|c| !c.is_control()) {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    HeaderValue::from_str(&format!("inline; filename=\"{}\"", quoted)).ok()
}

fn into_http(response: ImageResponse) -> Response {
    match response {
        ImageResponse::Proxied {
            image,
            content_type,
            filename,
        } => {
            let mut response = Response::new(Body::from_stream(image.body));
            *response.status_mut() = StatusCode::from_u16(image.status).unwrap_or(StatusCode::OK);

            let headers = response.headers_mut();
            headers.insert(
                header::CONTENT_TYPE,
                header_value(&content_type, "application/octet-stream"),
            );
            if let Some(name) = filename {
                match content_disposition(&name) {
                    Some(value) => {
                        headers.insert(header::CONTENT_DISPOSITION, value);
                    }
                    None => debug!(filename = %name, "Skipping Content-Disposition for unencodable filename"),
                }
            }
            response
        }
        ImageResponse::Placeholder { status, image } => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::FORBIDDEN);
            (
                status,
                [(header::CONTENT_TYPE, HeaderValue::from_static(image.content_type))],
                image.body,
            )
                .into_response()
        }
    }
}

async fn serve<R: RightsService>(
    state: &AppState<R>,
    request: ProtocolRequest,
    uri: &OriginalUri,
    headers: &HeaderMap,
) -> Result<Response, ServiceError> {
    let request_uri = uri
        .0
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.0.path().to_string());
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let context = RequestContext::new(request_uri).with_accept(accept);

    let response = state.image_service.handle(request, &context).await?;
    Ok(into_http(response))
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle IIP requests.
///
/// # Endpoint
///
/// `GET /iip?FIF={path}&WID=..&HEI=..&CVT=jpeg`
///
/// Parameter names are case-insensitive.
pub async fn iip_handler<R: RightsService>(
    State(state): State<AppState<R>>,
    uri: OriginalUri,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Result<Response, ServiceError> {
    let request = iip_from_query(query.as_deref())?;
    serve(&state, request, &uri, &headers).await
}

/// Handle IIIF image requests.
///
/// # Endpoint
///
/// `GET /iiif/{identifier}/{region}/{size}/{rotation}/{quality}.{format}`
///
/// Identifiers containing `/` must be percent-encoded.
pub async fn iiif_image_handler<R: RightsService>(
    State(state): State<AppState<R>>,
    uri: OriginalUri,
    headers: HeaderMap,
    Path((identifier, region, size, rotation, file)): Path<(String, String, String, String, String)>,
) -> Result<Response, ServiceError> {
    let request = iiif_image_from_path(identifier, region, size, rotation, &file);
    serve(&state, request, &uri, &headers).await
}

/// Handle IIIF image information requests.
///
/// # Endpoint
///
/// `GET /iiif/{identifier}/info.json`
pub async fn iiif_info_handler<R: RightsService>(
    State(state): State<AppState<R>>,
    uri: OriginalUri,
    headers: HeaderMap,
    Path((identifier, file)): Path<(String, String)>,
) -> Result<Response, ServiceError> {
    let request = iiif_info_from_path(identifier, &file)?;
    serve(&state, request, &uri, &headers).await
}

/// Handle DeepZoom descriptor and tile requests.
///
/// # Endpoints
///
/// - `GET /deepzoom/{imageid}.dzi`
/// - `GET /deepzoom/{imageid}_files/{layer}/{x}_{y}.{format}?CNT=..&GAM=..&INV`
pub async fn deepzoom_handler<R: RightsService>(
    State(state): State<AppState<R>>,
    uri: OriginalUri,
    headers: HeaderMap,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
) -> Result<Response, ServiceError> {
    let request = deepzoom_from_path(&path, query.as_deref())?;
    serve(&state, request, &uri, &headers).await
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
