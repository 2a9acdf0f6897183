//! Router for the image proxy.
//!
//! ```text
//! /health                                                        liveness
//! /iip?FIF=...                                                   IIP
//! /iiif/{identifier}/info.json                                   IIIF image information
//! /iiif/{identifier}/{region}/{size}/{rotation}/{quality}.{fmt}  IIIF image
//! /deepzoom/{imageid}.dzi                                        DeepZoom descriptor
//! /deepzoom/{imageid}_files/{layer}/{x}_{y}.{format}             DeepZoom tile
//! ```
//!
//! Viewers such as OpenSeadragon load tiles cross-origin, so every route sits
//! behind a CORS layer that exposes `Content-Disposition` to scripts.

use std::time::Duration;

use axum::{routing::get, Router};
use http::header::{ACCEPT, CONTENT_DISPOSITION, CONTENT_TYPE};
use http::{HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use super::handlers::{
    deepzoom_handler, health_handler, iiif_image_handler, iiif_info_handler, iip_handler,
    AppState,
};
use crate::access::RightsService;
use crate::service::ImageService;

const CORS_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

// =============================================================================
// Router Configuration
// =============================================================================

/// Which browser origins may read proxied images.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsPolicy {
    /// `Access-Control-Allow-Origin: *`
    AnyOrigin,
    /// Only the listed origins.
    Origins(Vec<HeaderValue>),
    /// No cross-origin access.
    SameOrigin,
}

impl CorsPolicy {
    /// Policy for a list of origins from the command line.
    ///
    /// `*` anywhere in the list allows any origin. Entries that are not valid
    /// header values are skipped with a warning. An empty list means
    /// same-origin only.
    pub fn from_origins<S: AsRef<str>>(origins: &[S]) -> Self {
        let origins: Vec<&str> = origins
            .iter()
            .map(|origin| origin.as_ref().trim())
            .filter(|origin| !origin.is_empty())
            .collect();
        if origins.contains(&"*") {
            return CorsPolicy::AnyOrigin;
        }

        let parsed: Vec<HeaderValue> = origins
            .into_iter()
            .filter_map(|origin| {
                HeaderValue::from_str(origin)
                    .map_err(|_| warn!(origin, "Ignoring invalid CORS origin"))
                    .ok()
            })
            .collect();

        if parsed.is_empty() {
            CorsPolicy::SameOrigin
        } else {
            CorsPolicy::Origins(parsed)
        }
    }
}

/// Settings for [`create_router`].
#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub cors: CorsPolicy,

    /// Wrap the router in a `TraceLayer`.
    pub enable_tracing: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterConfig {
    /// Any origin, tracing on.
    pub fn new() -> Self {
        Self {
            cors: CorsPolicy::AnyOrigin,
            enable_tracing: true,
        }
    }

    pub fn with_cors(mut self, cors: CorsPolicy) -> Self {
        self.cors = cors;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the application router around an image service.
pub fn create_router<R>(image_service: ImageService<R>, config: RouterConfig) -> Router
where
    R: RightsService,
{
    let state = AppState::new(image_service);

    // Both IIIF routes share the name of their third segment: "info.json" or the region
    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/iip", get(iip_handler::<R>))
        .route("/iiif/{identifier}/{segment}", get(iiif_info_handler::<R>))
        .route(
            "/iiif/{identifier}/{segment}/{size}/{rotation}/{file}",
            get(iiif_image_handler::<R>),
        )
        .route("/deepzoom/{*path}", get(deepzoom_handler::<R>))
        .with_state(state)
        .layer(cors_layer(&config.cors));

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

fn cors_layer(policy: &CorsPolicy) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS])
        .allow_headers([ACCEPT])
        .expose_headers([CONTENT_TYPE, CONTENT_DISPOSITION])
        .max_age(CORS_MAX_AGE);

    match policy {
        CorsPolicy::AnyOrigin => layer.allow_origin(AllowOrigin::any()),
        CorsPolicy::Origins(origins) => layer.allow_origin(AllowOrigin::list(origins.clone())),
        CorsPolicy::SameOrigin => layer,
    }
}
