//! HTTP server layer for the image proxy.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │        /iip   /iiif/...   /deepzoom/...   /health               │
//! │                                                                 │
//! │  ┌──────────────────────────────┐  ┌─────────────────────────┐  │
//! │  │          handlers            │  │        routes           │  │
//! │  │ (extract → ImageService →    │  │  (router, CORS,         │  │
//! │  │  stream / placeholder / JSON)│  │   tracing)              │  │
//! │  └──────────────────────────────┘  └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    deepzoom_handler, health_handler, iiif_image_handler, iiif_info_handler, iip_handler,
    AppState, ErrorResponse, HealthResponse,
};
pub use routes::{create_router, CorsPolicy, RouterConfig};
