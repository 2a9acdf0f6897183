//! # DS Image Proxy
//!
//! An access-controlled proxy in front of IIP, IIIF and DeepZoom image servers.
//!
//! Every inbound request is validated against the grammar of its protocol,
//! translated into the backend server's URI, checked against the rights
//! service and then streamed from the backend without buffering.
//!
//! ## Features
//!
//! - **Strict validation**: Protocol parameters are checked before any outbound call
//! - **Access control**: Thumbnail and fullsize requests are gated separately
//! - **Streaming proxy**: Backend bodies are forwarded as they arrive
//! - **Live configuration**: The service configuration can be reloaded while running
//!
//! ## Architecture
//!
//! - [`protocol`] - Request types, parsing, validation and backend URI translation
//! - [`access`] - Presentation classification, rights service and access gate
//! - [`proxy`] - Outbound streaming client and status mapping
//! - [`service`] - The request pipeline
//! - [`server`] - Axum handlers and router
//! - [`config`] - CLI arguments and the TOML service configuration

pub mod access;
pub mod config;
pub mod error;
pub mod protocol;
pub mod proxy;
pub mod server;
pub mod service;

// Re-export commonly used types
pub use access::{
    classify, AccessGate, AccessVerdict, GateOutcome, LicenseClient, OpenAccess,
    PlaceholderImage, Placeholders, PresentationClass, RightsService,
};
pub use config::{Config, ConfigHandle, ServiceConfig, ThumbnailConfig};
pub use error::{ConfigError, RightsError, ServiceError};
pub use protocol::{
    translate, validate, AddressingMode, BackendAddress, Backends, ProtocolRequest, ProtocolTag,
    TranslatedUri,
};
pub use proxy::{map_upstream_status, ImageProxy, ProxiedImage, RequestContext};
pub use server::{create_router, AppState, CorsPolicy, ErrorResponse, HealthResponse, RouterConfig};
pub use service::{ImageResponse, ImageService};
