//! Streaming reverse proxy to the backend image server.
//!
//! One outbound GET per request. The upstream status decides the outcome:
//!
//! ```text
//! 200-299      stream the body with the same status
//! 400-599      fail with the same status, body dropped
//! -1           fail with 500 (no valid status line)
//! other        fail with 500 naming the code
//! connect err  fail with 502
//! timeout      fail with 504
//! bad reply    fail with 500 (treated as -1)
//! ```
//!
//! Error messages returned to callers name the requested identifier only;
//! the backend URI appears in server logs together with the caller's
//! request URI.

mod stream;

pub use stream::CountingStream;

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use http::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use tracing::{debug, warn};

use crate::config::ProxyConfig;
use crate::error::ServiceError;
use crate::protocol::TranslatedUri;

/// User agent sent to backend image servers.
pub const USER_AGENT: &str = concat!("ds-image-proxy/", env!("CARGO_PKG_VERSION"));

/// Streamed upstream body.
pub type ImageBody = CountingStream<BoxStream<'static, Result<Bytes, reqwest::Error>>>;

// =============================================================================
// Request Context
// =============================================================================

/// Details of the inbound request that travel with it through the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Path and query as received, for log correlation
    pub request_uri: String,
    /// The caller's `Accept` header, forwarded upstream
    pub accept: Option<String>,
}

impl RequestContext {
    pub fn new(request_uri: impl Into<String>) -> Self {
        Self {
            request_uri: request_uri.into(),
            accept: None,
        }
    }

    pub fn with_accept(mut self, accept: Option<String>) -> Self {
        self.accept = accept;
        self
    }
}

// =============================================================================
// Proxied Image
// =============================================================================

/// A successful upstream response, ready to stream to the caller.
pub struct ProxiedImage {
    pub status: u16,
    /// Upstream `Content-Type`, when present
    pub content_type: Option<String>,
    pub body: ImageBody,
}

impl std::fmt::Debug for ProxiedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxiedImage")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Status Mapping
// =============================================================================

/// Map an upstream status code to the caller-facing outcome.
///
/// `-1` stands for a response without a valid status line.
pub fn map_upstream_status(status: i32, identifier: &str) -> Result<u16, ServiceError> {
    match status {
        200..=299 => Ok(status as u16),
        400..=599 => Err(ServiceError::upstream(
            status as u16,
            format!("Unable to proxy request for '{}'", identifier),
        )),
        -1 => Err(ServiceError::upstream(
            500,
            format!(
                "Unable to proxy request for '{}' due to proxied server error -1",
                identifier
            ),
        )),
        other => Err(ServiceError::upstream(
            500,
            format!(
                "Unhandled status code {} for proxy connection for '{}'",
                other, identifier
            ),
        )),
    }
}

fn is_timeout(err: &reqwest::Error) -> bool {
    if err.is_timeout() {
        return true;
    }
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::TimedOut {
                return true;
            }
        }
        source = cause.source();
    }
    false
}

fn map_transport_error(err: &reqwest::Error, identifier: &str) -> ServiceError {
    if is_timeout(err) {
        ServiceError::upstream(
            504,
            format!("Timeout establishing proxy connection for '{}'", identifier),
        )
    } else if err.is_builder() {
        ServiceError::Internal(format!("Unable to create proxy request for '{}'", identifier))
    } else if err.is_connect() {
        ServiceError::upstream(
            502,
            format!("Unable to establish proxy connection for '{}'", identifier),
        )
    } else {
        // Connected, but the reply carried no usable status line
        match map_upstream_status(-1, identifier) {
            Err(e) => e,
            Ok(_) => ServiceError::Internal(format!("Unable to proxy request for '{}'", identifier)),
        }
    }
}

// =============================================================================
// Image Proxy
// =============================================================================

/// Outbound HTTP client for backend image servers.
#[derive(Debug, Clone)]
pub struct ImageProxy {
    client: Client,
}

impl ImageProxy {
    /// Build the upstream client with the configured timeouts.
    ///
    /// Redirects are followed by the client.
    pub fn new(settings: &ProxyConfig) -> Result<Self, ServiceError> {
        let mut builder = Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = settings.connect_timeout() {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(timeout) = settings.read_timeout() {
            builder = builder.read_timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ServiceError::Internal(format!("Unable to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// The underlying client, shared with the rights service client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// GET `uri` and return the body stream on a 2xx answer.
    pub async fn fetch(
        &self,
        uri: &TranslatedUri,
        identifier: &str,
        context: &RequestContext,
    ) -> Result<ProxiedImage, ServiceError> {
        debug!(
            identifier,
            backend_uri = %uri,
            request_uri = %context.request_uri,
            accept = ?context.accept,
            "Proxying request"
        );

        let mut request = self.client.get(uri.as_str());
        if let Some(accept) = &context.accept {
            request = request.header(ACCEPT, accept);
        }

        let response = request.send().await.map_err(|e| {
            warn!(
                identifier,
                backend_uri = %uri,
                request_uri = %context.request_uri,
                error = %e,
                connect = e.is_connect(),
                "Proxy request failed"
            );
            map_transport_error(&e, identifier)
        })?;

        let upstream = response.status().as_u16();
        let status = map_upstream_status(i32::from(upstream), identifier).map_err(|e| {
            warn!(
                identifier,
                status = upstream,
                backend_uri = %uri,
                request_uri = %context.request_uri,
                "Backend answered with a non-success status"
            );
            e
        })?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(ProxiedImage {
            status,
            content_type,
            body: CountingStream::new(
                response.bytes_stream().boxed(),
                uri.as_str(),
                context.request_uri.as_str(),
            ),
        })
    }
}
