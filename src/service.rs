//! Image request pipeline.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        ImageService                             │
//! │  ┌───────────────────────────────────────────────────────────┐  │
//! │  │                       handle()                            │  │
//! │  │  1. Validate      3. Classify (images only)   5. Proxy    │  │
//! │  │  2. Translate     4. Access gate (images only)            │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! │         │                    │                      │           │
//! │         ▼                    ▼                      ▼           │
//! │  ┌─────────────┐     ┌──────────────┐      ┌──────────────┐     │
//! │  │ConfigHandle │     │  AccessGate  │      │  ImageProxy  │     │
//! │  └─────────────┘     └──────────────┘      └──────────────┘     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use tracing::debug;

use crate::access::{classify, AccessGate, GateOutcome, PlaceholderImage, RightsService};
use crate::config::ConfigHandle;
use crate::error::ServiceError;
use crate::protocol::{content_type_for, translate, validate, ProtocolRequest};
use crate::proxy::{ImageProxy, ProxiedImage, RequestContext};

// =============================================================================
// Image Response
// =============================================================================

/// Result of a request that passed validation.
#[derive(Debug)]
pub enum ImageResponse {
    /// Backend response to stream back
    Proxied {
        image: ProxiedImage,
        /// Upstream content type, or the one implied by the requested format
        content_type: String,
        /// Inline download filename
        filename: Option<String>,
    },
    /// Access gate substitute
    Placeholder {
        status: u16,
        image: PlaceholderImage,
    },
}

// =============================================================================
// Image Service
// =============================================================================

/// Runs inbound image requests through validation, access control and proxying.
pub struct ImageService<R: RightsService> {
    config: ConfigHandle,
    gate: AccessGate<R>,
    proxy: ImageProxy,
}

impl<R: RightsService> ImageService<R> {
    pub fn new(config: ConfigHandle, gate: AccessGate<R>, proxy: ImageProxy) -> Self {
        Self {
            config,
            gate,
            proxy,
        }
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// Handle one request.
    ///
    /// The configuration snapshot is taken once, so a concurrent reload never
    /// mixes old and new settings within a request.
    pub async fn handle(
        &self,
        request: ProtocolRequest,
        context: &RequestContext,
    ) -> Result<ImageResponse, ServiceError> {
        validate(&request)?;

        let config = self.config.snapshot();
        let uri = translate(&request, &config.backends())?;
        debug!(
            protocol = request.tag().as_str(),
            identifier = request.identifier(),
            backend_uri = %uri,
            "Translated request"
        );

        if request.is_image() {
            let class = classify(&request, &config.thumbnail);
            if let GateOutcome::Placeholder { status, image } =
                self.gate.check(request.identifier(), class).await?
            {
                return Ok(ImageResponse::Placeholder { status, image });
            }
        }

        let image = self.proxy.fetch(&uri, request.identifier(), context).await?;
        let content_type = image
            .content_type
            .clone()
            .unwrap_or_else(|| content_type_for(request.response_format()).to_string());

        Ok(ImageResponse::Proxied {
            image,
            content_type,
            filename: request.download_filename(),
        })
    }
}
