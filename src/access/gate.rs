//! Access gate.
//!
//! Asks the rights service about one identifier and turns the answer into
//! either permission to proceed or a placeholder image response.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, error, warn};

use super::classify::PresentationClass;
use super::license::{AccessCheckRequest, AccessCheckResponse, RightsService};
use crate::config::PlaceholderConfig;
use crate::error::{ConfigError, ServiceError};
use crate::protocol::content_type_for;

/// Transparent 1x1 GIF served when no placeholder file is configured.
const BLANK_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xFF, 0xFF, 0xFF, 0x21, 0xF9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2C, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3B,
];

// =============================================================================
// Placeholders
// =============================================================================

/// An image body returned instead of the requested image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderImage {
    pub body: Bytes,
    pub content_type: &'static str,
}

impl PlaceholderImage {
    /// Read a placeholder file; the content type follows its extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let body = std::fs::read(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        Ok(Self {
            body: Bytes::from(body),
            content_type: content_type_for(extension),
        })
    }

    /// Built-in blank image.
    pub fn blank() -> Self {
        Self {
            body: Bytes::from_static(BLANK_GIF),
            content_type: "image/gif",
        }
    }
}

/// Placeholders for denied (403) and unknown (404) resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholders {
    pub no_access: PlaceholderImage,
    pub non_existing: PlaceholderImage,
}

impl Default for Placeholders {
    fn default() -> Self {
        Self {
            no_access: PlaceholderImage::blank(),
            non_existing: PlaceholderImage::blank(),
        }
    }
}

impl Placeholders {
    /// Load the configured placeholder files, using the blank image for any
    /// that are not configured.
    pub fn load(config: &PlaceholderConfig) -> Result<Self, ConfigError> {
        let load = |path: &Option<std::path::PathBuf>| match path {
            Some(path) => PlaceholderImage::load(path),
            None => Ok(PlaceholderImage::blank()),
        };
        Ok(Self {
            no_access: load(&config.no_access)?,
            non_existing: load(&config.non_existing)?,
        })
    }
}

// =============================================================================
// Verdicts
// =============================================================================

/// The rights service's answer for a single identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessVerdict {
    Access,
    NoAccess,
    NonExisting,
}

impl AccessVerdict {
    /// Find `id` in the response lists, checked in the order access, no
    /// access, non-existing.
    pub fn from_response(id: &str, response: &AccessCheckResponse) -> Option<Self> {
        let contains = |ids: &[String]| ids.iter().any(|candidate| candidate == id);
        if contains(&response.access_ids) {
            Some(AccessVerdict::Access)
        } else if contains(&response.non_access_ids) {
            Some(AccessVerdict::NoAccess)
        } else if contains(&response.non_existing_ids) {
            Some(AccessVerdict::NonExisting)
        } else {
            None
        }
    }
}

/// What the pipeline does next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Access granted; proxy the request.
    Proceed,
    /// Answer with a placeholder image and this status.
    Placeholder { status: u16, image: PlaceholderImage },
}

// =============================================================================
// Access Gate
// =============================================================================

/// Access gate over a rights service.
pub struct AccessGate<R: RightsService> {
    rights: Arc<R>,
    placeholders: Arc<Placeholders>,
}

impl<R: RightsService> Clone for AccessGate<R> {
    fn clone(&self) -> Self {
        Self {
            rights: Arc::clone(&self.rights),
            placeholders: Arc::clone(&self.placeholders),
        }
    }
}

impl<R: RightsService> AccessGate<R> {
    pub fn new(rights: R, placeholders: Placeholders) -> Self {
        Self {
            rights: Arc::new(rights),
            placeholders: Arc::new(placeholders),
        }
    }

    /// Ask the rights service about `id`.
    ///
    /// A failed call and an answer that does not mention `id` are both
    /// internal errors; neither is ever read as access granted.
    pub async fn verdict(
        &self,
        id: &str,
        class: PresentationClass,
    ) -> Result<AccessVerdict, ServiceError> {
        let request = AccessCheckRequest::anonymous(id, class.presentation_type());
        let response = self.rights.check_access(&request).await.map_err(|e| {
            error!(resource_id = id, error = %e, "Rights service call failed");
            ServiceError::Internal(format!(
                "Error calling rights service for resource ID '{}'",
                id
            ))
        })?;

        AccessVerdict::from_response(id, &response).ok_or_else(|| {
            warn!(resource_id = id, response = ?response, "Rights service response does not mention resource");
            ServiceError::Internal(format!(
                "Could not match resource ID '{}' to any access type",
                id
            ))
        })
    }

    /// Run the gate for `id` classified as `class`.
    pub async fn check(
        &self,
        id: &str,
        class: PresentationClass,
    ) -> Result<GateOutcome, ServiceError> {
        let verdict = self.verdict(id, class).await?;
        debug!(resource_id = id, verdict = ?verdict, presentation = class.presentation_type(), "Access verdict");

        Ok(match verdict {
            AccessVerdict::Access => GateOutcome::Proceed,
            AccessVerdict::NoAccess => GateOutcome::Placeholder {
                status: 403,
                image: self.placeholders.no_access.clone(),
            },
            AccessVerdict::NonExisting => GateOutcome::Placeholder {
                status: 404,
                image: self.placeholders.non_existing.clone(),
            },
        })
    }
}
