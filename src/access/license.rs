//! Rights service client.
//!
//! The rights service answers one question: for a set of resource IDs and a
//! presentation type, which IDs may be shown, which may not, and which do not
//! exist at all.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::RightsError;

// =============================================================================
// Wire Types
// =============================================================================

/// A user attribute sent along with the access check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAttribute {
    pub attribute: String,
    pub values: Vec<String>,
}

/// Body of `POST {rights}/checkAccessForIds`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessCheckRequest {
    pub access_ids: Vec<String>,
    pub presentation_type: String,
    pub attributes: Vec<UserAttribute>,
}

impl AccessCheckRequest {
    /// Check a single resource as an anonymous user.
    pub fn anonymous(resource_id: impl Into<String>, presentation_type: &str) -> Self {
        Self {
            access_ids: vec![resource_id.into()],
            presentation_type: presentation_type.to_string(),
            attributes: vec![UserAttribute {
                attribute: "everybody".to_string(),
                values: vec!["yes".to_string()],
            }],
        }
    }
}

/// Rights service verdict lists. Missing lists are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessCheckResponse {
    pub access_ids: Vec<String>,
    pub non_access_ids: Vec<String>,
    pub non_existing_ids: Vec<String>,
}

// =============================================================================
// Rights Service
// =============================================================================

/// Source of access verdicts.
///
/// Implemented over HTTP by [`LicenseClient`]; tests substitute their own.
#[async_trait]
pub trait RightsService: Send + Sync + 'static {
    /// Ask which of the requested IDs are accessible.
    async fn check_access(
        &self,
        request: &AccessCheckRequest,
    ) -> Result<AccessCheckResponse, RightsError>;
}

/// HTTP client for the rights service.
#[derive(Debug, Clone)]
pub struct LicenseClient {
    client: Client,
    endpoint: String,
}

impl LicenseClient {
    /// Create a client for the service rooted at `base_url`.
    pub fn new(client: Client, base_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/checkAccessForIds", base_url.trim_end_matches('/')),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RightsService for LicenseClient {
    async fn check_access(
        &self,
        request: &AccessCheckRequest,
    ) -> Result<AccessCheckResponse, RightsError> {
        debug!(
            endpoint = %self.endpoint,
            ids = ?request.access_ids,
            presentation_type = %request.presentation_type,
            "Checking access"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| RightsError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RightsError::Status(status.as_u16()));
        }

        response
            .json::<AccessCheckResponse>()
            .await
            .map_err(|e| RightsError::Decode(e.to_string()))
    }
}

/// Rights service stand-in that grants access to everything.
///
/// Used when the rights check is disabled in configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAccess;

#[async_trait]
impl RightsService for OpenAccess {
    async fn check_access(
        &self,
        request: &AccessCheckRequest,
    ) -> Result<AccessCheckResponse, RightsError> {
        Ok(AccessCheckResponse {
            access_ids: request.access_ids.clone(),
            ..Default::default()
        })
    }
}
