use thiserror::Error;

/// Errors surfaced by the request pipeline.
///
/// Every failure a caller can observe falls into one of three kinds:
/// client mistakes, server-side faults, and upstream misbehaviour.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// A request parameter is missing, malformed or out of range (HTTP 400)
    #[error("{reason}")]
    InvalidArgument {
        /// Protocol field the check ran against (e.g. "RGN", "x", "tiles")
        field: String,

        /// Human-readable explanation, returned verbatim to the caller
        reason: String,

        /// The value the caller supplied, if any
        value: Option<String>,
    },

    /// Configuration absence or a broken collaborator contract (HTTP 500)
    #[error("Internal error: {0}")]
    Internal(String),

    /// The backend image server or rights service misbehaved
    #[error("Upstream error {status}: {message}")]
    Upstream {
        /// Status code to surface to the caller
        status: u16,

        /// Caller-facing message; never contains the backend URI
        message: String,
    },
}

impl ServiceError {
    /// Build an invalid-argument error for `field` with the offending value.
    pub fn invalid(
        field: impl Into<String>,
        reason: impl Into<String>,
        value: impl ToString,
    ) -> Self {
        ServiceError::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
            value: Some(value.to_string()),
        }
    }

    /// Build an invalid-argument error that carries no provided value.
    pub fn missing(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ServiceError::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
            value: None,
        }
    }

    /// Build an upstream error.
    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        ServiceError::Upstream {
            status,
            message: message.into(),
        }
    }

    /// Name of the offending field for invalid-argument errors.
    pub fn field(&self) -> Option<&str> {
        match self {
            ServiceError::InvalidArgument { field, .. } => Some(field),
            _ => None,
        }
    }

    /// HTTP status code this error maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::InvalidArgument { .. } => 400,
            ServiceError::Internal(_) => 500,
            ServiceError::Upstream { status, .. } => *status,
        }
    }
}

/// Errors from calling the rights service.
///
/// None of these is a verdict; the access gate reports all of them as
/// internal errors.
#[derive(Debug, Error)]
pub enum RightsError {
    /// The request could not be sent or the connection failed
    #[error("Rights service request failed: {0}")]
    Transport(String),

    /// The rights service answered with a non-success status
    #[error("Rights service returned HTTP {0}")]
    Status(u16),

    /// The response body was not the expected JSON document
    #[error("Rights service response could not be decoded: {0}")]
    Decode(String),
}

/// Errors raised while loading or validating the service configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for the expected schema
    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    /// The configuration parsed but violates a constraint
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
