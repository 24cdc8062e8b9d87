//! Normalized error types surfaced to callers.
//!
//! Every failed call or stream ends in exactly one [`ChatCompletionError`]:
//! the provider that failed, the endpoint it was talking to, a classified
//! [`ErrorKind`], and the untouched [`ProviderError`] behind it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::llm::ProviderError;

/// The closed failure taxonomy every provider error is mapped into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Credentials missing, malformed, or rejected
    #[serde(rename = "AuthenticationError")]
    Authentication,
    /// Throttled or out of quota
    #[serde(rename = "RateLimitError")]
    RateLimit,
    /// The vendor refused the request as malformed or unsupported
    #[serde(rename = "InvalidRequestError")]
    InvalidRequest,
    /// The vendor or the network path to it is down or overloaded
    #[serde(rename = "ProviderUnavailableError")]
    ProviderUnavailable,
    /// Nothing matched; inspect the raw error
    #[serde(rename = "UnknownProviderError")]
    UnknownProvider,
}

impl ErrorKind {
    /// The wire name, e.g. `AuthenticationError`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "AuthenticationError",
            Self::RateLimit => "RateLimitError",
            Self::InvalidRequest => "InvalidRequestError",
            Self::ProviderUnavailable => "ProviderUnavailableError",
            Self::UnknownProvider => "UnknownProviderError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified chat completion failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatCompletionError {
    /// Provider identifier as requested by the caller
    pub provider: String,
    /// Base URL of the failing endpoint
    pub endpoint: Option<String>,
    /// Classified failure kind
    pub kind: ErrorKind,
    /// The vendor-native error, never reinterpreted
    pub source: ProviderError,
}

impl ChatCompletionError {
    /// Creates a classified error.
    #[must_use]
    pub fn new(
        provider: impl Into<String>,
        endpoint: Option<String>,
        kind: ErrorKind,
        source: ProviderError,
    ) -> Self {
        Self {
            provider: provider.into(),
            endpoint,
            kind,
            source,
        }
    }

    /// Returns true for credential failures.
    #[must_use]
    pub fn is_authentication(&self) -> bool {
        self.kind == ErrorKind::Authentication
    }

    /// Returns true for throttling and quota failures.
    #[must_use]
    pub fn is_rate_limit(&self) -> bool {
        self.kind == ErrorKind::RateLimit
    }

    /// Returns true for requests the vendor refused as invalid.
    #[must_use]
    pub fn is_invalid_request(&self) -> bool {
        self.kind == ErrorKind::InvalidRequest
    }

    /// Returns true when the vendor could not be reached or was overloaded.
    #[must_use]
    pub fn is_provider_unavailable(&self) -> bool {
        self.kind == ErrorKind::ProviderUnavailable
    }

    /// The serializable payload handed to the consumer layer.
    #[must_use]
    pub fn to_payload(&self) -> ChatCompletionErrorPayload {
        ChatCompletionErrorPayload {
            provider: self.provider.clone(),
            endpoint: self.endpoint.clone(),
            error_type: self.kind,
            error: self.source.to_raw(),
        }
    }
}

impl fmt::Display for ChatCompletionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from '{}'", self.kind, self.provider)?;
        if let Some(endpoint) = &self.endpoint {
            write!(f, " ({})", endpoint)?;
        }
        write!(f, ": {}", self.source)
    }
}

impl std::error::Error for ChatCompletionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Wire form of a [`ChatCompletionError`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatCompletionErrorPayload {
    /// Provider identifier
    pub provider: String,
    /// Endpoint, when one applies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Classified kind
    pub error_type: ErrorKind,
    /// Raw vendor error object
    pub error: serde_json::Value,
}

// =============================================================================
// Configuration errors
// =============================================================================

/// Errors that can occur while loading runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    /// The specific error that occurred
    pub kind: ConfigErrorKind,
}

/// Specific configuration failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// The config file could not be read
    Read {
        /// Path that failed
        path: PathBuf,
        /// I/O failure description
        reason: String,
    },
    /// The config file is not valid TOML for this schema
    Parse {
        /// Parser failure description
        reason: String,
    },
}

impl ConfigError {
    /// Creates a read error.
    #[must_use]
    pub fn read(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            kind: ConfigErrorKind::Read {
                path: path.into(),
                reason: reason.into(),
            },
        }
    }

    /// Creates a parse error.
    #[must_use]
    pub fn parse(reason: impl Into<String>) -> Self {
        Self {
            kind: ConfigErrorKind::Parse {
                reason: reason.into(),
            },
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ConfigErrorKind::Read { path, reason } => {
                write!(
                    f,
                    "failed to read config file '{}': {}; check the file exists and is readable",
                    path.display(),
                    reason
                )
            }
            ConfigErrorKind::Parse { reason } => {
                write!(f, "invalid configuration: {}", reason)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
