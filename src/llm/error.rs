//! Vendor-native failure type.
//!
//! Adapters and framing decoders report failures as `ProviderError`, exactly
//! as the vendor or transport produced them. Nothing here decides what a
//! failure *means*; that happens in [`crate::classify`].

use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;

/// A failure reported by a provider call or its response stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    /// The specific error that occurred
    pub kind: ProviderErrorKind,
}

/// Specific provider failure shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// The vendor answered with a non-success HTTP status
    Http {
        /// HTTP status code
        status: u16,
        /// Response body, verbatim
        body: String,
        /// Parsed `retry-after` header, when present
        retry_after: Option<Duration>,
    },
    /// The request never produced a response
    Network {
        /// Description of the transport failure
        message: String,
        /// Whether the transport gave up on a deadline
        timeout: bool,
    },
    /// Reading the response body failed mid-stream
    Stream {
        /// Description of the read failure
        message: String,
    },
    /// The byte stream violated its framing (bad CRC, truncated frame)
    Frame {
        /// What was wrong with the frame
        message: String,
    },
    /// The vendor signalled an error inside an otherwise healthy stream
    Vendor {
        /// Vendor error or exception type, e.g. `throttlingException`
        error_type: String,
        /// Vendor message
        message: String,
    },
    /// Credentials were missing or malformed at call time
    InvalidCredentials {
        /// Why the credentials could not be used
        reason: String,
    },
    /// The model id is not served by this adapter
    UnsupportedModel {
        /// The requested model
        model: String,
    },
    /// A non-streaming response body could not be decoded
    Parse {
        /// Description of the parse error
        message: String,
    },
}

impl ProviderError {
    /// Creates a new ProviderError with the given kind.
    #[must_use]
    pub fn new(kind: ProviderErrorKind) -> Self {
        Self { kind }
    }

    /// Creates an HTTP status error.
    #[must_use]
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Http {
            status,
            body: body.into(),
            retry_after: None,
        })
    }

    /// Attaches a retry-after hint to an HTTP error; other kinds are unchanged.
    #[must_use]
    pub fn with_retry_after(mut self, delay: Option<Duration>) -> Self {
        if let ProviderErrorKind::Http { retry_after, .. } = &mut self.kind {
            *retry_after = delay;
        }
        self
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Network {
            message: message.into(),
            timeout: false,
        })
    }

    /// Creates a network timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Network {
            message: message.into(),
            timeout: true,
        })
    }

    /// Creates a mid-stream read error.
    #[must_use]
    pub fn stream(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Stream {
            message: message.into(),
        })
    }

    /// Creates a framing error.
    #[must_use]
    pub fn frame(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Frame {
            message: message.into(),
        })
    }

    /// Creates an in-band vendor error.
    #[must_use]
    pub fn vendor(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Vendor {
            error_type: error_type.into(),
            message: message.into(),
        })
    }

    /// Creates an invalid credentials error.
    #[must_use]
    pub fn invalid_credentials(reason: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::InvalidCredentials {
            reason: reason.into(),
        })
    }

    /// Creates an unsupported model error.
    #[must_use]
    pub fn unsupported_model(model: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::UnsupportedModel {
            model: model.into(),
        })
    }

    /// Creates a parse error.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Parse {
            message: message.into(),
        })
    }

    /// HTTP status, if the vendor answered with one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match &self.kind {
            ProviderErrorKind::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// HTTP response body parsed as JSON, if it is JSON.
    #[must_use]
    pub fn body_json(&self) -> Option<Value> {
        match &self.kind {
            ProviderErrorKind::Http { body, .. } => serde_json::from_str(body).ok(),
            _ => None,
        }
    }

    /// The retry-after hint sent with an HTTP error.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match &self.kind {
            ProviderErrorKind::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// The most specific human-readable message carried by the error.
    #[must_use]
    pub fn message(&self) -> String {
        match &self.kind {
            ProviderErrorKind::Http { body, .. } => self
                .body_json()
                .and_then(|v| extract_message(&v))
                .unwrap_or_else(|| body.clone()),
            ProviderErrorKind::Network { message, .. }
            | ProviderErrorKind::Stream { message }
            | ProviderErrorKind::Frame { message }
            | ProviderErrorKind::Vendor { message, .. }
            | ProviderErrorKind::Parse { message } => message.clone(),
            ProviderErrorKind::InvalidCredentials { reason } => reason.clone(),
            ProviderErrorKind::UnsupportedModel { model } => {
                format!("model '{model}' is not supported")
            }
        }
    }

    /// The error as a JSON object, preserving everything the vendor sent.
    ///
    /// HTTP bodies that parse as JSON are embedded as-is; anything else is
    /// kept as a string.
    #[must_use]
    pub fn to_raw(&self) -> Value {
        match &self.kind {
            ProviderErrorKind::Http {
                status,
                body,
                retry_after,
            } => {
                let body = self
                    .body_json()
                    .unwrap_or_else(|| Value::String(body.clone()));
                let mut raw = json!({ "status": status, "body": body });
                if let Some(delay) = retry_after {
                    raw["retryAfter"] = json!(delay.as_secs());
                }
                raw
            }
            ProviderErrorKind::Network { message, timeout } => {
                json!({ "type": "network", "message": message, "timeout": timeout })
            }
            ProviderErrorKind::Stream { message } => {
                json!({ "type": "stream", "message": message })
            }
            ProviderErrorKind::Frame { message } => {
                json!({ "type": "frame", "message": message })
            }
            ProviderErrorKind::Vendor {
                error_type,
                message,
            } => json!({ "type": error_type, "message": message }),
            ProviderErrorKind::InvalidCredentials { reason } => {
                json!({ "type": "invalid_credentials", "message": reason })
            }
            ProviderErrorKind::UnsupportedModel { model } => {
                json!({ "type": "unsupported_model", "model": model })
            }
            ProviderErrorKind::Parse { message } => {
                json!({ "type": "parse", "message": message })
            }
        }
    }
}

/// Pulls a message out of the common vendor error envelopes.
pub(crate) fn extract_message(value: &Value) -> Option<String> {
    ["/error/message", "/message", "/Message", "/error"]
        .iter()
        .find_map(|pointer| value.pointer(pointer).and_then(Value::as_str))
        .map(str::to_string)
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ProviderErrorKind::Http { status, .. } => {
                write!(f, "provider returned HTTP {}: {}", status, self.message())
            }
            ProviderErrorKind::Network { message, timeout } => {
                if *timeout {
                    write!(f, "request to provider timed out: {}", message)
                } else {
                    write!(
                        f,
                        "network error communicating with provider: {}; check network connectivity",
                        message
                    )
                }
            }
            ProviderErrorKind::Stream { message } => {
                write!(f, "response stream failed: {}", message)
            }
            ProviderErrorKind::Frame { message } => {
                write!(f, "malformed stream frame: {}", message)
            }
            ProviderErrorKind::Vendor {
                error_type,
                message,
            } => write!(f, "provider error ({}): {}", error_type, message),
            ProviderErrorKind::InvalidCredentials { reason } => {
                write!(f, "invalid credentials: {}; check provider settings", reason)
            }
            ProviderErrorKind::UnsupportedModel { model } => {
                write!(f, "model '{}' is not supported by this provider", model)
            }
            ProviderErrorKind::Parse { message } => {
                write!(f, "failed to parse provider response: {}", message)
            }
        }
    }
}

impl std::error::Error for ProviderError {}
