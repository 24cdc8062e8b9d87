//! Mapping of vendor-native failures into the [`ErrorKind`] taxonomy.
//!
//! Classification is pure and synchronous. It looks at, in order:
//!
//! 1. vendor error codes and types, first the provider's own table (exact,
//!    case-insensitive), then keywords shared by every vendor (substring)
//! 2. the HTTP status
//! 3. patterns in the vendor message
//!
//! and falls back to [`ErrorKind::UnknownProvider`]. The raw error is never
//! altered; it travels alongside the kind in [`ChatCompletionError`].

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::warn;

use crate::error::{ChatCompletionError, ErrorKind};
use crate::llm::{ProviderError, ProviderErrorKind};
use crate::types::ModelProvider;

/// Who failed, stamped onto every classified error of one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Provider identifier exactly as the caller passed it
    pub provider_label: String,
    /// The adapter that served the call
    pub provider: ModelProvider,
    /// Base URL the adapter talks to
    pub endpoint: Option<String>,
}

impl ErrorContext {
    #[must_use]
    pub fn new(
        provider_label: impl Into<String>,
        provider: ModelProvider,
        endpoint: Option<String>,
    ) -> Self {
        Self {
            provider_label: provider_label.into(),
            provider,
            endpoint,
        }
    }

    /// Classifies `source` and wraps it with this context.
    #[must_use]
    pub fn error(&self, source: ProviderError) -> ChatCompletionError {
        let kind = classify(self.provider, &source);
        ChatCompletionError::new(
            self.provider_label.clone(),
            self.endpoint.clone(),
            kind,
            source,
        )
    }
}

/// Classifies one provider failure.
#[must_use]
pub fn classify(provider: ModelProvider, error: &ProviderError) -> ErrorKind {
    match &error.kind {
        ProviderErrorKind::InvalidCredentials { .. } => return ErrorKind::Authentication,
        ProviderErrorKind::UnsupportedModel { .. } => return ErrorKind::InvalidRequest,
        ProviderErrorKind::Network { .. } | ProviderErrorKind::Stream { .. } => {
            return ErrorKind::ProviderUnavailable
        }
        ProviderErrorKind::Frame { .. } | ProviderErrorKind::Parse { .. } => {
            return ErrorKind::UnknownProvider
        }
        ProviderErrorKind::Http { .. } | ProviderErrorKind::Vendor { .. } => {}
    }

    let codes = vendor_codes(error);
    if let Some(kind) = by_code(provider, &codes) {
        return kind;
    }
    if let Some(kind) = error.status().and_then(by_status) {
        return kind;
    }
    if let Some(kind) = by_message(&error.message()) {
        return kind;
    }

    warn!(
        provider = provider.as_str(),
        status = error.status(),
        codes = ?codes,
        "could not classify provider error"
    );
    ErrorKind::UnknownProvider
}

// =============================================================================
// Vendor codes
// =============================================================================

/// Code and type strings the vendor attached to the error, most specific
/// first.
fn vendor_codes(error: &ProviderError) -> Vec<String> {
    let mut codes = Vec::new();

    if let ProviderErrorKind::Vendor { error_type, .. } = &error.kind {
        codes.push(error_type.clone());
    }

    let Some(body) = error.body_json() else {
        return codes;
    };

    let details = body.pointer("/error/details").and_then(Value::as_array);
    for detail in details.into_iter().flatten() {
        if let Some(reason) = detail.get("reason").and_then(Value::as_str) {
            codes.push(reason.to_string());
        }
    }

    // AWS JSON protocol: "com.amazon.coral.service#ThrottlingException"
    if let Some(aws_type) = body.get("__type").and_then(Value::as_str) {
        let name = aws_type.rsplit('#').next().unwrap_or(aws_type);
        codes.push(name.split(':').next().unwrap_or(name).to_string());
    }

    for pointer in ["/error/code", "/error/type", "/error/status", "/code", "/type"] {
        match body.pointer(pointer) {
            Some(Value::String(s)) if !s.is_empty() => codes.push(s.clone()),
            Some(Value::Number(n)) => codes.push(n.to_string()),
            _ => {}
        }
    }

    codes
}

/// Codes specific to one vendor, matched exactly.
fn provider_codes(provider: ModelProvider) -> &'static [(&'static str, ErrorKind)] {
    use ErrorKind::*;

    match provider {
        ModelProvider::Google => &[
            ("failed_precondition", InvalidRequest),
            ("deadline_exceeded", ProviderUnavailable),
        ],
        ModelProvider::ZhiPu => &[
            ("1000", Authentication),
            ("1001", Authentication),
            ("1002", Authentication),
            ("1003", Authentication),
            ("1004", Authentication),
            ("1113", RateLimit),
            ("1302", RateLimit),
            ("1303", RateLimit),
            ("1305", RateLimit),
            ("1210", InvalidRequest),
            ("1211", InvalidRequest),
            ("1214", InvalidRequest),
            ("1301", InvalidRequest),
            ("1234", ProviderUnavailable),
        ],
        ModelProvider::OpenAI | ModelProvider::Azure => &[
            ("context_length_exceeded", InvalidRequest),
            ("deploymentnotfound", InvalidRequest),
            ("content_filter", InvalidRequest),
        ],
        _ => &[],
    }
}

/// Keywords shared by every vendor, matched as substrings, in priority
/// order.
const COMMON_CODES: &[(&str, ErrorKind)] = &[
    ("invalid_api_key", ErrorKind::Authentication),
    ("incorrect_api_key", ErrorKind::Authentication),
    ("api_key_invalid", ErrorKind::Authentication),
    ("authentication", ErrorKind::Authentication),
    ("unauthenticated", ErrorKind::Authentication),
    ("unauthorized", ErrorKind::Authentication),
    ("permission", ErrorKind::Authentication),
    ("accessdenied", ErrorKind::Authentication),
    ("access_denied", ErrorKind::Authentication),
    ("unrecognizedclient", ErrorKind::Authentication),
    ("invalidsignature", ErrorKind::Authentication),
    ("expiredtoken", ErrorKind::Authentication),
    ("rate_limit", ErrorKind::RateLimit),
    ("ratelimit", ErrorKind::RateLimit),
    ("throttl", ErrorKind::RateLimit),
    ("quota", ErrorKind::RateLimit),
    ("resource_exhausted", ErrorKind::RateLimit),
    ("too_many_requests", ErrorKind::RateLimit),
    ("invalid_argument", ErrorKind::InvalidRequest),
    ("validation", ErrorKind::InvalidRequest),
    ("not_found", ErrorKind::InvalidRequest),
    ("notfound", ErrorKind::InvalidRequest),
    ("unsupported", ErrorKind::InvalidRequest),
    ("overloaded", ErrorKind::ProviderUnavailable),
    ("unavailable", ErrorKind::ProviderUnavailable),
    ("notready", ErrorKind::ProviderUnavailable),
    ("internal", ErrorKind::ProviderUnavailable),
    ("server_error", ErrorKind::ProviderUnavailable),
    ("timeout", ErrorKind::ProviderUnavailable),
    ("api_error", ErrorKind::ProviderUnavailable),
];

fn by_code(provider: ModelProvider, codes: &[String]) -> Option<ErrorKind> {
    let codes: Vec<String> = codes.iter().map(|c| c.to_ascii_lowercase()).collect();

    let specific = provider_codes(provider);
    let exact = codes.iter().find_map(|code| {
        specific
            .iter()
            .find(|(pattern, _)| code == pattern)
            .map(|(_, kind)| *kind)
    });
    if exact.is_some() {
        return exact;
    }

    codes.iter().find_map(|code| {
        COMMON_CODES
            .iter()
            .find(|(pattern, _)| code.contains(pattern))
            .map(|(_, kind)| *kind)
    })
}

// =============================================================================
// HTTP status
// =============================================================================

fn by_status(status: u16) -> Option<ErrorKind> {
    match status {
        401 | 403 => Some(ErrorKind::Authentication),
        429 => Some(ErrorKind::RateLimit),
        400 | 404 | 413 | 415 | 422 => Some(ErrorKind::InvalidRequest),
        500..=599 => Some(ErrorKind::ProviderUnavailable),
        _ => None,
    }
}

// =============================================================================
// Message patterns
// =============================================================================

const MESSAGE_PATTERNS: &[(&str, ErrorKind)] = &[
    (
        r"(?i)\b(unauthori[sz]ed|forbidden|access denied|authentication|(invalid|incorrect|missing) (api )?key|signature)\b",
        ErrorKind::Authentication,
    ),
    (
        r"(?i)(rate[ _-]?limit|too many requests|quota|throttl)",
        ErrorKind::RateLimit,
    ),
    (
        r"(?i)\b(invalid|not found|not supported|unsupported|context length|too long|malformed)\b",
        ErrorKind::InvalidRequest,
    ),
    (
        r"(?i)(overloaded|unavailable|timed? ?out|connection (refused|reset)|bad gateway|try again later)",
        ErrorKind::ProviderUnavailable,
    ),
];

static MESSAGE_MATCHERS: LazyLock<Vec<(Regex, ErrorKind)>> = LazyLock::new(|| {
    MESSAGE_PATTERNS
        .iter()
        .filter_map(|(pattern, kind)| Regex::new(pattern).ok().map(|re| (re, *kind)))
        .collect()
});

fn by_message(message: &str) -> Option<ErrorKind> {
    MESSAGE_MATCHERS
        .iter()
        .find(|(re, _)| re.is_match(message))
        .map(|(_, kind)| *kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(provider: ModelProvider, error: ProviderError) -> ErrorKind {
        classify(provider, &error)
    }

    #[test]
    fn message_patterns_all_compile() {
        assert_eq!(MESSAGE_MATCHERS.len(), MESSAGE_PATTERNS.len());
    }

    #[test]
    fn openai_invalid_key_is_authentication() {
        let error = ProviderError::http(
            401,
            r#"{"error":{"message":"Incorrect API key provided: sk-***","type":"invalid_request_error","param":null,"code":"invalid_api_key"}}"#,
        );
        assert_eq!(kind(ModelProvider::OpenAI, error), ErrorKind::Authentication);
    }

    #[test]
    fn bare_401_is_authentication() {
        let error = ProviderError::http(401, "401 unauthorized");
        assert_eq!(kind(ModelProvider::OpenAI, error), ErrorKind::Authentication);
    }

    #[test]
    fn missing_key_401_with_generic_type_is_authentication() {
        let error = ProviderError::http(
            401,
            r#"{"error":{"message":"You didn't provide an API key.","type":"invalid_request_error","code":null}}"#,
        );
        assert_eq!(kind(ModelProvider::OpenAI, error), ErrorKind::Authentication);
    }

    #[test]
    fn openai_insufficient_quota_is_rate_limit() {
        let error = ProviderError::http(
            429,
            r#"{"error":{"message":"You exceeded your current quota","type":"insufficient_quota","code":"insufficient_quota"}}"#,
        );
        assert_eq!(kind(ModelProvider::OpenAI, error), ErrorKind::RateLimit);
    }

    #[test]
    fn context_length_is_invalid_request() {
        let error = ProviderError::http(
            400,
            r#"{"error":{"message":"maximum context length is 8192 tokens","type":"invalid_request_error","code":"context_length_exceeded"}}"#,
        );
        assert_eq!(kind(ModelProvider::OpenAI, error), ErrorKind::InvalidRequest);
    }

    #[test]
    fn anthropic_overloaded_is_unavailable() {
        let error = ProviderError::http(
            529,
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        );
        assert_eq!(kind(ModelProvider::Anthropic, error), ErrorKind::ProviderUnavailable);
    }

    #[test]
    fn anthropic_in_band_error_is_classified_by_type() {
        let error = ProviderError::vendor("rate_limit_error", "Number of requests has exceeded your rate limit");
        assert_eq!(kind(ModelProvider::Anthropic, error), ErrorKind::RateLimit);
    }

    #[test]
    fn google_status_and_reason() {
        let error = ProviderError::http(
            400,
            r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT","details":[{"@type":"type.googleapis.com/google.rpc.ErrorInfo","reason":"API_KEY_INVALID"}]}}"#,
        );
        assert_eq!(kind(ModelProvider::Google, error), ErrorKind::Authentication);

        let error = ProviderError::http(
            400,
            r#"{"error":{"code":400,"message":"User location is not supported","status":"FAILED_PRECONDITION"}}"#,
        );
        assert_eq!(kind(ModelProvider::Google, error), ErrorKind::InvalidRequest);
    }

    #[test]
    fn bedrock_exception_types() {
        let cases = [
            ("accessDeniedException", ErrorKind::Authentication),
            ("UnrecognizedClientException", ErrorKind::Authentication),
            ("throttlingException", ErrorKind::RateLimit),
            ("ServiceQuotaExceededException", ErrorKind::RateLimit),
            ("validationException", ErrorKind::InvalidRequest),
            ("ResourceNotFoundException", ErrorKind::InvalidRequest),
            ("modelNotReadyException", ErrorKind::ProviderUnavailable),
            ("internalServerException", ErrorKind::ProviderUnavailable),
            ("modelStreamErrorException", ErrorKind::UnknownProvider),
        ];
        for (exception, expected) in cases {
            let error = ProviderError::vendor(exception, "boom");
            assert_eq!(kind(ModelProvider::Bedrock, error), expected, "{exception}");
        }
    }

    #[test]
    fn bedrock_http_type_header_style() {
        let error = ProviderError::http(
            403,
            r#"{"__type":"com.amazon.coral.service#UnrecognizedClientException","message":"The security token included in the request is invalid."}"#,
        );
        assert_eq!(kind(ModelProvider::Bedrock, error), ErrorKind::Authentication);
    }

    #[test]
    fn zhipu_numeric_codes() {
        let error = ProviderError::http(401, r#"{"error":{"code":"1002","message":"Authorization Token非法"}}"#);
        assert_eq!(kind(ModelProvider::ZhiPu, error), ErrorKind::Authentication);

        let error = ProviderError::http(429, r#"{"error":{"code":"1302","message":"并发数过高"}}"#);
        assert_eq!(kind(ModelProvider::ZhiPu, error), ErrorKind::RateLimit);
    }

    #[test]
    fn vendor_specific_codes_do_not_leak_across_providers() {
        let error = ProviderError::vendor("1302", "busy");
        assert_eq!(kind(ModelProvider::OpenAI, error), ErrorKind::UnknownProvider);
    }

    #[test]
    fn status_table() {
        assert_eq!(kind(ModelProvider::Mistral, ProviderError::http(403, "")), ErrorKind::Authentication);
        assert_eq!(kind(ModelProvider::Mistral, ProviderError::http(429, "")), ErrorKind::RateLimit);
        assert_eq!(kind(ModelProvider::Mistral, ProviderError::http(422, "")), ErrorKind::InvalidRequest);
        assert_eq!(kind(ModelProvider::Mistral, ProviderError::http(503, "")), ErrorKind::ProviderUnavailable);
    }

    #[test]
    fn message_patterns_apply_without_status() {
        let error = ProviderError::vendor("error", "Too many requests, please slow down");
        assert_eq!(kind(ModelProvider::Ollama, error), ErrorKind::RateLimit);
    }

    #[test]
    fn transport_failures() {
        assert_eq!(
            kind(ModelProvider::Ollama, ProviderError::network("connection refused")),
            ErrorKind::ProviderUnavailable
        );
        assert_eq!(
            kind(ModelProvider::OpenAI, ProviderError::timeout("120s")),
            ErrorKind::ProviderUnavailable
        );
        assert_eq!(
            kind(ModelProvider::Bedrock, ProviderError::frame("bad crc")),
            ErrorKind::UnknownProvider
        );
    }

    #[test]
    fn credential_and_model_failures() {
        assert_eq!(
            kind(ModelProvider::Bedrock, ProviderError::invalid_credentials("no access key")),
            ErrorKind::Authentication
        );
        assert_eq!(
            kind(ModelProvider::Bedrock, ProviderError::unsupported_model("cohere.command")),
            ErrorKind::InvalidRequest
        );
    }

    #[test]
    fn unmatched_errors_are_unknown() {
        let error = ProviderError::http(418, "I'm a teapot");
        assert_eq!(kind(ModelProvider::OpenAI, error), ErrorKind::UnknownProvider);
    }

    #[test]
    fn context_keeps_raw_error_untouched() {
        let source = ProviderError::http(401, "401 unauthorized");
        let context = ErrorContext::new(
            "openai",
            ModelProvider::OpenAI,
            Some("https://api.openai.com/v1".to_string()),
        );

        let error = context.error(source.clone());
        assert_eq!(error.kind, ErrorKind::Authentication);
        assert_eq!(error.source, source);
        assert_eq!(error.provider, "openai");
    }
}
