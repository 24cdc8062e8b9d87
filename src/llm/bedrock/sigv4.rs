//! AWS Signature Version 4 request signing.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::llm::error::ProviderError;
use crate::llm::signing::{mac_sha256, sha256_hex};

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Long-lived or temporary AWS credentials.
#[derive(Clone, PartialEq, Eq)]
pub(crate) struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

/// Headers to attach to a signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SignedHeaders {
    pub authorization: String,
    pub amz_date: String,
    pub security_token: Option<String>,
}

/// Signs one request for `service` in `region`.
#[derive(Debug, Clone)]
pub(crate) struct Signer<'a> {
    pub credentials: &'a AwsCredentials,
    pub region: &'a str,
    pub service: &'a str,
}

/// The parts of a request covered by the signature.
#[derive(Debug, Clone)]
pub(crate) struct CanonicalParts<'a> {
    pub method: &'a str,
    /// Path exactly as it will be sent, already percent-encoded
    pub path: &'a str,
    pub query: Option<&'a str>,
    /// Lowercase header name to value; must include `host`
    pub headers: BTreeMap<String, String>,
    pub payload: &'a [u8],
}

impl Signer<'_> {
    /// Signs a JSON POST to `host` + `path` at `now`.
    ///
    /// # Errors
    ///
    /// Returns an invalid-credentials error if the secret cannot key the MAC.
    pub(crate) fn sign_json_post(
        &self,
        host: &str,
        path: &str,
        payload: &[u8],
        now: DateTime<Utc>,
    ) -> Result<SignedHeaders, ProviderError> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        headers.insert("host".to_string(), host.to_string());
        headers.insert("x-amz-date".to_string(), amz_date.clone());
        if let Some(token) = &self.credentials.session_token {
            headers.insert("x-amz-security-token".to_string(), token.clone());
        }

        let parts = CanonicalParts {
            method: "POST",
            path,
            query: None,
            headers,
            payload,
        };

        Ok(SignedHeaders {
            authorization: self.authorization(&parts, &amz_date)?,
            amz_date,
            security_token: self.credentials.session_token.clone(),
        })
    }

    /// Computes the `Authorization` header value for `parts` at `amz_date`.
    pub(crate) fn authorization(
        &self,
        parts: &CanonicalParts<'_>,
        amz_date: &str,
    ) -> Result<String, ProviderError> {
        let date = &amz_date[..amz_date.len().min(8)];
        let scope = format!("{}/{}/{}/aws4_request", date, self.region, self.service);

        let (canonical, signed_headers) = canonical_request(parts);
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            amz_date,
            scope,
            sha256_hex(canonical.as_bytes())
        );

        let key = signing_key(
            &self.credentials.secret_access_key,
            date,
            self.region,
            self.service,
        )?;
        let signature = hex::encode(mac_sha256(&key, string_to_sign.as_bytes())?);

        Ok(format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, self.credentials.access_key_id, scope, signed_headers, signature
        ))
    }
}

/// Derives the per-day signing key.
pub(crate) fn signing_key(
    secret: &str,
    date: &str,
    region: &str,
    service: &str,
) -> Result<[u8; 32], ProviderError> {
    let k_date = mac_sha256(format!("AWS4{}", secret).as_bytes(), date.as_bytes())?;
    let k_region = mac_sha256(&k_date, region.as_bytes())?;
    let k_service = mac_sha256(&k_region, service.as_bytes())?;
    mac_sha256(&k_service, b"aws4_request")
}

/// Returns the canonical request and its signed-headers list.
fn canonical_request(parts: &CanonicalParts<'_>) -> (String, String) {
    let canonical_headers: String = parts
        .headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value.trim()))
        .collect();
    let signed_headers = parts
        .headers
        .keys()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(";");

    let canonical = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        parts.method,
        canonical_uri(parts.path),
        canonical_query(parts.query),
        canonical_headers,
        signed_headers,
        sha256_hex(parts.payload)
    );
    (canonical, signed_headers)
}

/// Non-S3 services sign each path segment encoded once more.
fn canonical_uri(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn canonical_query(query: Option<&str>) -> String {
    let Some(query) = query.filter(|q| !q.is_empty()) else {
        return String::new();
    };

    let mut pairs: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| {
            (
                urlencoding::encode(&k).into_owned(),
                urlencoding::encode(&v).into_owned(),
            )
        })
        .collect();
    pairs.sort();
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}
