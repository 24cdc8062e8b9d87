//! Shared HTTP plumbing for the adapters.

use futures::StreamExt;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::client::{AdapterResponse, VendorStream};
use super::error::ProviderError;
use crate::stream::{ByteStream, ChunkShape, Framing};

/// An HTTP client whose construction cannot fail.
///
/// Building a `reqwest::Client` can fail (TLS backend initialization); the
/// failure is kept and reported by the first request instead.
#[derive(Debug, Clone)]
pub(crate) struct HttpClient {
    client: Result<Client, String>,
    timeout: Duration,
}

impl HttpClient {
    pub(crate) fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| format!("failed to create HTTP client: {}", e));
        Self { client, timeout }
    }

    /// Starts a JSON POST request.
    ///
    /// Single-shot requests get the configured timeout for the whole
    /// exchange; streaming requests are only bounded while connecting.
    pub(crate) fn post(&self, url: &str, streaming: bool) -> Result<RequestBuilder, ProviderError> {
        let client = self
            .client
            .as_ref()
            .map_err(|reason| ProviderError::network(reason.clone()))?;

        let request = client.post(url).header("content-type", "application/json");
        Ok(if streaming {
            request
        } else {
            request.timeout(self.timeout)
        })
    }
}

/// Sends `request`, turning transport failures and non-success statuses
/// into provider errors.
pub(crate) async fn send(request: RequestBuilder) -> Result<Response, ProviderError> {
    let response = request.send().await.map_err(transport_error)?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().await.unwrap_or_default();

    debug!(status = status.as_u16(), "provider returned error status");
    Err(ProviderError::http(status.as_u16(), body).with_retry_after(retry_after))
}

/// Wraps a successful response as the adapter's answer.
pub(crate) async fn respond(
    response: Response,
    streaming: bool,
    framing: Framing,
    shape: ChunkShape,
) -> Result<AdapterResponse, ProviderError> {
    if streaming {
        return Ok(AdapterResponse::Stream(VendorStream::new(
            framing,
            shape,
            body_stream(response),
        )));
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| ProviderError::parse(format!("failed to parse response: {}", e)))?;
    Ok(AdapterResponse::Completion { shape, body })
}

fn body_stream(response: Response) -> ByteStream {
    Box::pin(response.bytes_stream().map(|read| {
        read.map_err(|e| {
            if e.is_timeout() {
                ProviderError::timeout(e.to_string())
            } else {
                ProviderError::stream(e.to_string())
            }
        })
    }))
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::timeout(e.to_string())
    } else {
        ProviderError::network(format!("request failed: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction_never_fails() {
        let client = HttpClient::new(Duration::from_secs(5));
        assert!(client.post("http://127.0.0.1:1/never", false).is_ok());
    }

    #[test]
    fn failed_client_surfaces_at_request_time() {
        let client = HttpClient {
            client: Err("no TLS backend".to_string()),
            timeout: Duration::from_secs(1),
        };
        let error = client.post("https://example.invalid", true).unwrap_err();
        assert_eq!(error, ProviderError::network("no TLS backend"));
    }
}
