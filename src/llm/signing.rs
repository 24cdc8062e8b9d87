//! SHA-256 digests and HMAC for AWS SigV4.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use super::error::ProviderError;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 of `data` under `key`.
///
/// # Errors
///
/// Returns an invalid-credentials error if the MAC rejects the key.
pub(crate) fn mac_sha256(key: &[u8], data: &[u8]) -> Result<[u8; 32], ProviderError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| ProviderError::invalid_credentials(format!("cannot sign request: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

/// Lowercase hex SHA-256 of `data`.
#[must_use]
pub(crate) fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
