//! Coinbase Exchange request signing.
//!
//! The signature is HMAC-SHA256 over `timestamp + METHOD + path + body`,
//! keyed by the base64-decoded API secret and sent base64-encoded in the
//! `CB-ACCESS-SIGN` header.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Sign one request. `path` includes any query string.
pub fn sign(secret_b64: &str, timestamp: &str, method: &str, path: &str, body: &str) -> Result<String> {
    let key = STANDARD
        .decode(secret_b64.trim())
        .context("API secret is not valid base64")?;
    let mut mac = HmacSha256::new_from_slice(&key)
        .map_err(|e| anyhow::anyhow!("Invalid HMAC key: {e}"))?;
    mac.update(timestamp.as_bytes());
    mac.update(method.to_uppercase().as_bytes());
    mac.update(path.as_bytes());
    mac.update(body.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}
