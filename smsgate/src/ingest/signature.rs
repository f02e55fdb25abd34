//! Webhook body signature verification.
//!
//! Senders sign the exact raw request body with HMAC-SHA256 using the shared
//! webhook secret and send the lowercase hex digest in the `X-Signature` header.

use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Compute the lowercase hex HMAC-SHA256 of `body` under `secret`.
pub fn sign(secret: &str, body: &[u8]) -> Result<String, InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a webhook body signature.
///
/// # Arguments
///
/// * `secret` - The shared webhook secret
/// * `raw_body` - The request body exactly as received, before any parsing
/// * `signature` - The value of the `X-Signature` header
///
/// # Returns
///
/// `true` only if `signature` equals the expected lowercase hex digest.
pub fn verify(secret: &str, raw_body: &[u8], signature: &str) -> bool {
    if signature.is_empty() {
        return false;
    }

    // HMAC accepts keys of any length.
    let Ok(expected_signature) = sign(secret, raw_body) else {
        return false;
    };

    // Constant-time comparison to prevent timing attacks
    constant_time_compare(&expected_signature, signature)
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
