//! `X-Hub-Signature-256` verification.
//!
//! GitHub signs the raw request body with HMAC-SHA256 using the webhook
//! secret and sends `sha256=<hex>`. Verification happens before the body is
//! parsed.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const PREFIX: &str = "sha256=";

/// Decode the hex digest out of a `sha256=<hex>` header value.
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    hex::decode(header.strip_prefix(PREFIX)?).ok()
}

/// HMAC-SHA256 of `payload` under `secret`.
pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret)
        .expect("HMAC accepts keys of any length");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

pub fn format_signature_header(signature: &[u8]) -> String {
    format!("{PREFIX}{}", hex::encode(signature))
}

/// Sign `payload` and format the header GitHub would send.
pub fn sign(payload: &[u8], secret: &[u8]) -> String {
    format_signature_header(&compute_signature(payload, secret))
}

/// True if `header` is a valid signature of `payload` under `secret`.
///
/// The digest comparison is constant-time. Malformed headers are simply
/// invalid.
pub fn verify_signature(payload: &[u8], header: &str, secret: &[u8]) -> bool {
    let Some(expected) = parse_signature_header(header) else {
        return false;
    };
    let Ok(mut mac) = <HmacSha256 as Mac>::new_from_slice(secret) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}
