//! HMAC-SHA256 signing for outbound deliveries and inbound verification.
//!
//! Signatures are lowercase hex over the exact bytes of the serialized JSON
//! body. `serde_json` object keys are ordered, so a given [`Value`] always
//! serializes to the same bytes.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::CoreError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the outbound signature.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Prefix on the signature header value.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Serialize a payload to the bytes that are signed and sent.
pub fn canonical_bytes(payload: &Value) -> Result<Vec<u8>, CoreError> {
    serde_json::to_vec(payload)
        .map_err(|e| CoreError::Internal(format!("Failed to serialize payload: {e}")))
}

/// Hex HMAC-SHA256 of raw bytes.
pub fn sign_bytes(body: &[u8], secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Hex HMAC-SHA256 of a payload's serialized form.
pub fn sign(payload: &Value, secret: &str) -> Result<String, CoreError> {
    Ok(sign_bytes(&canonical_bytes(payload)?, secret))
}

/// Value for the [`SIGNATURE_HEADER`] header.
pub fn signature_header_value(signature: &str) -> String {
    format!("{SIGNATURE_PREFIX}{signature}")
}

/// Constant-time verification of raw bytes. The `sha256=` prefix is optional.
pub fn verify_bytes(body: &[u8], signature: &str, secret: &str) -> bool {
    let provided = signature
        .trim()
        .strip_prefix(SIGNATURE_PREFIX)
        .unwrap_or(signature.trim())
        .to_ascii_lowercase();
    let expected = sign_bytes(body, secret);
    if provided.len() != expected.len() {
        return false;
    }
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Constant-time verification of a payload's serialized form.
pub fn verify(payload: &Value, signature: &str, secret: &str) -> bool {
    match canonical_bytes(payload) {
        Ok(bytes) => verify_bytes(&bytes, signature, secret),
        Err(_) => false,
    }
}
