//! HMAC helpers for Stripe webhook verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute HMAC-SHA256 and return the hex-encoded digest (64 characters).
///
/// Returns `None` only if the HMAC implementation rejects the key, which
/// HMAC-SHA256 never does for any key length.
#[must_use]
pub fn hmac_sha256_hex(secret: &str, message: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(message.as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time string comparison.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

/// A parsed `Stripe-Signature` header: `t=<unix>,v1=<hex>[,v1=<hex>...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader<'a> {
    /// Signing timestamp (unix seconds).
    pub timestamp: i64,
    /// Candidate `v1` signatures.
    pub signatures: Vec<&'a str>,
}

impl<'a> SignatureHeader<'a> {
    /// Parse a header value. Unknown schemes are ignored.
    #[must_use]
    pub fn parse(header: &'a str) -> Option<Self> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", ts)) => timestamp = ts.parse().ok(),
                Some(("v1", sig)) => signatures.push(sig),
                _ => {}
            }
        }

        let timestamp = timestamp?;
        if signatures.is_empty() {
            return None;
        }
        Some(Self {
            timestamp,
            signatures,
        })
    }

    /// Whether any `v1` signature matches `payload` under `secret`, and the
    /// timestamp is within `tolerance_secs` of `now`.
    #[must_use]
    pub fn verify(&self, payload: &str, secret: &str, now: i64, tolerance_secs: i64) -> bool {
        if (now - self.timestamp).abs() > tolerance_secs {
            return false;
        }
        let Some(expected) = hmac_sha256_hex(secret, &format!("{}.{payload}", self.timestamp))
        else {
            return false;
        };
        self.signatures
            .iter()
            .any(|sig| constant_time_eq(&expected, sig))
    }
}
