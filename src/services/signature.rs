//! Optional HMAC request-signature verification.
//!
//! Callers who opt in send `X-Signature` and `X-Timestamp` headers. The
//! signature is HMAC-SHA256 over the concatenation
//! `timestamp || method || path || body` (body empty for GET), keyed with the
//! caller's own API key, hex-encoded, and compared with exact equality.
//!
//! This check is entirely stateless and side-effect free. The gate runs it
//! before any quota accounting so a forged request can never erode a victim's
//! quota.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Replay window: a timestamp more than 5 minutes from now, in either
/// direction, is rejected. Clients running ahead are as invalid as clients
/// running behind.
pub const REPLAY_WINDOW_MS: i64 = 300_000;

/// Why a signed request was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureError {
    /// Signature or timestamp header absent
    Missing,
    /// Timestamp outside the replay window (or unparsable)
    TimestampExpired,
    /// Computed digest differs from the supplied signature
    Mismatch,
}

/// The pieces of a request covered by its signature.
#[derive(Debug, Clone, Copy)]
pub struct SignedRequest<'a> {
    pub method: &'a str,
    pub path: &'a str,
    /// Raw request body; empty string for body-less methods
    pub body: &'a str,
    pub timestamp: Option<&'a str>,
    pub signature: Option<&'a str>,
}

/// Verify a signed request against the caller's API key.
///
/// `now_ms` is milliseconds since the Unix epoch from the injected clock.
pub fn verify(secret: &str, req: &SignedRequest<'_>, now_ms: i64) -> Result<(), SignatureError> {
    let (Some(timestamp), Some(signature)) = (req.timestamp, req.signature) else {
        return Err(SignatureError::Missing);
    };

    // An unparsable timestamp cannot be within the window.
    let request_ms: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::TimestampExpired)?;

    if (now_ms - request_ms).abs() > REPLAY_WINDOW_MS {
        return Err(SignatureError::TimestampExpired);
    }

    let expected = sign(secret, timestamp, req.method, req.path, req.body);

    if expected != signature {
        return Err(SignatureError::Mismatch);
    }

    Ok(())
}

/// Compute the hex HMAC-SHA256 digest clients are expected to send.
pub fn sign(secret: &str, timestamp: &str, method: &str, path: &str, body: &str) -> String {
    // HMAC accepts keys of any length, so this cannot fail
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(timestamp.as_bytes());
    mac.update(method.as_bytes());
    mac.update(path.as_bytes());
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
