//! Request authentication: HMAC signature and freshness verification.
//!
//! Pure and stateless; one pass per request, no retries, no side effects.
//! Every failure collapses into the same generic [`GuardError::Forbidden`] so
//! callers cannot use the response as an oracle for which check failed. The
//! specific cause is only ever logged at debug level.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

use crate::error::GuardError;
use crate::request::SignedRequestParts;
use crate::GuardConfig;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age (and future skew) of a signed request, in milliseconds.
pub const REPLAY_WINDOW_MS: i64 = 5 * 60 * 1000;

/// Verifies a request's signature and freshness before anything else runs.
pub struct RequestAuthenticator {
    app_key: String,
    secret: Vec<u8>,
    allowed_origins: Option<Vec<String>>,
    exempt_paths: Vec<String>,
}

impl RequestAuthenticator {
    pub fn new(config: &GuardConfig) -> Self {
        Self {
            app_key: config.app_key.clone(),
            secret: config.app_secret.as_bytes().to_vec(),
            allowed_origins: config.allowed_origins.clone(),
            exempt_paths: config.exempt_paths.clone(),
        }
    }

    /// Canonical payload: `"{METHOD}|{PATH}{QUERY}|{TIMESTAMP}|{BODY}"`,
    /// uppercase method, raw query string, raw body (empty for bodyless
    /// methods).
    pub fn canonical_payload(
        method: &str,
        path_and_query: &str,
        timestamp_ms: i64,
        body: &[u8],
    ) -> Vec<u8> {
        let mut payload = Vec::with_capacity(method.len() + path_and_query.len() + body.len() + 24);
        payload.extend_from_slice(method.to_uppercase().as_bytes());
        payload.push(b'|');
        payload.extend_from_slice(path_and_query.as_bytes());
        payload.push(b'|');
        payload.extend_from_slice(timestamp_ms.to_string().as_bytes());
        payload.push(b'|');
        payload.extend_from_slice(body);
        payload
    }

    /// Hex HMAC-SHA256 over the canonical payload. Used by clients and tests
    /// to produce valid signatures.
    pub fn sign(&self, method: &str, path_and_query: &str, timestamp_ms: i64, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC accepts keys of any length");
        mac.update(&Self::canonical_payload(
            method,
            path_and_query,
            timestamp_ms,
            body,
        ));
        hex::encode(mac.finalize().into_bytes())
    }

    /// Whether a path bypasses request authentication entirely.
    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths.iter().any(|p| p == path)
    }

    /// Accept or reject a request. `now_ms` is injected for testability.
    pub fn verify(&self, req: &SignedRequestParts, now_ms: i64) -> Result<(), GuardError> {
        let app_key = req.app_key.as_deref().unwrap_or_default();
        if app_key != self.app_key {
            debug!(path = req.path(), "request rejected: app key mismatch");
            return Err(GuardError::Forbidden);
        }

        let timestamp_ms = match req.timestamp_ms {
            Some(ts) => ts,
            None => {
                debug!(path = req.path(), "request rejected: missing timestamp");
                return Err(GuardError::Forbidden);
            }
        };
        if (now_ms - timestamp_ms).abs() > REPLAY_WINDOW_MS {
            debug!(
                path = req.path(),
                age_ms = now_ms - timestamp_ms,
                "request rejected: timestamp outside replay window"
            );
            return Err(GuardError::Forbidden);
        }

        let supplied = match req.signature.as_deref().map(hex::decode) {
            Some(Ok(bytes)) => bytes,
            _ => {
                debug!(path = req.path(), "request rejected: missing or malformed signature");
                return Err(GuardError::Forbidden);
            }
        };

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .expect("HMAC accepts keys of any length");
        mac.update(&Self::canonical_payload(
            &req.method,
            &req.path_and_query,
            timestamp_ms,
            &req.body,
        ));
        if mac.verify_slice(&supplied).is_err() {
            debug!(path = req.path(), "request rejected: signature mismatch");
            return Err(GuardError::Forbidden);
        }

        if let Some(allowed) = &self.allowed_origins {
            // Origin is a bare scheme://host[:port] and must match exactly;
            // Referer carries a path, so a list entry only matches up to a
            // path boundary.
            let origin_ok = req
                .origin
                .as_deref()
                .map(|h| allowed.iter().any(|a| h == a))
                .unwrap_or(false);
            let referer_ok = req
                .referer
                .as_deref()
                .map(|h| allowed.iter().any(|a| referer_matches(h, a)))
                .unwrap_or(false);
            if !origin_ok && !referer_ok {
                debug!(path = req.path(), "request rejected: origin not allowed");
                return Err(GuardError::Forbidden);
            }
        }

        Ok(())
    }
}

/// `https://app.example` matches itself, `https://app.example/records`,
/// `https://app.example?x=1` but never `https://app.exampleevil.com`.
fn referer_matches(referer: &str, allowed: &str) -> bool {
    match referer.strip_prefix(allowed) {
        Some("") => true,
        Some(rest) => rest.starts_with('/') || rest.starts_with('?'),
        None => false,
    }
}
