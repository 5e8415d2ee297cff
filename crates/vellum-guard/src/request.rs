//! The wire contract for a signed request, decoupled from any HTTP framework.

/// Public app key identifying the signing client.
pub const APP_KEY_HEADER: &str = "x-app-key";
/// Request timestamp in epoch milliseconds.
pub const TIMESTAMP_HEADER: &str = "x-app-timestamp";
/// Hex-encoded HMAC-SHA256 over the canonical payload.
pub const SIGNATURE_HEADER: &str = "x-app-signature";
/// Explicit tenant selection header; takes precedence over the query param.
pub const SPACE_HEADER: &str = "x-space-id";
/// Explicit tenant selection query parameter.
pub const SPACE_QUERY_PARAM: &str = "spaceId";
/// Session token header for the production identity strategy.
pub const SESSION_HEADER: &str = "x-session-token";
/// Test-only identity override header; honored only when the override
/// provider is configured.
pub const IDENTITY_OVERRIDE_HEADER: &str = "x-identity-override";

/// Everything the guard chain needs from an incoming request.
///
/// Built once per request by the HTTP layer; not persisted.
#[derive(Clone, Debug, Default)]
pub struct SignedRequestParts {
    /// HTTP method as received (canonicalized to uppercase when signing).
    pub method: String,
    /// Path plus raw query string, e.g. `/v1/records?spaceId=abc`.
    pub path_and_query: String,
    /// `x-app-timestamp`, parsed.
    pub timestamp_ms: Option<i64>,
    /// Raw request body; empty for bodyless methods.
    pub body: Vec<u8>,
    pub app_key: Option<String>,
    pub signature: Option<String>,
    pub origin: Option<String>,
    pub referer: Option<String>,
    pub space_header: Option<String>,
    pub session_token: Option<String>,
    pub identity_override: Option<String>,
}

impl SignedRequestParts {
    /// Path without the query string.
    pub fn path(&self) -> &str {
        match self.path_and_query.split_once('?') {
            Some((path, _)) => path,
            None => &self.path_and_query,
        }
    }

    /// First value of a raw query parameter, if present.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        let (_, query) = self.path_and_query.split_once('?')?;
        query.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k == name).then_some(v)
        })
    }

    /// Tenant hint: the `x-space-id` header wins over the `spaceId` query
    /// parameter.
    pub fn space_hint(&self) -> Option<&str> {
        self.space_header
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.query_param(SPACE_QUERY_PARAM).filter(|s| !s.is_empty()))
    }
}
