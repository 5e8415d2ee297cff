//! Guard configuration, read once at startup.
//!
//! Environment variables:
//!
//! ```bash
//! VELLUM_APP_KEY=pub_key_id            # public key id clients send
//! VELLUM_APP_SECRET=...                # HMAC-SHA256 secret (server-held)
//! VELLUM_ALLOWED_ORIGINS=https://a.example,https://b.example   # optional
//! VELLUM_EXEMPT_PATHS=/v1/healthz      # optional, comma-separated
//! VELLUM_IDENTITY_OVERRIDE=true        # test-only identity strategy
//! ```

use std::env;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not set")]
    MissingVar(&'static str),

    #[error("{0} must not be empty")]
    EmptyVar(&'static str),

    #[error("identity override provider requested but VELLUM_IDENTITY_OVERRIDE is not enabled")]
    IdentityOverrideDisabled,
}

/// Immutable guard configuration.
#[derive(Clone, Debug)]
pub struct GuardConfig {
    /// Public app key clients must send in `x-app-key`.
    pub app_key: String,
    /// Server-held HMAC secret.
    pub app_secret: String,
    /// When set, Origin or Referer must start with one of these entries.
    pub allowed_origins: Option<Vec<String>>,
    /// Paths that bypass request authentication entirely. Static by design:
    /// exemptions are enumerated, never inferred.
    pub exempt_paths: Vec<String>,
    /// Enables the test-only identity override provider.
    pub identity_override_enabled: bool,
}

impl GuardConfig {
    /// Minimal config with no origin allow-list, no exemptions and the
    /// production identity strategy.
    pub fn new(app_key: impl Into<String>, app_secret: impl Into<String>) -> Self {
        Self {
            app_key: app_key.into(),
            app_secret: app_secret.into(),
            allowed_origins: None,
            exempt_paths: Vec::new(),
            identity_override_enabled: false,
        }
    }

    /// Load from `VELLUM_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let app_key = require("VELLUM_APP_KEY")?;
        let app_secret = require("VELLUM_APP_SECRET")?;

        let allowed_origins = env::var("VELLUM_ALLOWED_ORIGINS")
            .ok()
            .map(|v| split_csv(&v))
            .filter(|v| !v.is_empty());

        let exempt_paths = env::var("VELLUM_EXEMPT_PATHS")
            .ok()
            .map(|v| split_csv(&v))
            .unwrap_or_default();

        let identity_override_enabled = env::var("VELLUM_IDENTITY_OVERRIDE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Ok(Self {
            app_key,
            app_secret,
            allowed_origins,
            exempt_paths,
            identity_override_enabled,
        })
    }

    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = Some(origins);
        self
    }

    pub fn with_exempt_paths(mut self, paths: Vec<String>) -> Self {
        self.exempt_paths = paths;
        self
    }

    pub fn with_identity_override(mut self, enabled: bool) -> Self {
        self.identity_override_enabled = enabled;
        self
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    let value = env::var(name).map_err(|_| ConfigError::MissingVar(name))?;
    if value.is_empty() {
        return Err(ConfigError::EmptyVar(name));
    }
    Ok(value)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_defaults() {
        let config = GuardConfig::new("key", "secret");
        assert_eq!(config.app_key, "key");
        assert!(config.allowed_origins.is_none());
        assert!(config.exempt_paths.is_empty());
        assert!(!config.identity_override_enabled);
    }

    #[test]
    fn test_builders() {
        let config = GuardConfig::new("key", "secret")
            .with_allowed_origins(vec!["https://app.example".into()])
            .with_exempt_paths(vec!["/v1/healthz".into()])
            .with_identity_override(true);
        assert_eq!(config.allowed_origins.as_deref().unwrap().len(), 1);
        assert_eq!(config.exempt_paths, vec!["/v1/healthz"]);
        assert!(config.identity_override_enabled);
    }

    #[test]
    fn test_split_csv_trims_and_drops_empties() {
        assert_eq!(
            split_csv(" a , b ,, c "),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
        assert!(split_csv(" , ").is_empty());
    }
}
