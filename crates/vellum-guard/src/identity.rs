//! Identity resolution: mapping an authenticated request to a Principal.
//!
//! A [`PrincipalProvider`] is selected once at process start via
//! configuration; request-path code never branches on which strategy is
//! active. Both strategies go through the store's idempotent upsert so a
//! resolved principal is always a real row and downstream membership/usage
//! lookups stay consistent.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use vellum_storage::{Principal, Role, Store, StoreError, UpsertPrincipalParams};

use crate::config::{ConfigError, GuardConfig};
use crate::error::GuardError;
use crate::request::SignedRequestParts;

/// Resolves an authenticated request to a canonical principal.
#[async_trait]
pub trait PrincipalProvider: Send + Sync {
    async fn resolve(&self, req: &SignedRequestParts) -> Result<Principal, GuardError>;
}

/// External session store: maps an established session token to the subject
/// (email) it was issued for. Credential issuance itself is out of scope.
#[async_trait]
pub trait SessionLookup: Send + Sync {
    async fn subject_for_token(&self, token: &str) -> Result<Option<String>, GuardError>;
}

/// Production strategy: session token → subject → principal row.
pub struct SessionPrincipalProvider {
    sessions: Arc<dyn SessionLookup>,
    store: Arc<dyn Store>,
}

impl SessionPrincipalProvider {
    pub fn new(sessions: Arc<dyn SessionLookup>, store: Arc<dyn Store>) -> Self {
        Self { sessions, store }
    }
}

#[async_trait]
impl PrincipalProvider for SessionPrincipalProvider {
    async fn resolve(&self, req: &SignedRequestParts) -> Result<Principal, GuardError> {
        let token = req
            .session_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(GuardError::Unauthorized)?;

        let subject = self
            .sessions
            .subject_for_token(token)
            .await?
            .ok_or(GuardError::Unauthorized)?;

        upsert_subject(self.store.as_ref(), &subject).await
    }
}

/// Bootstrap/test strategy: explicit `x-identity-override` header.
///
/// Only constructible when the configuration flag is set, so it cannot leak
/// into a production deployment by accident. Still resolves to a real store
/// row, never a fabricated principal.
pub struct OverridePrincipalProvider {
    store: Arc<dyn Store>,
}

impl OverridePrincipalProvider {
    pub fn new(store: Arc<dyn Store>, config: &GuardConfig) -> Result<Self, ConfigError> {
        if !config.identity_override_enabled {
            return Err(ConfigError::IdentityOverrideDisabled);
        }
        Ok(Self { store })
    }
}

#[async_trait]
impl PrincipalProvider for OverridePrincipalProvider {
    async fn resolve(&self, req: &SignedRequestParts) -> Result<Principal, GuardError> {
        let subject = req
            .identity_override
            .as_deref()
            .ok_or(GuardError::Unauthorized)?;

        if subject.is_empty() || !subject.contains('@') || subject.contains(char::is_whitespace) {
            return Err(GuardError::BadRequest(format!(
                "malformed identity override: {:?}",
                subject
            )));
        }

        upsert_subject(self.store.as_ref(), subject).await
    }
}

/// Lazily create the principal on first resolution; existing rows keep their
/// stored role.
async fn upsert_subject(store: &dyn Store, subject: &str) -> Result<Principal, GuardError> {
    let email = subject.to_lowercase();
    match store
        .upsert_principal(&UpsertPrincipalParams {
            email: email.clone(),
            role: Role::User,
        })
        .await
    {
        Ok(principal) => Ok(principal),
        Err(StoreError::NotFound) => {
            debug!(email, "identity upsert reported missing principal");
            Err(GuardError::Unauthorized)
        }
        Err(e) => Err(e.into()),
    }
}
