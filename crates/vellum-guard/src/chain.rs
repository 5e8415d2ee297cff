//! The guard chain: one entry point that runs every check in a fixed order.
//!
//! Order is load-bearing: request authentication, then identity, then global
//! permission, then space membership, then the usage gate. Each stage only
//! runs once the previous one passed, so a usage rejection already implies an
//! authenticated member with the right permission. Usage is recorded
//! separately, after the handler reports success.

use std::sync::Arc;

use chrono::Utc;
use vellum_storage::{ActionKind, Membership, Principal, Space, SpaceId, SpaceRole, SpaceStatus, Store};

use crate::config::GuardConfig;
use crate::error::GuardError;
use crate::identity::PrincipalProvider;
use crate::permissions::{Permission, PermissionRegistry};
use crate::request::SignedRequestParts;
use crate::signing::RequestAuthenticator;
use crate::space::SpaceAuthorizer;
use crate::usage::{LimitTable, UsageBackfill, UsageMeter};

/// Space requirement of an endpoint.
#[derive(Clone, Debug, Default)]
pub enum SpaceRule {
    /// Endpoint is not space-scoped.
    #[default]
    None,
    /// Any active membership in the resolved space suffices.
    Required,
    /// Membership role must be one of the listed roles.
    RequiredWithRoles(Vec<SpaceRole>),
}

/// Declarative description of what an endpoint demands from a caller.
#[derive(Clone, Debug, Default)]
pub struct GuardRequirement {
    permission: Option<Permission>,
    space: SpaceRule,
    action: Option<ActionKind>,
}

impl GuardRequirement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn permission(mut self, permission: Permission) -> Self {
        self.permission = Some(permission);
        self
    }

    pub fn space(mut self) -> Self {
        self.space = SpaceRule::Required;
        self
    }

    pub fn space_roles(mut self, roles: impl Into<Vec<SpaceRole>>) -> Self {
        self.space = SpaceRule::RequiredWithRoles(roles.into());
        self
    }

    /// Gate this endpoint on the daily counter for `action`.
    pub fn metered(mut self, action: ActionKind) -> Self {
        self.action = Some(action);
        self
    }
}

/// What the chain established about the caller. Handed to the handler so it
/// never re-derives identity or tenancy on its own.
#[derive(Clone, Debug)]
pub struct AuthorizationContext {
    pub principal: Principal,
    pub space_id: Option<SpaceId>,
    pub membership: Option<Membership>,
}

/// The assembled guard chain.
pub struct Gatekeeper {
    authenticator: RequestAuthenticator,
    provider: Arc<dyn PrincipalProvider>,
    registry: PermissionRegistry,
    spaces: SpaceAuthorizer,
    meter: UsageMeter,
}

impl Gatekeeper {
    pub fn new(
        config: &GuardConfig,
        store: Arc<dyn Store>,
        provider: Arc<dyn PrincipalProvider>,
    ) -> Self {
        Self {
            authenticator: RequestAuthenticator::new(config),
            provider,
            registry: PermissionRegistry::new(),
            spaces: SpaceAuthorizer::new(store.clone()),
            meter: UsageMeter::new(store),
        }
    }

    pub fn with_limits(mut self, limits: LimitTable) -> Self {
        self.meter = self.meter.with_limits(limits);
        self
    }

    pub fn with_backfill(mut self, backfill: Arc<dyn UsageBackfill>) -> Self {
        self.meter = self.meter.with_backfill(backfill);
        self
    }

    pub fn registry(&self) -> &PermissionRegistry {
        &self.registry
    }

    pub fn meter(&self) -> &UsageMeter {
        &self.meter
    }

    /// Run the full chain. Returns the established context or the first
    /// rejection; later stages are never reached after a failure.
    pub async fn authorize(
        &self,
        req: &SignedRequestParts,
        requirement: &GuardRequirement,
    ) -> Result<AuthorizationContext, GuardError> {
        self.authorize_at(req, requirement, Utc::now().timestamp_millis())
            .await
    }

    /// Same as [`authorize`](Self::authorize) with the clock injected.
    pub async fn authorize_at(
        &self,
        req: &SignedRequestParts,
        requirement: &GuardRequirement,
        now_ms: i64,
    ) -> Result<AuthorizationContext, GuardError> {
        if !self.authenticator.is_exempt(req.path()) {
            self.authenticator.verify(req, now_ms)?;
        }

        let principal = self.provider.resolve(req).await?;

        if let Some(permission) = requirement.permission {
            if !self.registry.has_permission(principal.role, permission) {
                return Err(GuardError::Forbidden);
            }
        }

        let (space_id, membership) = match &requirement.space {
            SpaceRule::None => (None, None),
            SpaceRule::Required => {
                let space_id = self.spaces.resolve_space(req, &principal).await?;
                let membership = self
                    .spaces
                    .require_membership(&space_id, &principal, None)
                    .await?;
                (Some(space_id), Some(membership))
            }
            SpaceRule::RequiredWithRoles(roles) => {
                let space_id = self.spaces.resolve_space(req, &principal).await?;
                let membership = self
                    .spaces
                    .require_membership(&space_id, &principal, Some(roles))
                    .await?;
                (Some(space_id), Some(membership))
            }
        };

        if let Some(action) = requirement.action {
            self.meter.check(&principal, action).await?;
        }

        Ok(AuthorizationContext {
            principal,
            space_id,
            membership,
        })
    }

    /// Report a successful metered action so the counter advances. Handlers
    /// call this after their own work committed; failed handlers never do.
    pub async fn record_success(
        &self,
        ctx: &AuthorizationContext,
        action: ActionKind,
        amount: i64,
        estimated_cost: f64,
    ) -> Result<i64, GuardError> {
        self.meter
            .record(&ctx.principal.id, action, amount, estimated_cost)
            .await
    }

    /// Administrative space status transition, permission-checked against the
    /// acting principal.
    pub async fn transition_space_status(
        &self,
        actor: &Principal,
        space_id: &SpaceId,
        new_status: SpaceStatus,
    ) -> Result<Space, GuardError> {
        self.spaces
            .transition_status(actor, &self.registry, space_id, new_status)
            .await
    }
}
