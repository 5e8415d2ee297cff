//! Tenant (space) resolution, membership authorization and status
//! transitions.

use std::sync::Arc;

use tracing::debug;
use vellum_storage::{
    Membership, Principal, Space, SpaceId, SpaceRole, SpaceStatus, Store, StoreError,
};

use crate::error::GuardError;
use crate::permissions::{Permission, PermissionRegistry};
use crate::request::SignedRequestParts;

/// Resolves the effective space for a request and verifies membership.
///
/// Membership is re-verified server-side on every request; whatever tenant id
/// the client remembers is only ever a hint.
pub struct SpaceAuthorizer {
    store: Arc<dyn Store>,
}

impl SpaceAuthorizer {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Resolve the effective space id. First match wins:
    ///
    /// 1. explicit id from the `x-space-id` header or `spaceId` query param;
    /// 2. the same value reinterpreted as a slug;
    /// 3. the caller's earliest-created active membership among spaces in
    ///    {Active, Pending}.
    ///
    /// Reaching the end with no candidate is `SPACE_REQUIRED`.
    pub async fn resolve_space(
        &self,
        req: &SignedRequestParts,
        principal: &Principal,
    ) -> Result<SpaceId, GuardError> {
        if let Some(hint) = req.space_hint() {
            if let Ok(id) = hint.parse::<SpaceId>() {
                match self.store.get_space(&id).await {
                    Ok(space) => return Ok(space.id),
                    Err(StoreError::NotFound) => {}
                    Err(e) => return Err(e.into()),
                }
            }
            match self.store.get_space_by_slug(hint).await {
                Ok(space) => return Ok(space.id),
                Err(StoreError::NotFound) => {
                    debug!(hint, "space hint resolved neither as id nor slug");
                }
                Err(e) => return Err(e.into()),
            }
        }

        // Fallback: earliest-created active membership in a live space. The
        // store returns memberships ordered by creation time ascending.
        let memberships = self.store.list_memberships(&principal.id).await?;
        for (membership, space) in memberships {
            if membership.is_active
                && matches!(space.status, SpaceStatus::Active | SpaceStatus::Pending)
            {
                return Ok(membership.space_id);
            }
        }

        Err(GuardError::SpaceRequired)
    }

    /// Verify the caller belongs to the space with sufficient in-space role.
    ///
    /// An absent or deactivated membership is `NOT_A_MEMBER` regardless of
    /// what role the row carries. When `allowed_roles` is supplied the
    /// membership's role must be in it.
    pub async fn require_membership(
        &self,
        space_id: &SpaceId,
        principal: &Principal,
        allowed_roles: Option<&[SpaceRole]>,
    ) -> Result<Membership, GuardError> {
        let membership = match self.store.get_membership(space_id, &principal.id).await {
            Ok(m) => m,
            Err(StoreError::NotFound) => return Err(GuardError::NotAMember),
            Err(e) => return Err(e.into()),
        };

        if !membership.is_active {
            return Err(GuardError::NotAMember);
        }

        if let Some(allowed) = allowed_roles {
            if !allowed.contains(&membership.role) {
                return Err(GuardError::InsufficientSpaceRole {
                    required: allowed.to_vec(),
                    actual: membership.role,
                });
            }
        }

        Ok(membership)
    }

    /// Administrative status transition. Only `Pending → Active` and
    /// `Pending → Rejected` are permitted by this core.
    pub async fn transition_status(
        &self,
        actor: &Principal,
        registry: &PermissionRegistry,
        space_id: &SpaceId,
        new_status: SpaceStatus,
    ) -> Result<Space, GuardError> {
        if !registry.has_permission(actor.role, Permission::SpaceApprove) {
            return Err(GuardError::Forbidden);
        }

        let space = match self.store.get_space(space_id).await {
            Ok(s) => s,
            Err(StoreError::NotFound) => {
                return Err(GuardError::BadRequest(format!("unknown space {}", space_id)))
            }
            Err(e) => return Err(e.into()),
        };

        let permitted = matches!(
            (space.status, new_status),
            (SpaceStatus::Pending, SpaceStatus::Active)
                | (SpaceStatus::Pending, SpaceStatus::Rejected)
        );
        if !permitted {
            return Err(GuardError::BadRequest(format!(
                "illegal space status transition {} -> {}",
                space.status.as_str(),
                new_status.as_str()
            )));
        }

        self.store.set_space_status(space_id, new_status).await?;
        Ok(Space {
            status: new_status,
            ..space
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_storage::{AddMembershipParams, CreateSpaceParams, Role, UpsertPrincipalParams};
    use vellum_store_memory::MemoryStore;

    async fn principal(store: &dyn Store, email: &str, role: Role) -> Principal {
        store
            .upsert_principal(&UpsertPrincipalParams {
                email: email.into(),
                role,
            })
            .await
            .unwrap()
    }

    async fn space(store: &dyn Store, slug: &str, owner: &Principal) -> SpaceId {
        store
            .create_space(&CreateSpaceParams {
                slug: slug.into(),
                name: slug.into(),
                created_by: owner.id,
            })
            .await
            .unwrap()
    }

    fn fixture() -> (Arc<dyn Store>, SpaceAuthorizer) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let authorizer = SpaceAuthorizer::new(store.clone());
        (store, authorizer)
    }

    #[tokio::test]
    async fn test_resolves_explicit_id_hint() {
        let (store, authorizer) = fixture();
        let owner = principal(store.as_ref(), "o@example.com", Role::User).await;
        let space_id = space(store.as_ref(), "team-a", &owner).await;

        let req = SignedRequestParts {
            space_header: Some(space_id.to_string()),
            ..Default::default()
        };
        assert_eq!(
            authorizer.resolve_space(&req, &owner).await.unwrap(),
            space_id
        );
    }

    #[tokio::test]
    async fn test_resolves_hint_as_slug() {
        let (store, authorizer) = fixture();
        let owner = principal(store.as_ref(), "o@example.com", Role::User).await;
        let space_id = space(store.as_ref(), "team-a", &owner).await;

        let req = SignedRequestParts {
            path_and_query: "/v1/records?spaceId=team-a".into(),
            ..Default::default()
        };
        assert_eq!(
            authorizer.resolve_space(&req, &owner).await.unwrap(),
            space_id
        );
    }

    #[tokio::test]
    async fn test_falls_back_to_earliest_membership() {
        let (store, authorizer) = fixture();
        let caller = principal(store.as_ref(), "c@example.com", Role::User).await;
        let other = principal(store.as_ref(), "o@example.com", Role::User).await;

        // Two live spaces; the caller joined first_space before second_space.
        let first_space = space(store.as_ref(), "first", &other).await;
        let second_space = space(store.as_ref(), "second", &other).await;
        for sid in [first_space, second_space] {
            store
                .add_membership(&AddMembershipParams {
                    space_id: sid,
                    principal_id: caller.id,
                    role: SpaceRole::Member,
                })
                .await
                .unwrap();
        }

        let req = SignedRequestParts::default();
        assert_eq!(
            authorizer.resolve_space(&req, &caller).await.unwrap(),
            first_space
        );
    }

    #[tokio::test]
    async fn test_fallback_skips_inactive_and_dead_spaces() {
        let (store, authorizer) = fixture();
        let caller = principal(store.as_ref(), "c@example.com", Role::User).await;
        let other = principal(store.as_ref(), "o@example.com", Role::User).await;

        let rejected = space(store.as_ref(), "rejected", &other).await;
        store
            .set_space_status(&rejected, SpaceStatus::Rejected)
            .await
            .unwrap();
        let inactive = space(store.as_ref(), "inactive", &other).await;
        let live = space(store.as_ref(), "live", &other).await;

        for sid in [rejected, inactive, live] {
            store
                .add_membership(&AddMembershipParams {
                    space_id: sid,
                    principal_id: caller.id,
                    role: SpaceRole::Member,
                })
                .await
                .unwrap();
        }
        store
            .set_membership_active(&inactive, &caller.id, false)
            .await
            .unwrap();

        let req = SignedRequestParts::default();
        assert_eq!(
            authorizer.resolve_space(&req, &caller).await.unwrap(),
            live
        );
    }

    #[tokio::test]
    async fn test_no_candidate_is_space_required() {
        let (store, authorizer) = fixture();
        let caller = principal(store.as_ref(), "c@example.com", Role::User).await;

        let req = SignedRequestParts::default();
        assert!(matches!(
            authorizer.resolve_space(&req, &caller).await,
            Err(GuardError::SpaceRequired)
        ));

        // An unresolvable hint with no memberships also ends as SPACE_REQUIRED.
        let req = SignedRequestParts {
            space_header: Some("nonexistent".into()),
            ..Default::default()
        };
        assert!(matches!(
            authorizer.resolve_space(&req, &caller).await,
            Err(GuardError::SpaceRequired)
        ));
    }

    #[tokio::test]
    async fn test_missing_membership_is_not_a_member() {
        let (store, authorizer) = fixture();
        let owner = principal(store.as_ref(), "o@example.com", Role::User).await;
        let outsider = principal(store.as_ref(), "x@example.com", Role::User).await;
        let space_id = space(store.as_ref(), "team-a", &owner).await;

        assert!(matches!(
            authorizer
                .require_membership(&space_id, &outsider, None)
                .await,
            Err(GuardError::NotAMember)
        ));
    }

    #[tokio::test]
    async fn test_inactive_membership_always_not_a_member() {
        let (store, authorizer) = fixture();
        let owner = principal(store.as_ref(), "o@example.com", Role::User).await;
        let space_id = space(store.as_ref(), "team-a", &owner).await;
        store
            .set_membership_active(&space_id, &owner.id, false)
            .await
            .unwrap();

        // Even though Owner would satisfy the allowed-roles check.
        assert!(matches!(
            authorizer
                .require_membership(&space_id, &owner, Some(&[SpaceRole::Owner]))
                .await,
            Err(GuardError::NotAMember)
        ));
    }

    #[tokio::test]
    async fn test_insufficient_space_role_carries_diagnostics() {
        let (store, authorizer) = fixture();
        let owner = principal(store.as_ref(), "o@example.com", Role::User).await;
        let member = principal(store.as_ref(), "m@example.com", Role::User).await;
        let space_id = space(store.as_ref(), "team-a", &owner).await;
        store
            .add_membership(&AddMembershipParams {
                space_id,
                principal_id: member.id,
                role: SpaceRole::Member,
            })
            .await
            .unwrap();

        let allowed = [SpaceRole::Owner, SpaceRole::Moderator];
        match authorizer
            .require_membership(&space_id, &member, Some(&allowed))
            .await
        {
            Err(GuardError::InsufficientSpaceRole { required, actual }) => {
                assert_eq!(required, allowed.to_vec());
                assert_eq!(actual, SpaceRole::Member);
            }
            other => panic!("expected InsufficientSpaceRole, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_owner_membership_passes_allowed_roles() {
        let (store, authorizer) = fixture();
        let owner = principal(store.as_ref(), "o@example.com", Role::User).await;
        let space_id = space(store.as_ref(), "team-a", &owner).await;

        let membership = authorizer
            .require_membership(&space_id, &owner, Some(&[SpaceRole::Owner]))
            .await
            .unwrap();
        assert_eq!(membership.role, SpaceRole::Owner);
    }

    #[tokio::test]
    async fn test_admin_transitions_pending_space() {
        let (store, authorizer) = fixture();
        let registry = PermissionRegistry::new();
        let admin = principal(store.as_ref(), "a@example.com", Role::Admin).await;
        let requester = principal(store.as_ref(), "r@example.com", Role::User).await;

        let approved = space(store.as_ref(), "approved", &requester).await;
        let updated = authorizer
            .transition_status(&admin, &registry, &approved, SpaceStatus::Active)
            .await
            .unwrap();
        assert_eq!(updated.status, SpaceStatus::Active);

        let rejected = space(store.as_ref(), "rejected", &requester).await;
        let updated = authorizer
            .transition_status(&admin, &registry, &rejected, SpaceStatus::Rejected)
            .await
            .unwrap();
        assert_eq!(updated.status, SpaceStatus::Rejected);
    }

    #[tokio::test]
    async fn test_non_admin_cannot_transition() {
        let (store, authorizer) = fixture();
        let registry = PermissionRegistry::new();
        let moderator = principal(store.as_ref(), "m@example.com", Role::Moderator).await;
        let space_id = space(store.as_ref(), "pending", &moderator).await;

        assert!(matches!(
            authorizer
                .transition_status(&moderator, &registry, &space_id, SpaceStatus::Active)
                .await,
            Err(GuardError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_as_internal() {
        use vellum_storage::MockStore;

        let mut store = MockStore::new();
        store
            .expect_get_membership()
            .returning(|_, _| Err(StoreError::Backend("disk on fire".into())));
        let authorizer = SpaceAuthorizer::new(Arc::new(store));

        let principal = Principal {
            id: vellum_storage::PrincipalId(uuid::Uuid::new_v4()),
            email: "u@example.com".into(),
            role: Role::User,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let space_id = SpaceId(uuid::Uuid::new_v4());
        assert!(matches!(
            authorizer
                .require_membership(&space_id, &principal, None)
                .await,
            Err(GuardError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn test_only_pending_transitions_are_legal() {
        let (store, authorizer) = fixture();
        let registry = PermissionRegistry::new();
        let admin = principal(store.as_ref(), "a@example.com", Role::Admin).await;
        let space_id = space(store.as_ref(), "team-a", &admin).await;

        authorizer
            .transition_status(&admin, &registry, &space_id, SpaceStatus::Active)
            .await
            .unwrap();

        // Active space: no further transitions through this core.
        for target in [
            SpaceStatus::Pending,
            SpaceStatus::Rejected,
            SpaceStatus::Archived,
        ] {
            assert!(matches!(
                authorizer
                    .transition_status(&admin, &registry, &space_id, target)
                    .await,
                Err(GuardError::BadRequest(_))
            ));
        }
    }
}
