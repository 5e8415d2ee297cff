//! The Store trait that backends implement.

use crate::types::*;
use crate::StoreError;

/// The storage trait the guard core depends on.
///
/// Memberships and usage rows are the only shared mutable state in the
/// system; `increment_usage` must be atomic at the backend so concurrent
/// callers never lose updates.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // ───────────────────────────────────── Principals ─────────────────────────────────────

    /// Idempotent upsert by email: create the principal if absent, otherwise
    /// return the existing row unchanged.
    async fn upsert_principal(
        &self,
        params: &UpsertPrincipalParams,
    ) -> Result<Principal, StoreError>;

    /// Get principal by ID.
    async fn get_principal(&self, principal_id: &PrincipalId) -> Result<Principal, StoreError>;

    /// Get principal by email.
    async fn get_principal_by_email(&self, email: &str) -> Result<Principal, StoreError>;

    /// Change a principal's global role.
    async fn set_principal_role(
        &self,
        principal_id: &PrincipalId,
        role: Role,
    ) -> Result<(), StoreError>;

    // ───────────────────────────────────── Spaces ─────────────────────────────────────────

    /// Create a space in `Pending` status and give the creator an `Owner`
    /// membership, atomically. Returns the generated ID.
    async fn create_space(&self, params: &CreateSpaceParams) -> Result<SpaceId, StoreError>;

    /// Get space by ID.
    async fn get_space(&self, space_id: &SpaceId) -> Result<Space, StoreError>;

    /// Get space by slug.
    async fn get_space_by_slug(&self, slug: &str) -> Result<Space, StoreError>;

    /// Overwrite a space's status. Transition legality is enforced by the
    /// guard core, not here.
    async fn set_space_status(
        &self,
        space_id: &SpaceId,
        status: SpaceStatus,
    ) -> Result<(), StoreError>;

    // ───────────────────────────────────── Memberships ────────────────────────────────────

    /// Add a membership. Fails with `AlreadyExists` if the (space, principal)
    /// pair already has a row.
    async fn add_membership(&self, params: &AddMembershipParams) -> Result<(), StoreError>;

    /// Get the membership row for a (space, principal) pair.
    async fn get_membership(
        &self,
        space_id: &SpaceId,
        principal_id: &PrincipalId,
    ) -> Result<Membership, StoreError>;

    /// Activate or deactivate a membership.
    async fn set_membership_active(
        &self,
        space_id: &SpaceId,
        principal_id: &PrincipalId,
        is_active: bool,
    ) -> Result<(), StoreError>;

    /// All memberships for a principal joined with their space, ordered by
    /// membership creation time ascending (deterministic for fallback tenant
    /// resolution).
    async fn list_memberships(
        &self,
        principal_id: &PrincipalId,
    ) -> Result<Vec<(Membership, Space)>, StoreError>;

    // ───────────────────────────────────── Usage ──────────────────────────────────────────

    /// Get the usage row for a (principal, day) bucket.
    async fn get_usage(
        &self,
        principal_id: &PrincipalId,
        day: UsageDay,
    ) -> Result<UsageRecord, StoreError>;

    /// Create the (principal, day) bucket if absent, seeding the given
    /// counters. Existing buckets (and existing counters within them) are
    /// left untouched. Returns the row as stored.
    async fn ensure_usage(
        &self,
        principal_id: &PrincipalId,
        day: UsageDay,
        seed: &[(ActionKind, i64)],
    ) -> Result<UsageRecord, StoreError>;

    /// Atomic upsert-increment of one counter (plus the bucket's estimated
    /// cost). Never a read-modify-write: N concurrent calls must sum to
    /// exactly N * amount. Returns the new counter value.
    async fn increment_usage(
        &self,
        principal_id: &PrincipalId,
        day: UsageDay,
        action: ActionKind,
        amount: i64,
        estimated_cost: f64,
    ) -> Result<i64, StoreError>;
}
