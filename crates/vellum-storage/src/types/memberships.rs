//! Membership records: a principal's relationship to a space.

use chrono::{DateTime, Utc};

use super::ids::{PrincipalId, SpaceId};
use super::roles::SpaceRole;

/// Membership record.
///
/// At most one row exists per (space, principal) pair. The space creator is
/// always given `Owner` at creation time.
#[derive(Clone, Debug)]
pub struct Membership {
    pub space_id: SpaceId,
    pub principal_id: PrincipalId,
    pub role: SpaceRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Parameters for adding a membership.
#[derive(Clone, Debug)]
pub struct AddMembershipParams {
    pub space_id: SpaceId,
    pub principal_id: PrincipalId,
    pub role: SpaceRole,
}
