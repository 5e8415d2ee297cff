//! Principal records: the resolved identity making a request.

use chrono::{DateTime, Utc};

use super::ids::PrincipalId;
use super::roles::Role;

/// Principal record.
///
/// Created lazily on first resolution (idempotent upsert by email); never
/// deleted by this core.
#[derive(Clone, Debug)]
pub struct Principal {
    pub id: PrincipalId,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for the idempotent principal upsert.
///
/// `role` only applies when the row is created; an existing principal keeps
/// its stored role.
#[derive(Clone, Debug)]
pub struct UpsertPrincipalParams {
    pub email: String,
    pub role: Role,
}
