//! Static role → permission table with inheritance.
//!
//! The table is built once at startup by walking [`Role::ORDER`] lowest tier
//! first, so every role's set extends a fully populated predecessor. It is
//! immutable afterwards; request-path code only reads it. All decision
//! functions are total over the enum space: no I/O, no errors.

use std::collections::{HashMap, HashSet};

use vellum_storage::{PrincipalId, Role};

/// A single grantable capability.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Permission {
    ConceptCreate,
    RecordCreate,
    RecordEditOwn,
    RecordEditAny,
    DraftAssist,
    Moderate,
    SpaceApprove,
    ManageUsers,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ConceptCreate => "concept_create",
            Permission::RecordCreate => "record_create",
            Permission::RecordEditOwn => "record_edit_own",
            Permission::RecordEditAny => "record_edit_any",
            Permission::DraftAssist => "draft_assist",
            Permission::Moderate => "moderate",
            Permission::SpaceApprove => "space_approve",
            Permission::ManageUsers => "manage_users",
        }
    }
}

/// Permissions each role adds on top of the tier below it.
fn additions(role: Role) -> &'static [Permission] {
    match role {
        Role::User => &[
            Permission::ConceptCreate,
            Permission::RecordCreate,
            Permission::RecordEditOwn,
        ],
        Role::Premium => &[Permission::DraftAssist],
        Role::Moderator => &[Permission::RecordEditAny, Permission::Moderate],
        Role::Admin => &[Permission::SpaceApprove, Permission::ManageUsers],
    }
}

/// The resolved role → permission table.
pub struct PermissionRegistry {
    grants: HashMap<Role, HashSet<Permission>>,
}

impl PermissionRegistry {
    /// Resolve the table over the explicit role order. Each role inherits the
    /// previous role's full set; Admin ends up with the union of everything.
    pub fn new() -> Self {
        let mut grants: HashMap<Role, HashSet<Permission>> = HashMap::new();
        let mut accumulated: HashSet<Permission> = HashSet::new();
        for role in Role::ORDER {
            accumulated.extend(additions(role).iter().copied());
            grants.insert(role, accumulated.clone());
        }
        Self { grants }
    }

    pub fn has_permission(&self, role: Role, permission: Permission) -> bool {
        self.grants
            .get(&role)
            .map(|set| set.contains(&permission))
            .unwrap_or(false)
    }

    pub fn has_any(&self, role: Role, permissions: &[Permission]) -> bool {
        permissions.iter().any(|p| self.has_permission(role, *p))
    }

    pub fn has_all(&self, role: Role, permissions: &[Permission]) -> bool {
        permissions.iter().all(|p| self.has_permission(role, *p))
    }

    /// Ownership-aware edit check: the caller may modify the resource when it
    /// owns it and holds `edit_own`, or when it holds `edit_any` outright.
    pub fn can_modify_resource(
        &self,
        role: Role,
        principal_id: &PrincipalId,
        resource_owner_id: &PrincipalId,
        edit_own: Permission,
        edit_any: Permission,
    ) -> bool {
        (principal_id == resource_owner_id && self.has_permission(role, edit_own))
            || self.has_permission(role, edit_any)
    }
}

impl Default for PermissionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
