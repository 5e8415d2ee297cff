//! Role types: the caller's global privilege tier and the in-space role.

use std::str::FromStr;

/// Global privilege tier of a principal.
///
/// Ordered: each tier's permission set is a strict superset of the one below
/// it. The ordering here drives the permission-registry build, so the derive
/// of `Ord` must match the declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    User,
    Premium,
    Moderator,
    Admin,
}

impl Role {
    /// All roles in inheritance order, lowest tier first.
    pub const ORDER: [Role; 4] = [Role::User, Role::Premium, Role::Moderator, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Premium => "premium",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }
}

/// Error type for parsing Role from string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseRoleError(pub String);

impl std::fmt::Display for ParseRoleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid role: {}", self.0)
    }
}

impl std::error::Error for ParseRoleError {}

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "premium" => Ok(Role::Premium),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            _ => Err(ParseRoleError(s.to_string())),
        }
    }
}

/// Role within a space.
///
/// Unlike [`Role`], these are not a strict hierarchy: guards check against an
/// explicit allowed-roles list instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpaceRole {
    Owner,
    Moderator,
    Curator,
    Member,
}

impl SpaceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpaceRole::Owner => "owner",
            SpaceRole::Moderator => "moderator",
            SpaceRole::Curator => "curator",
            SpaceRole::Member => "member",
        }
    }
}

/// Error type for parsing SpaceRole from string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSpaceRoleError(pub String);

impl std::fmt::Display for ParseSpaceRoleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid space role: {}", self.0)
    }
}

impl std::error::Error for ParseSpaceRoleError {}

impl FromStr for SpaceRole {
    type Err = ParseSpaceRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(SpaceRole::Owner),
            "moderator" => Ok(SpaceRole::Moderator),
            "curator" => Ok(SpaceRole::Curator),
            "member" => Ok(SpaceRole::Member),
            _ => Err(ParseSpaceRoleError(s.to_string())),
        }
    }
}
