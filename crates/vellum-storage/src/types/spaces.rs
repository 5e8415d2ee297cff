//! Space (tenant) records and their lifecycle status.

use chrono::{DateTime, Utc};
use std::str::FromStr;

use super::ids::{PrincipalId, SpaceId};

/// Lifecycle status of a space.
///
/// Spaces are created `Pending` by their requester. Only an administrative
/// action moves them to `Active` or `Rejected`; `Rejected` and `Archived` are
/// terminal unless explicitly reopened by an admin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpaceStatus {
    Pending,
    Active,
    Rejected,
    Archived,
}

impl SpaceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpaceStatus::Pending => "pending",
            SpaceStatus::Active => "active",
            SpaceStatus::Rejected => "rejected",
            SpaceStatus::Archived => "archived",
        }
    }
}

/// Error type for parsing SpaceStatus from string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSpaceStatusError(pub String);

impl std::fmt::Display for ParseSpaceStatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid space status: {}", self.0)
    }
}

impl std::error::Error for ParseSpaceStatusError {}

impl FromStr for SpaceStatus {
    type Err = ParseSpaceStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SpaceStatus::Pending),
            "active" => Ok(SpaceStatus::Active),
            "rejected" => Ok(SpaceStatus::Rejected),
            "archived" => Ok(SpaceStatus::Archived),
            _ => Err(ParseSpaceStatusError(s.to_string())),
        }
    }
}

/// Space record.
#[derive(Clone, Debug)]
pub struct Space {
    pub id: SpaceId,
    pub slug: String,
    pub name: String,
    pub status: SpaceStatus,
    pub created_by: PrincipalId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating a space.
///
/// The store creates the space `Pending` and gives `created_by` an `Owner`
/// membership atomically.
#[derive(Clone, Debug)]
pub struct CreateSpaceParams {
    pub slug: String,
    pub name: String,
    pub created_by: PrincipalId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_status_roundtrip() {
        for status in [
            SpaceStatus::Pending,
            SpaceStatus::Active,
            SpaceStatus::Rejected,
            SpaceStatus::Archived,
        ] {
            let parsed: SpaceStatus = status.as_str().parse().unwrap();
            assert_eq!(status, parsed);
        }
    }

    #[test]
    fn test_space_status_parse_invalid() {
        assert!("live".parse::<SpaceStatus>().is_err());
        assert!("PENDING".parse::<SpaceStatus>().is_err());
    }
}
