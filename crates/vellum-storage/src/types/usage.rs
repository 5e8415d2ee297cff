//! Per-principal daily usage counters.

use chrono::{DateTime, Local, NaiveDate, Utc};
use std::collections::HashMap;
use std::str::FromStr;

use super::ids::PrincipalId;

/// An action whose frequency is metered per (principal, day).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionKind {
    ConceptCreate,
    RecordCreate,
    DraftAssist,
}

impl ActionKind {
    /// All metered actions.
    pub const ALL: [ActionKind; 3] = [
        ActionKind::ConceptCreate,
        ActionKind::RecordCreate,
        ActionKind::DraftAssist,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::ConceptCreate => "concept_create",
            ActionKind::RecordCreate => "record_create",
            ActionKind::DraftAssist => "draft_assist",
        }
    }
}

/// Error type for parsing ActionKind from string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseActionKindError(pub String);

impl std::fmt::Display for ParseActionKindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid action kind: {}", self.0)
    }
}

impl std::error::Error for ParseActionKindError {}

impl FromStr for ActionKind {
    type Err = ParseActionKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "concept_create" => Ok(ActionKind::ConceptCreate),
            "record_create" => Ok(ActionKind::RecordCreate),
            "draft_assist" => Ok(ActionKind::DraftAssist),
            _ => Err(ParseActionKindError(s.to_string())),
        }
    }
}

/// A calendar-day bucket, bounded at local server midnight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UsageDay(pub NaiveDate);

impl UsageDay {
    /// Today's bucket in the server's local timezone.
    pub fn today() -> Self {
        Self(Local::now().date_naive())
    }
}

impl std::fmt::Display for UsageDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for UsageDay {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(NaiveDate::parse_from_str(s, "%Y-%m-%d")?))
    }
}

/// One usage row per (principal, calendar day).
///
/// Created on first action of the day, mutated only by atomic increments at
/// the store layer, never deleted by this core.
#[derive(Clone, Debug)]
pub struct UsageRecord {
    pub principal_id: PrincipalId,
    pub day: UsageDay,
    pub counters: HashMap<ActionKind, i64>,
    pub estimated_cost: f64,
    pub created_at: DateTime<Utc>,
}

impl UsageRecord {
    /// Counter value for an action; absent counters read as zero.
    pub fn count(&self, action: ActionKind) -> i64 {
        self.counters.get(&action).copied().unwrap_or(0)
    }
}
