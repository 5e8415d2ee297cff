//! Terminal error taxonomy for the guard chain.
//!
//! Every rejection maps to a stable machine-readable code and HTTP status.
//! Authentication failures are deliberately uniform (`Forbidden`) so a caller
//! cannot probe which check failed.

use serde_json::{json, Value};
use thiserror::Error;
use vellum_storage::{SpaceRole, StoreError};

#[derive(Debug, Error)]
pub enum GuardError {
    /// Identity could not be resolved (missing or unknown session/override).
    #[error("unauthorized")]
    Unauthorized,

    /// Authentication or permission failure. Intentionally carries no detail.
    #[error("forbidden")]
    Forbidden,

    /// No tenant could be resolved for a space-scoped request.
    #[error("no space could be resolved for this request")]
    SpaceRequired,

    /// The caller has no active membership in the resolved space.
    #[error("not a member of this space")]
    NotAMember,

    /// The caller is a member but the in-space role is not in the allowed set.
    #[error("insufficient space role")]
    InsufficientSpaceRole {
        required: Vec<SpaceRole>,
        actual: SpaceRole,
    },

    /// The daily counter for this action reached the caller's limit.
    #[error("usage limit exceeded")]
    UsageLimitExceeded { current: i64, limit: i64 },

    /// Malformed input (bad override header, bad status transition, ...).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Unexpected store failure; fatal for the request, never retried here.
    #[error("internal error")]
    Internal(String),
}

impl GuardError {
    /// Stable machine-readable code for the wire.
    pub fn code(&self) -> &'static str {
        match self {
            GuardError::Unauthorized => "UNAUTHORIZED",
            GuardError::Forbidden => "FORBIDDEN",
            GuardError::SpaceRequired => "SPACE_REQUIRED",
            GuardError::NotAMember => "NOT_A_MEMBER",
            GuardError::InsufficientSpaceRole { .. } => "INSUFFICIENT_SPACE_ROLE",
            GuardError::UsageLimitExceeded { .. } => "USAGE_LIMIT_EXCEEDED",
            GuardError::BadRequest(_) => "BAD_REQUEST",
            GuardError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status the error maps to.
    pub fn status(&self) -> u16 {
        match self {
            GuardError::Unauthorized => 401,
            GuardError::Forbidden => 403,
            GuardError::SpaceRequired => 400,
            GuardError::NotAMember => 403,
            GuardError::InsufficientSpaceRole { .. } => 403,
            GuardError::UsageLimitExceeded { .. } => 429,
            GuardError::BadRequest(_) => 400,
            GuardError::Internal(_) => 500,
        }
    }

    /// Structured JSON body: `{error, code, ...details}`.
    ///
    /// Internal errors keep their detail out of the body; it is logged with
    /// correlation info instead.
    pub fn body(&self) -> Value {
        let mut body = json!({
            "error": self.to_string(),
            "code": self.code(),
        });
        match self {
            GuardError::InsufficientSpaceRole { required, actual } => {
                body["required"] = Value::Array(
                    required
                        .iter()
                        .map(|r| Value::String(r.as_str().to_string()))
                        .collect(),
                );
                body["actual"] = Value::String(actual.as_str().to_string());
            }
            GuardError::UsageLimitExceeded { current, limit } => {
                body["current"] = json!(current);
                body["limit"] = json!(limit);
            }
            _ => {}
        }
        body
    }
}

/// Store failures surfacing through this conversion are unexpected; callers
/// that can interpret `NotFound` (missing membership, missing usage row)
/// handle it before propagating.
impl From<StoreError> for GuardError {
    fn from(err: StoreError) -> Self {
        GuardError::Internal(err.to_string())
    }
}
