//! The vellum guard core.
//!
//! Every protected request passes through the guard chain before any business
//! logic runs: authenticate the signed request, resolve the caller to a
//! principal, check global permissions, verify space membership, and gate
//! rate-limited actions against the daily usage meter. Handlers receive an
//! [`AuthorizationContext`] on success or a terminal [`GuardError`] otherwise,
//! and report success back so usage is recorded exactly once.

pub mod chain;
pub mod config;
pub mod error;
pub mod identity;
pub mod permissions;
pub mod request;
pub mod signing;
pub mod space;
pub mod usage;

pub use chain::{AuthorizationContext, Gatekeeper, GuardRequirement, SpaceRule};
pub use config::{ConfigError, GuardConfig};
pub use error::GuardError;
pub use identity::{
    OverridePrincipalProvider, PrincipalProvider, SessionLookup, SessionPrincipalProvider,
};
pub use permissions::{Permission, PermissionRegistry};
pub use request::SignedRequestParts;
pub use signing::RequestAuthenticator;
pub use space::SpaceAuthorizer;
pub use usage::{LimitTable, NoBackfill, UsageBackfill, UsageMeter, UNLIMITED};
