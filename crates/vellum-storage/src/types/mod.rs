//! Domain types shared between the guard core and storage backends.

pub mod ids;
pub mod memberships;
pub mod principals;
pub mod roles;
pub mod spaces;
pub mod usage;

pub use ids::*;
pub use memberships::*;
pub use principals::*;
pub use roles::*;
pub use spaces::*;
pub use usage::*;
