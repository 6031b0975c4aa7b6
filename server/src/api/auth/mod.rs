//! Authentication and scope resolution

pub mod api_key;
pub mod scope;

pub use api_key::{Authenticated, OrgScoped, ProjectScoped, resolve_scope};
pub use scope::{AccessLevel, AccessScope};
