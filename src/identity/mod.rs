//! Caller identity resolution.
//!
//! A bearer credential resolves to a [`Caller`]: a subject (rider id or
//! driver id) plus a role. Successful resolution is the only authorization
//! the dispatch core asks for; row visibility does the rest.

pub mod resolver;
pub mod types;

pub use resolver::{bearer_token, IdentityResolver, StaticTokenResolver};
pub use types::{Caller, IdentityError, Role};
