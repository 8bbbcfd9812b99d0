//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! POST /v1/rides:
//!     → identity middleware (caller resolved)
//!     → rate_limit.rs (per-caller token bucket)
//!     → handler
//! ```
//!
//! # Design Decisions
//! - Buckets are keyed by caller subject, not peer address
//! - Fail closed: an empty bucket is a 429, never a queue

pub mod rate_limit;

pub use rate_limit::{rate_limit_middleware, RateLimiter};
