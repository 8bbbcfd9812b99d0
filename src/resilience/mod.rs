//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Reservation attempt fails with contention:
//!     → retries.rs (attempt bound reached? surface : retry)
//!     → backoff.rs (exponential delay + jitter before next attempt)
//!
//! Channel write / row-lock wait:
//!     → timeouts.rs (bounded wait, typed expiry)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every wait has a deadline
//! - Only the orchestrator decides whether to retry
//! - Jittered backoff prevents thundering herd

pub mod backoff;
pub mod retries;
pub mod timeouts;

pub use retries::RetryPolicy;
pub use timeouts::{with_timeout, TimedOut};
