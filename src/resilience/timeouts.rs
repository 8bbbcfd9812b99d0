//! Timeout enforcement.
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors name the operation and are distinct from other errors

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// An operation ran past its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{operation} timed out after {after:?}")]
pub struct TimedOut {
    pub operation: &'static str,
    pub after: Duration,
}

/// Run `fut` with a deadline.
pub async fn with_timeout<F, T>(operation: &'static str, after: Duration, fut: F) -> Result<T, TimedOut>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| TimedOut { operation, after })
}
