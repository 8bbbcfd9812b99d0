//! Storage records and error definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::ledger::{Ride, RideId, RideStatus};
use crate::location::{DriverId, DriverRecord, NearbyDriver};

/// Errors that can occur in the storage layer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// The store cannot serve requests right now.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A unit of work outlived its deadline and was rolled back.
    #[error("transaction exceeded its {0:?} deadline")]
    Timeout(Duration),

    /// A row lock was not obtained within the allowed wait.
    #[error("timed out waiting for row lock on driver {0}")]
    LockTimeout(DriverId),

    #[error("driver {0} not found")]
    DriverNotFound(DriverId),

    #[error("ride {0} not found")]
    RideNotFound(RideId),

    /// A write was staged against a row this unit of work does not hold.
    #[error("driver {0} is not locked by this transaction")]
    NotLocked(DriverId),

    #[error("ride cannot move from {from} to {to}")]
    InvalidTransition { from: RideStatus, to: RideStatus },

    /// Driver still holds a live ride.
    #[error("driver {0} has an active ride")]
    DriverBusy(DriverId),

    /// Staged writes would break reservation/ride pairing.
    #[error("inconsistent transaction: {0}")]
    Inconsistent(String),

    #[error("snapshot error: {0}")]
    Snapshot(String),
}

impl StoreError {
    /// Failures that may clear up on their own.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable(_) | StoreError::Timeout(_) | StoreError::LockTimeout(_)
        )
    }
}

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of a skip-locked nearest-driver scan.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionScan {
    /// Driver now row-locked by the scanning unit of work.
    pub chosen: Option<NearbyDriver>,
    /// Available in-radius candidates passed over because another unit of
    /// work held their row lock.
    pub skipped_locked: usize,
}

/// An assignment event that could not be delivered over a live channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingNotification {
    /// Store-wide creation sequence; orders replay.
    pub seq: u64,
    pub driver_id: DriverId,
    pub ride_id: RideId,
    /// Ride status when the event was raised.
    pub status: RideStatus,
    pub created_at: DateTime<Utc>,
}

/// Serialisable copy of every table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub drivers: Vec<DriverRecord>,
    pub rides: Vec<Ride>,
    pub pending: Vec<PendingNotification>,
}
