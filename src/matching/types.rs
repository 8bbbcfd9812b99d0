//! Dispatch outcomes, assignments and errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::{RideId, RideStatus};
use crate::location::{DriverId, GeoError, GeoPoint};
use crate::storage::StoreError;

/// Stages a ride request moves through.
///
/// # State Transitions
/// ```text
/// Received → Authorizing → Selecting → Pricing → Persisting → Notifying → Done
///                              ▲                      │
///                              └──── contention ──────┘  (bounded retries)
/// ```
/// Failures before `Persisting` reach the caller. Failures while `Notifying`
/// are logged only; the ride is already committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStage {
    Received,
    Authorizing,
    Selecting,
    Pricing,
    Persisting,
    Notifying,
    Done,
}

impl std::fmt::Display for DispatchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DispatchStage::Received => "received",
            DispatchStage::Authorizing => "authorizing",
            DispatchStage::Selecting => "selecting",
            DispatchStage::Pricing => "pricing",
            DispatchStage::Persisting => "persisting",
            DispatchStage::Notifying => "notifying",
            DispatchStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by the dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Malformed request. Never retried.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Every attempt lost its candidates to concurrent requests.
    #[error("all nearby drivers are being matched; gave up after {attempts} attempts")]
    SelectionContention { attempts: u32 },

    /// Commit or rollback failed. Nothing was applied.
    #[error("failed to persist ride: {0}")]
    Persistence(StoreError),

    #[error("dispatch store unavailable: {0}")]
    Unavailable(StoreError),
}

impl DispatchError {
    /// Whether the caller may reasonably try again later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DispatchError::SelectionContention { .. } | DispatchError::Unavailable(_)
        )
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::Validation(_) => "validation_error",
            DispatchError::SelectionContention { .. } => "selection_contention",
            DispatchError::Persistence(_) => "persistence_failure",
            DispatchError::Unavailable(_) => "store_unavailable",
        }
    }
}

impl From<GeoError> for DispatchError {
    fn from(err: GeoError) -> Self {
        DispatchError::Validation(err.to_string())
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Driver details returned to the rider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignedDriver {
    pub id: DriverId,
    pub name: String,
    pub rating: f64,
    pub vehicle: String,
    pub position: GeoPoint,
    /// Distance from the driver to the pickup point.
    pub distance_km: f64,
}

/// A committed match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideAssignment {
    pub ride_id: RideId,
    pub driver: AssignedDriver,
    pub status: RideStatus,
    pub price: f64,
    pub eta_minutes: u32,
    pub surge_applied: bool,
    pub pickup: GeoPoint,
    pub dropoff: Option<GeoPoint>,
    pub created_at: DateTime<Utc>,
}

/// Result of a ride request that did not fail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchOutcome {
    Assigned(RideAssignment),
    /// Nobody free within the radius. Not an error; try again later.
    NoDriverAvailable { radius_km: f64 },
}

impl MatchOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            MatchOutcome::Assigned(_) => "assigned",
            MatchOutcome::NoDriverAvailable { .. } => "no_driver_available",
        }
    }

    pub fn assignment(&self) -> Option<&RideAssignment> {
        match self {
            MatchOutcome::Assigned(a) => Some(a),
            MatchOutcome::NoDriverAvailable { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_driver_wire_shape() {
        let json = serde_json::to_value(MatchOutcome::NoDriverAvailable { radius_km: 5.0 }).unwrap();
        assert_eq!(json, serde_json::json!({"outcome": "no_driver_available", "radius_km": 5.0}));
    }

    #[test]
    fn transient_classification() {
        assert!(DispatchError::SelectionContention { attempts: 3 }.is_transient());
        assert!(DispatchError::Unavailable(StoreError::Unavailable("down".into())).is_transient());
        assert!(!DispatchError::Validation("bad".into()).is_transient());
        assert!(!DispatchError::Persistence(StoreError::Inconsistent("x".into())).is_transient());
    }

    #[test]
    fn stage_names() {
        assert_eq!(DispatchStage::Persisting.to_string(), "persisting");
    }
}
