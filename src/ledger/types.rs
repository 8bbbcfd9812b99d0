//! Ride records and the ride status machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::identity::{Caller, Role};
use crate::location::{DriverId, GeoPoint};
use crate::storage::StoreError;

/// Unique, immutable ride identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RideId(pub Uuid);

impl RideId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RideId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RideId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RideId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Ride lifecycle status.
///
/// # State Transitions
/// ```text
/// requested → accepted → in_progress → completed
///     └──────────┴────────────┴──────→ cancelled
/// ```
/// Strict mode allows exactly one forward step at a time; relaxed mode allows
/// skipping forward (e.g. accepted → completed). Terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    Requested,
    Accepted,
    InProgress,
    Completed,
    Cancelled,
}

impl RideStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RideStatus::Requested => "requested",
            RideStatus::Accepted => "accepted",
            RideStatus::InProgress => "in_progress",
            RideStatus::Completed => "completed",
            RideStatus::Cancelled => "cancelled",
        }
    }

    /// Completed and cancelled rides release their driver and never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, RideStatus::Completed | RideStatus::Cancelled)
    }

    /// Position along the forward path. Cancelled sits outside it.
    fn rank(self) -> Option<u8> {
        match self {
            RideStatus::Requested => Some(0),
            RideStatus::Accepted => Some(1),
            RideStatus::InProgress => Some(2),
            RideStatus::Completed => Some(3),
            RideStatus::Cancelled => None,
        }
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: RideStatus, strict: bool) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == RideStatus::Cancelled {
            return true;
        }
        match (self.rank(), next.rank()) {
            (Some(from), Some(to)) if strict => to == from + 1,
            (Some(from), Some(to)) => to > from,
            _ => false,
        }
    }
}

impl std::fmt::Display for RideStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RideStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(RideStatus::Requested),
            "accepted" => Ok(RideStatus::Accepted),
            "in_progress" => Ok(RideStatus::InProgress),
            "completed" => Ok(RideStatus::Completed),
            "cancelled" => Ok(RideStatus::Cancelled),
            other => Err(format!("unknown ride status '{other}'")),
        }
    }
}

/// A committed ride.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ride {
    pub id: RideId,
    pub rider_id: String,
    /// Set for every committed ride; `None` only for rides restored from
    /// records that never matched.
    pub driver_id: Option<DriverId>,
    pub status: RideStatus,
    pub pickup: GeoPoint,
    pub dropoff: Option<GeoPoint>,
    /// Price estimate in currency units, rounded to cents.
    pub price: f64,
    pub eta_minutes: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ride {
    /// Rides are visible only to their rider, acting as a rider, and their
    /// assigned driver, acting as a driver.
    pub fn is_visible_to(&self, caller: &Caller) -> bool {
        match caller.role {
            Role::Rider => self.rider_id == caller.subject,
            Role::Driver => self
                .driver_id
                .as_ref()
                .is_some_and(|driver| driver.as_str() == caller.subject),
        }
    }
}

/// Input for inserting a ride inside a reservation transaction.
#[derive(Debug, Clone)]
pub struct NewRide {
    pub driver_id: DriverId,
    pub rider_id: String,
    pub pickup: GeoPoint,
    pub dropoff: Option<GeoPoint>,
    pub price: f64,
    pub eta_minutes: u32,
}

/// Ledger failures.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Missing, or not visible to the requester. The two are indistinguishable.
    #[error("ride {0} not found")]
    NotFound(RideId),

    #[error("ride cannot move from {from} to {to}")]
    InvalidTransition { from: RideStatus, to: RideStatus },

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::RideNotFound(id) => LedgerError::NotFound(id),
            StoreError::InvalidTransition { from, to } => LedgerError::InvalidTransition { from, to },
            other => LedgerError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_transitions_step_forward_only() {
        use RideStatus::*;
        assert!(Requested.can_transition_to(Accepted, true));
        assert!(Accepted.can_transition_to(InProgress, true));
        assert!(InProgress.can_transition_to(Completed, true));

        assert!(!Accepted.can_transition_to(Completed, true));
        assert!(!Accepted.can_transition_to(Requested, true));
        assert!(!Requested.can_transition_to(Requested, true));
    }

    #[test]
    fn relaxed_transitions_may_skip() {
        use RideStatus::*;
        assert!(Accepted.can_transition_to(Completed, false));
        assert!(!InProgress.can_transition_to(Accepted, false));
    }

    #[test]
    fn cancellation_from_any_live_state() {
        use RideStatus::*;
        for from in [Requested, Accepted, InProgress] {
            assert!(from.can_transition_to(Cancelled, true));
        }
        assert!(!Completed.can_transition_to(Cancelled, true));
        assert!(!Cancelled.can_transition_to(Cancelled, false));
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(serde_json::to_string(&RideStatus::InProgress).unwrap(), "\"in_progress\"");
        assert_eq!("cancelled".parse::<RideStatus>().unwrap(), RideStatus::Cancelled);
        assert!("matched".parse::<RideStatus>().is_err());
    }

    #[test]
    fn visibility_is_rider_or_driver() {
        let point = GeoPoint::new(0.3135, 32.5811).unwrap();
        let ride = Ride {
            id: RideId::new(),
            rider_id: "rider-1".into(),
            driver_id: Some(DriverId::from("driver-1")),
            status: RideStatus::Requested,
            pickup: point,
            dropoff: None,
            price: 5.0,
            eta_minutes: 3,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(ride.is_visible_to(&Caller::rider("rider-1")));
        assert!(ride.is_visible_to(&Caller::driver("driver-1")));
        assert!(!ride.is_visible_to(&Caller::rider("rider-2")));
    }

    #[test]
    fn visibility_checks_role_not_just_subject() {
        let point = GeoPoint::new(0.3135, 32.5811).unwrap();
        let ride = Ride {
            id: RideId::new(),
            rider_id: "rider-9".into(),
            driver_id: Some(DriverId::from("driver1")),
            status: RideStatus::Requested,
            pickup: point,
            dropoff: None,
            price: 5.0,
            eta_minutes: 3,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(!ride.is_visible_to(&Caller::rider("driver1")));
        assert!(!ride.is_visible_to(&Caller::driver("rider-9")));
        assert!(ride.is_visible_to(&Caller::driver("driver1")));
    }
}
