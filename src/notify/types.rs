//! Push events, driver messages and delivery errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::ledger::RideId;

/// Kind of assignment event pushed to a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Delivered live as the ride is committed.
    NewRide,
    /// Replayed from the pending queue.
    PendingRide,
}

/// Wire shape: `{"type": "new_ride" | "pending_ride", "ride_id": .., "timestamp": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub ride_id: RideId,
    pub timestamp: DateTime<Utc>,
}

impl PushEvent {
    pub fn new_ride(ride_id: RideId) -> Self {
        Self {
            kind: EventKind::NewRide,
            ride_id,
            timestamp: Utc::now(),
        }
    }

    pub fn pending_ride(ride_id: RideId) -> Self {
        Self {
            kind: EventKind::PendingRide,
            ride_id,
            timestamp: Utc::now(),
        }
    }
}

/// Messages a driver client may send over its channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DriverMessage {
    Heartbeat {
        #[serde(default)]
        time: Option<String>,
    },
    Accept {
        ride_id: RideId,
    },
}

/// What became of one notification. Every variant counts as success for
/// the ride request that raised it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyOutcome {
    /// Written to the driver's live channel.
    Delivered,
    /// Stored as a pending notification for replay on reconnect.
    Queued,
    /// Neither delivered nor stored; the store was unreachable.
    Dropped,
}

impl NotifyOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            NotifyOutcome::Delivered => "delivered",
            NotifyOutcome::Queued => "queued",
            NotifyOutcome::Dropped => "dropped",
        }
    }
}

/// Failure writing to a live channel.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChannelError {
    #[error("channel closed")]
    Closed,

    #[error("channel write timed out after {0:?}")]
    Timeout(Duration),

    #[error("channel write failed: {0}")]
    Write(String),
}

/// Result of draining a driver's pending queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub delivered: usize,
    pub remaining: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_event_wire_shape() {
        let event = PushEvent::pending_ride(RideId::new());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "pending_ride");
        assert_eq!(json["ride_id"], event.ride_id.to_string());
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn parses_driver_messages() {
        let hb: DriverMessage = serde_json::from_str(r#"{"type":"heartbeat","time":"12:00"}"#).unwrap();
        assert_eq!(hb, DriverMessage::Heartbeat { time: Some("12:00".into()) });

        let id = RideId::new();
        let accept: DriverMessage =
            serde_json::from_str(&format!(r#"{{"type":"accept","ride_id":"{id}"}}"#)).unwrap();
        assert_eq!(accept, DriverMessage::Accept { ride_id: id });

        assert!(serde_json::from_str::<DriverMessage>(r#"{"type":"dance"}"#).is_err());
    }
}
