//! Driver identity and directory records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::location::geo::GeoPoint;

/// Driver identity, as resolved from a driver's credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverId(pub String);

impl DriverId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DriverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DriverId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Descriptive attributes shown to riders on assignment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverProfile {
    pub name: String,
    /// Average rating, 0.0 to 5.0.
    pub rating: f64,
    /// Free-form vehicle descriptor (make, colour, plate).
    pub vehicle: String,
}

/// A driver as held by the location store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverRecord {
    pub id: DriverId,
    pub position: GeoPoint,
    /// False while reserved by a ride or offline.
    pub available: bool,
    pub profile: DriverProfile,
    pub updated_at: DateTime<Utc>,
}

impl DriverRecord {
    /// A newly seen driver: online and available.
    pub fn new(id: DriverId, position: GeoPoint) -> Self {
        Self {
            id,
            position,
            available: true,
            profile: DriverProfile::default(),
            updated_at: Utc::now(),
        }
    }
}

/// A driver paired with its distance from a query point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearbyDriver {
    pub driver: DriverRecord,
    pub distance_km: f64,
}
