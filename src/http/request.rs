//! Request bodies, query strings and request ids.
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing and echoed back
//! - Coordinates arrive as plain numbers and are validated in the handler

use axum::http::HeaderName;
use serde::{Deserialize, Serialize};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

use crate::ledger::RideStatus;
use crate::location::{GeoError, GeoPoint};

pub const X_REQUEST_ID: &str = "x-request-id";

/// Assigns a UUID v4 `x-request-id` when the client sent none.
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID), MakeRequestUuid)
}

/// Copies `x-request-id` onto the response.
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(HeaderName::from_static(X_REQUEST_ID))
}

/// Unvalidated coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn validate(self) -> Result<GeoPoint, GeoError> {
        GeoPoint::new(self.lat, self.lng)
    }
}

/// `POST /v1/rides`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideRequest {
    pub pickup: Coordinates,
    #[serde(default)]
    pub dropoff: Option<Coordinates>,
}

/// `POST /v1/rides/{id}/status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: RideStatus,
}

/// `PUT /v1/drivers/availability`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityUpdate {
    pub available: bool,
}

/// `GET /v1/drivers/nearby?lat=..&lng=..&radius_km=..&limit=..`
#[derive(Debug, Clone, Deserialize)]
pub struct NearbyQuery {
    pub lat: f64,
    pub lng: f64,
    pub radius_km: Option<f64>,
    pub limit: Option<usize>,
}

/// `?token=` fallback for clients that cannot set headers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropoff_is_optional() {
        let req: RideRequest = serde_json::from_str(r#"{"pickup":{"lat":0.31,"lng":32.58}}"#).unwrap();
        assert!(req.dropoff.is_none());
        assert!(req.pickup.validate().is_ok());
    }

    #[test]
    fn out_of_range_coordinates_rejected() {
        let c = Coordinates { lat: 91.0, lng: 0.0 };
        assert!(c.validate().is_err());
    }

    #[test]
    fn status_update_parses_wire_name() {
        let update: StatusUpdate = serde_json::from_str(r#"{"status":"accepted"}"#).unwrap();
        assert_eq!(update.status, RideStatus::Accepted);
    }
}
