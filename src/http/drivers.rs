//! Driver endpoints.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    Extension, Json,
};

use crate::http::middleware::require_role;
use crate::http::request::{AvailabilityUpdate, Coordinates, NearbyQuery};
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::identity::{Caller, IdentityError, Role};
use crate::location::{DriverId, DriverRecord, GeoPoint, NearbyDriver};
use crate::storage::DriverDirectory;

const MAX_NEARBY_LIMIT: usize = 50;

fn self_driver(caller: &Caller) -> Result<DriverId, ApiError> {
    require_role(caller, Role::Driver)?;
    caller
        .driver_id()
        .ok_or_else(|| IdentityError::WrongRole(Role::Driver).into())
}

/// `PUT /v1/drivers/location`
pub async fn update_location(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<Coordinates>, JsonRejection>,
) -> Result<Json<DriverRecord>, ApiError> {
    let driver = self_driver(&caller)?;
    let Json(coords) = payload?;
    let position = coords.validate()?;
    let record = state.services.store.upsert_location(&driver, position)?;
    tracing::debug!(driver_id = %driver, lat = position.lat, lng = position.lng, "Driver location updated");
    Ok(Json(record))
}

/// `PUT /v1/drivers/availability`
pub async fn set_availability(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<AvailabilityUpdate>, JsonRejection>,
) -> Result<Json<DriverRecord>, ApiError> {
    let driver = self_driver(&caller)?;
    let Json(update) = payload?;
    let wait = state.config.timeouts.lock_wait();
    let record = state
        .services
        .store
        .set_availability(&driver, update.available, wait)
        .await?;
    tracing::info!(driver_id = %driver, available = record.available, "Driver availability changed");
    Ok(Json(record))
}

/// `GET /v1/drivers/nearby`
pub async fn nearby(
    State(state): State<AppState>,
    query: Result<Query<NearbyQuery>, QueryRejection>,
) -> Result<Json<Vec<NearbyDriver>>, ApiError> {
    let Query(query) = query?;
    let point = GeoPoint::new(query.lat, query.lng)?;
    let config = &state.config;
    let radius_km = query.radius_km.unwrap_or(config.matching.search_radius_km);
    if !radius_km.is_finite() || radius_km <= 0.0 {
        return Err(ApiError::Validation("radius_km must be positive".into()));
    }
    let limit = query
        .limit
        .unwrap_or(config.matching.candidate_limit)
        .clamp(1, MAX_NEARBY_LIMIT);
    let drivers = state.services.store.query_nearby(&point, radius_km, limit)?;
    Ok(Json(drivers))
}
