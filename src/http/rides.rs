//! Ride endpoints.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Extension, Json,
};

use crate::http::middleware::require_role;
use crate::http::request::{RideRequest, StatusUpdate};
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::identity::{Caller, Role};
use crate::ledger::{Ride, RideId};
use crate::matching::MatchOutcome;

/// `POST /v1/rides`
pub async fn request_ride(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<RideRequest>, JsonRejection>,
) -> Result<Json<MatchOutcome>, ApiError> {
    require_role(&caller, Role::Rider)?;
    let Json(body) = payload?;
    let pickup = body.pickup.validate()?;
    let dropoff = body.dropoff.map(|d| d.validate()).transpose()?;

    let outcome = state
        .services
        .dispatcher
        .request_ride(&caller, pickup, dropoff)
        .await?;
    Ok(Json(outcome))
}

/// `GET /v1/rides/{id}`
pub async fn get_ride(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Json<Ride>, ApiError> {
    let id = parse_ride_id(&id)?;
    let ride = state.services.ledger.get_ride(id, &caller)?;
    Ok(Json(ride))
}

/// `POST /v1/rides/{id}/status`
pub async fn update_status(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    payload: Result<Json<StatusUpdate>, JsonRejection>,
) -> Result<Json<Ride>, ApiError> {
    let id = parse_ride_id(&id)?;
    let Json(update) = payload?;
    let ride = state
        .services
        .ledger
        .advance(id, &caller, update.status)
        .await?;
    Ok(Json(ride))
}

fn parse_ride_id(raw: &str) -> Result<RideId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::Validation(format!("invalid ride id: {raw}")))
}
