use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::http::request::Coordinates;
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::location::{DriverId, DriverProfile, DriverRecord};
use crate::storage::{DriverDirectory, PendingNotification, PendingStore};

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub store_online: bool,
    pub drivers: usize,
    pub available_drivers: usize,
    pub rides: usize,
    pub connected_drivers: usize,
    pub open_connections: u64,
    pub pending_notifications: usize,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelStatus {
    pub driver_id: DriverId,
    pub connection_id: String,
}

/// `POST /admin/drivers` body.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterDriver {
    pub driver_id: DriverId,
    #[serde(default)]
    pub profile: DriverProfile,
    pub position: Coordinates,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let store = &state.services.store;
    let drivers = store.list_drivers().unwrap_or_default();
    let online = store.is_online();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: if online { "operational" } else { "degraded" }.to_string(),
        store_online: online,
        available_drivers: drivers.iter().filter(|d| d.available).count(),
        drivers: drivers.len(),
        rides: store.ride_count().unwrap_or(0),
        connected_drivers: state.services.notifier.registry().len(),
        open_connections: state.connections.active_count(),
        pending_notifications: store.pending_count().unwrap_or(0),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

pub async fn get_channels(State(state): State<AppState>) -> Json<Vec<ChannelStatus>> {
    let mut channels: Vec<ChannelStatus> = state
        .services
        .notifier
        .registry()
        .connected_drivers()
        .into_iter()
        .map(|(driver_id, id)| ChannelStatus {
            driver_id,
            connection_id: id.to_string(),
        })
        .collect();
    channels.sort_by(|a, b| a.driver_id.cmp(&b.driver_id));
    Json(channels)
}

pub async fn get_pending(
    State(state): State<AppState>,
) -> Result<Json<Vec<PendingNotification>>, ApiError> {
    Ok(Json(state.services.store.all_pending()?))
}

pub async fn register_driver(
    State(state): State<AppState>,
    payload: Result<Json<RegisterDriver>, JsonRejection>,
) -> Result<Json<DriverRecord>, ApiError> {
    let Json(body) = payload?;
    if body.driver_id.as_str().trim().is_empty() {
        return Err(ApiError::Validation("driver_id must not be empty".into()));
    }
    let position = body.position.validate()?;
    let record = state
        .services
        .store
        .register_driver(&body.driver_id, body.profile, position)?;
    tracing::info!(driver_id = %record.id, "Driver registered");
    Ok(Json(record))
}
