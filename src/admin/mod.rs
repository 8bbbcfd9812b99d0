//! Operational endpoints behind the admin API key.
//!
//! # Data Flow
//! ```text
//! /admin/* → admin_auth_middleware (Bearer <api_key>) → handlers
//! ```

pub mod auth;
pub mod handlers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/channels", get(get_channels))
        .route("/admin/pending", get(get_pending))
        .route("/admin/drivers", post(register_driver))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
