//! Error responses.
//!
//! # Design Decisions
//! - Every failure leaves as `{"error": <code>, "message": <text>}`
//! - Status codes separate "nobody free" (200 outcome) from "system busy" (503)
//! - Internal failures log the detail and return a generic message

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::IdentityError;
use crate::ledger::LedgerError;
use crate::location::GeoError;
use crate::matching::DispatchError;
use crate::storage::StoreError;

/// JSON error body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// Errors returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("rate limit exceeded")]
    RateLimited,
}

impl From<GeoError> for ApiError {
    fn from(err: GeoError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Identity(IdentityError::WrongRole(_)) => StatusCode::FORBIDDEN,
            ApiError::Identity(_) => StatusCode::UNAUTHORIZED,
            ApiError::Dispatch(e) => match e {
                DispatchError::Validation(_) => StatusCode::BAD_REQUEST,
                DispatchError::SelectionContention { .. } | DispatchError::Unavailable(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                DispatchError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Ledger(e) => match e {
                LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
                LedgerError::InvalidTransition { .. } => StatusCode::CONFLICT,
                LedgerError::Store(e) => store_status(e),
            },
            ApiError::Store(e) => store_status(e),
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
            ApiError::Identity(IdentityError::WrongRole(_)) => "forbidden",
            ApiError::Identity(_) => "unauthenticated",
            ApiError::Dispatch(e) => e.code(),
            ApiError::Ledger(LedgerError::NotFound(_)) => "not_found",
            ApiError::Ledger(LedgerError::InvalidTransition { .. }) => "invalid_transition",
            ApiError::Ledger(LedgerError::Store(e)) | ApiError::Store(e) => store_code(e),
            ApiError::RateLimited => "rate_limited",
        }
    }
}

fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::Unavailable(_) | StoreError::Timeout(_) | StoreError::LockTimeout(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        StoreError::DriverNotFound(_) | StoreError::RideNotFound(_) => StatusCode::NOT_FOUND,
        StoreError::DriverBusy(_) | StoreError::InvalidTransition { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn store_code(err: &StoreError) -> &'static str {
    match err {
        StoreError::Unavailable(_) => "store_unavailable",
        StoreError::Timeout(_) | StoreError::LockTimeout(_) => "store_busy",
        StoreError::DriverNotFound(_) | StoreError::RideNotFound(_) => "not_found",
        StoreError::DriverBusy(_) => "driver_busy",
        StoreError::InvalidTransition { .. } => "invalid_transition",
        _ => "internal_error",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Request failed");
            "internal error".to_string()
        } else {
            self.to_string()
        };
        let body = ErrorBody {
            error: self.code().to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}
