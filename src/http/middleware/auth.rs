//! Caller identity middleware.
//! Resolves the request credential and attaches the `Caller`.

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, Request},
    middleware::Next,
    response::Response,
};

use crate::http::request::TokenQuery;
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::identity::{bearer_token, Caller, IdentityError, Role};

/// `Authorization: Bearer <token>` first, then `?token=`.
fn credential(request: &Request<Body>) -> Option<String> {
    let from_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .map(str::to_string);
    from_header.or_else(|| {
        Query::<TokenQuery>::try_from_uri(request.uri())
            .ok()
            .and_then(|Query(q)| q.token)
            .filter(|t| !t.is_empty())
    })
}

pub async fn identity_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let credential = credential(&request).ok_or(IdentityError::MissingCredential)?;
    let caller = state.services.identity.resolve_caller(&credential).map_err(|e| {
        tracing::debug!(path = %request.uri().path(), error = %e, "Caller rejected");
        e
    })?;
    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}

pub fn require_role(caller: &Caller, role: Role) -> Result<(), ApiError> {
    if caller.role == role {
        Ok(())
    } else {
        Err(IdentityError::WrongRole(role).into())
    }
}
