//! Authentication middleware
//!
//! Resolves the bearer token (if any) into a `Caller` extension. A missing
//! header yields an anonymous caller; a present but bad token is rejected.

use crate::auth::Caller;
use crate::error::AppError;
use crate::state::SharedState;
use axum::http::header::AUTHORIZATION;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

pub async fn identity_middleware(
    State(state): State<SharedState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let caller = match request.headers().get(AUTHORIZATION) {
        None => Caller::anonymous(),
        Some(value) => {
            let header = value
                .to_str()
                .map_err(|_| AppError::Unauthorized("Invalid authorization header".to_string()))?;
            let token = header
                .strip_prefix("Bearer ")
                .ok_or_else(|| AppError::Unauthorized("Invalid authorization format".to_string()))?;
            let claims = state.jwt.decode(token)?;
            Caller::authenticated(claims.identity())
        }
    };

    // Insert caller into request extensions for handlers to use
    request.extensions_mut().insert(caller);

    Ok(next.run(request).await)
}
