//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::{error::ApiError, security, web::state::AppState};
use chatbot_core::ports::PortError;

/// Middleware that validates the bearer token and extracts the user_id.
///
/// If valid, inserts the user_id into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // 1. Extract the Authorization header
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            PortError::Unauthorized("Missing or invalid access token".to_string())
        })?;

    // 2. Parse the bearer token
    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        PortError::Unauthorized("Missing or invalid access token".to_string())
    })?;

    // 3. Verify signature and expiry, recover the user id
    let user_id = security::decode_access_token(
        token,
        &state.config.jwt_secret,
        state.config.jwt_algorithm,
    )?;

    // 4. Insert user_id into request extensions
    req.extensions_mut().insert(user_id);

    // 5. Continue to the handler
    Ok(next.run(req).await)
}
