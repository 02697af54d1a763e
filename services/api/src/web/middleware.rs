//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use flyer_core::ports::PortError;
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use crate::web::state::AppState;

/// Header carrying the authenticated user's id, set by the upstream identity proxy.
pub const USER_HEADER: &str = "x-user-id";

/// Middleware that resolves the `x-user-id` header to a known user.
///
/// If valid, inserts the `User` into request extensions for handlers to use.
/// A missing, malformed or unknown id returns 401 Unauthorized.
pub async fn require_user(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let user_id = req
        .headers()
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let user = state.users.get_user(user_id).await.map_err(|e| match e {
        PortError::NotFound(_) => {
            warn!(%user_id, "Request from unknown user");
            StatusCode::UNAUTHORIZED
        }
        other => {
            error!("Failed to resolve user {}: {:?}", user_id, other);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    })?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
