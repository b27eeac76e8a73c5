//! Presence endpoints and the activity middleware

use super::error::ApiError;
use super::extract::{party_from_headers, AuthenticatedUser};
use crate::state::AppState;
use axum::extract::rejection::PathRejection;
use axum::extract::{Path, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use axum::Json;
use marche_store::{Party, PresenceStatus};
use serde_json::{json, Value};
use tracing::debug;

pub async fn heartbeat(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<Json<Value>, ApiError> {
    let last_seen_at = state.service.presence().heartbeat(user_id).await?;
    Ok(Json(json!({ "last_seen_at": last_seen_at })))
}

pub async fn status(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<PresenceStatus>, ApiError> {
    let Path(user_id) = path.map_err(|e| ApiError::path_rejected("user_id", e))?;
    let status = state.service.presence().status(user_id).await?;
    Ok(Json(status))
}

/// Counts any authenticated request as activity. Failures here never fail
/// the request itself.
pub async fn touch_presence(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if state.touch_presence {
        if let Ok(Party::Known(user_id)) = party_from_headers(req.headers()) {
            if let Err(e) = state.service.presence().heartbeat(user_id).await {
                debug!("Skipped activity heartbeat for {}: {}", user_id, e);
            }
        }
    }
    next.run(req).await
}
