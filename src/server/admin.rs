//! Operator endpoints: dump and reset. Both are POSTs carrying a JSON body
//! (contents ignored) and require an administrator.

use axum::{
    extract::{Json, State},
    http::{header, HeaderMap},
    response::IntoResponse,
};

use super::state::AppState;
use crate::error::AdminError;

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), AdminError> {
    if state.authorizer.is_admin(headers) {
        Ok(())
    } else {
        Err(AdminError::Forbidden)
    }
}

/// Return the cleanup counter and every game as pretty JSON.
pub async fn dump_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(_body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, AdminError> {
    require_admin(&state, &headers)?;
    let encoded = state.registry.lock().await.dump()?;
    tracing::info!("dump called");
    tracing::debug!("{}", encoded);
    Ok(([(header::CONTENT_TYPE, "application/json")], encoded))
}

/// Drop every game, disconnecting whoever is still attached.
pub async fn reset_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(_body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, AdminError> {
    require_admin(&state, &headers)?;
    tracing::info!("reset called");
    state.registry.lock().await.reset().await;
    Ok(Json(serde_json::json!({ "ok": true })))
}
