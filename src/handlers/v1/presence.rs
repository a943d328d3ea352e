use anyhow::anyhow;
use axum::response::IntoResponse;
use axum::{
    extract::{Path, State},
    Json,
};
use tower_sessions::Session;
use uuid::Uuid;

use crate::error::AppError;
use crate::handlers::session_user_id;
use crate::queries::presence;
use crate::{app_state::AppState, error::AppResult};

/// Effective status: the stored flag filtered through the staleness window.
pub async fn get_presence(
    State(state): State<AppState>,
    session: Session,
    Path(user_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    session_user_id(&session).await?;

    let user_id = match user_id.parse::<Uuid>() {
        Ok(id) => id,
        Err(_) => return Err(AppError::BadRequest(anyhow!("Invalid user ID format"))),
    };

    let status = presence::get_status(state.tree.as_ref(), user_id).await?;
    Ok((axum::http::StatusCode::OK, Json(serde_json::json!(status))))
}

/// Manual heartbeat for clients without an open websocket.
pub async fn heartbeat(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<impl IntoResponse> {
    let user_id = session_user_id(&session).await?;
    presence::set_presence(state.tree.as_ref(), user_id, true).await?;
    Ok((axum::http::StatusCode::OK, "ok"))
}
