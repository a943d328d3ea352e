use anyhow::anyhow;
use axum::response::IntoResponse;
use axum::{extract::State, Json};
use serde::Deserialize;
use tower_sessions::Session;
use uuid::Uuid;
use validator::Validate;

use crate::app_state::AppState;
use crate::error::{AppError, AppResult};
use crate::models::sessions::UserSession;
use crate::queries::users;

/// Identity asserted by the external authentication provider. Verification
/// (password, federated token) happens upstream; this service records who
/// the session belongs to and makes sure a directory record exists.
#[derive(Deserialize, Validate)]
pub struct IdentityAssertion {
    pub user_id: Uuid,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 80))]
    pub display_name: String,
    pub avatar_url: Option<String>,
}

pub async fn establish_session(
    State(state): State<AppState>,
    session: Session,
    Json(mut payload): Json<IdentityAssertion>,
) -> AppResult<impl IntoResponse> {
    payload
        .validate()
        .map_err(|_| AppError::BadRequest(anyhow!("Invalid identity payload")))?;

    payload.display_name = payload.display_name.trim().to_string();
    if payload.display_name.is_empty() {
        return Err(AppError::BadRequest(anyhow!("Display name is required")));
    }

    let user = users::upsert_on_auth(
        state.documents.as_ref(),
        payload.user_id,
        &payload.email,
        &payload.display_name,
        payload.avatar_url.as_deref(),
    )
    .await?;

    session
        .insert(
            "user",
            UserSession {
                user_id: payload.user_id,
            },
        )
        .await
        .map_err(|e| AppError::InternalServerError(anyhow!("Failed to store session: {}", e)))?;

    Ok((axum::http::StatusCode::OK, Json(serde_json::json!(user))))
}

pub async fn end_session(session: Session) -> AppResult<impl IntoResponse> {
    session
        .flush()
        .await
        .map_err(|e| AppError::InternalServerError(anyhow!("Failed to clear session: {}", e)))?;
    Ok((axum::http::StatusCode::OK, "signed out"))
}
