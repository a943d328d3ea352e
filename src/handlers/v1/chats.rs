use anyhow::anyhow;
use axum::response::IntoResponse;
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use tower_sessions::Session;
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;
use crate::handlers::session_user_id;
use crate::queries::{chats, users};
use crate::{app_state::AppState, error::AppResult};

#[derive(serde::Deserialize)]
pub struct ChatRequestPayload {
    pub partner_id: Uuid,
}

// Individual chat between two users; finding and creating are the same call.
pub async fn create_direct_chat(
    State(state): State<AppState>,
    session: Session,
    Json(payload): Json<ChatRequestPayload>,
) -> AppResult<impl IntoResponse> {
    let user_id = session_user_id(&session).await?;

    let self_user = users::require_user(state.documents.as_ref(), user_id).await?;
    let partner = users::require_user(state.documents.as_ref(), payload.partner_id).await?;

    let chat = chats::get_or_create_individual_chat(
        state.tree.as_ref(),
        user_id,
        self_user.snapshot(),
        partner.id,
        partner.snapshot(),
    )
    .await?;

    Ok((axum::http::StatusCode::OK, Json(serde_json::json!(chat))))
}

#[derive(Deserialize, Validate)]
pub struct GroupChatRequestPayload {
    #[validate(length(max = 80, message = "Group name is limited to 80 characters"))]
    pub name: Option<String>,
    pub member_ids: Vec<Uuid>,
}

pub async fn create_group_chat(
    State(state): State<AppState>,
    session: Session,
    Json(payload): Json<GroupChatRequestPayload>,
) -> AppResult<impl IntoResponse> {
    let user_id = session_user_id(&session).await?;

    payload
        .validate()
        .map_err(|_| AppError::BadRequest(anyhow!("Invalid inputs")))?;

    let creator = users::require_user(state.documents.as_ref(), user_id).await?;
    let chat = chats::create_group_chat(
        state.tree.as_ref(),
        state.documents.as_ref(),
        user_id,
        creator.snapshot(),
        &payload.member_ids,
        payload.name,
    )
    .await?;

    Ok((axum::http::StatusCode::OK, Json(serde_json::json!(chat))))
}

pub async fn list_chats(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<impl IntoResponse> {
    let user_id = session_user_id(&session).await?;
    let chat_list = chats::list_user_chats(state.tree.as_ref(), user_id).await?;
    Ok((
        axum::http::StatusCode::OK,
        Json(serde_json::json!(chat_list)),
    ))
}

#[derive(Deserialize, Validate)]
pub struct RenamePayload {
    #[validate(length(
        min = 1,
        max = 80,
        message = "Group name must be between 1 and 80 characters long"
    ))]
    pub name: String,
}

pub async fn rename_group(
    State(state): State<AppState>,
    session: Session,
    Path(chat_id): Path<String>,
    Json(payload): Json<RenamePayload>,
) -> AppResult<impl IntoResponse> {
    let user_id = session_user_id(&session).await?;

    payload
        .validate()
        .map_err(|_| AppError::BadRequest(anyhow!("Invalid inputs")))?;

    let chat = chats::rename_group(state.tree.as_ref(), &chat_id, user_id, &payload.name).await?;
    Ok((axum::http::StatusCode::OK, Json(serde_json::json!(chat))))
}

pub async fn remove_member(
    State(state): State<AppState>,
    session: Session,
    Path((chat_id, member_id)): Path<(String, Uuid)>,
) -> AppResult<impl IntoResponse> {
    let user_id = session_user_id(&session).await?;
    let chat = chats::remove_member(state.tree.as_ref(), &chat_id, user_id, member_id).await?;
    Ok((axum::http::StatusCode::OK, Json(serde_json::json!(chat))))
}

pub async fn toggle_admin(
    State(state): State<AppState>,
    session: Session,
    Path((chat_id, member_id)): Path<(String, Uuid)>,
) -> AppResult<impl IntoResponse> {
    let user_id = session_user_id(&session).await?;
    let chat = chats::toggle_admin(state.tree.as_ref(), &chat_id, user_id, member_id).await?;
    Ok((axum::http::StatusCode::OK, Json(serde_json::json!(chat))))
}

pub async fn leave_group(
    State(state): State<AppState>,
    session: Session,
    Path(chat_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let user_id = session_user_id(&session).await?;
    chats::leave_group(state.tree.as_ref(), &chat_id, user_id).await?;
    state.websocket_manager.leave_chat(&chat_id, user_id);
    Ok((axum::http::StatusCode::OK, "left group"))
}

pub async fn delete_chat(
    State(state): State<AppState>,
    session: Session,
    Path(chat_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let user_id = session_user_id(&session).await?;
    chats::delete_individual_chat(state.tree.as_ref(), &chat_id, user_id).await?;
    state.websocket_manager.leave_chat(&chat_id, user_id);
    Ok((axum::http::StatusCode::OK, "chat deleted"))
}
