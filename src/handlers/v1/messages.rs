use anyhow::anyhow;
use axum::response::IntoResponse;
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use tower_sessions::Session;

use crate::error::AppError;
use crate::handlers::session_user_id;
use crate::models::messages::MessageType;
use crate::models::websocket::WebSocketMessage;
use crate::queries::{chats, messages, users};
use crate::{app_state::AppState, error::AppResult};

pub async fn list_messages(
    State(state): State<AppState>,
    session: Session,
    Path(chat_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let user_id = session_user_id(&session).await?;

    let chat = chats::require_chat(state.tree.as_ref(), &chat_id).await?;
    if !chat.is_participant(user_id) {
        return Err(AppError::Forbidden(anyhow!("Not a member of this chat")));
    }

    let log = messages::list_messages(state.tree.as_ref(), &chat_id).await?;
    Ok((axum::http::StatusCode::OK, Json(serde_json::json!(log))))
}

fn default_message_type() -> MessageType {
    MessageType::Text
}

#[derive(Deserialize)]
pub struct SendMessagePayload {
    pub content: String,
    #[serde(default = "default_message_type")]
    pub message_type: MessageType,
}

pub async fn send_message(
    State(state): State<AppState>,
    session: Session,
    Path(chat_id): Path<String>,
    Json(payload): Json<SendMessagePayload>,
) -> AppResult<impl IntoResponse> {
    let user_id = session_user_id(&session).await?;

    let sender = users::require_user(state.documents.as_ref(), user_id).await?;
    let message = messages::send_message(
        state.tree.as_ref(),
        &chat_id,
        &sender,
        &payload.content,
        payload.message_type,
    )
    .await?;

    // Push to everyone with a live connection to this chat.
    state
        .websocket_manager
        .broadcast_to_chat(
            &chat_id,
            WebSocketMessage::Message {
                message: message.clone(),
            },
            None,
        )
        .await;

    Ok((axum::http::StatusCode::OK, Json(serde_json::json!(message))))
}

pub async fn mark_read(
    State(state): State<AppState>,
    session: Session,
    Path((chat_id, message_id)): Path<(String, String)>,
) -> AppResult<impl IntoResponse> {
    let user_id = session_user_id(&session).await?;

    messages::mark_message_read(state.tree.as_ref(), &chat_id, &message_id, user_id).await?;

    state
        .websocket_manager
        .broadcast_to_chat(
            &chat_id,
            WebSocketMessage::MessageRead {
                chat_id: chat_id.clone(),
                message_id,
                user_id,
            },
            Some(user_id),
        )
        .await;

    Ok((axum::http::StatusCode::OK, "marked read"))
}
