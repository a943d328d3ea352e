pub mod chats;
pub mod messages;
pub mod presence;
pub mod users;

use anyhow::anyhow;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

// Tree-store layout. The membership index under `chat-members` is the
// reverse side of every chat's participant list; all lifecycle mutations
// keep both sides in one batch.

pub fn chat_path(chat_id: &str) -> String {
    format!("chats/{}", chat_id)
}

pub fn member_index_path(user_id: Uuid) -> String {
    format!("chat-members/{}", user_id)
}

pub fn member_marker_path(user_id: Uuid, chat_id: &str) -> String {
    format!("chat-members/{}/{}", user_id, chat_id)
}

pub fn message_log_path(chat_id: &str) -> String {
    format!("messages/{}", chat_id)
}

pub fn message_path(chat_id: &str, message_id: &str) -> String {
    format!("messages/{}/{}", chat_id, message_id)
}

pub fn presence_path(user_id: Uuid) -> String {
    format!("presence/{}", user_id)
}

pub(crate) fn encode<T: Serialize>(value: &T) -> AppResult<Value> {
    serde_json::to_value(value)
        .map_err(|e| AppError::InternalServerError(anyhow!("failed to encode record: {}", e)))
}

pub(crate) fn decode<T: DeserializeOwned>(value: Value) -> AppResult<T> {
    serde_json::from_value(value)
        .map_err(|e| AppError::InternalServerError(anyhow!("corrupt stored record: {}", e)))
}
