use anyhow::anyhow;
use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::chats::LastMessage;
use crate::models::messages::{Message, MessageType};
use crate::models::users::UserRecord;
use crate::store::{BatchWrite, TreeStore};

use super::chats::require_chat;
use super::{chat_path, decode, encode, message_log_path, message_path};

/// Append a message. The log entry, the chat's `last_message` mirror, and
/// the sender's participant-details refresh land in one batch, so readers
/// never observe one without the others.
pub async fn send_message(
    tree: &dyn TreeStore,
    chat_id: &str,
    sender: &UserRecord,
    content: &str,
    message_type: MessageType,
) -> AppResult<Message> {
    let content = content.trim();
    if content.is_empty() {
        return Err(AppError::BadRequest(anyhow!("Message cannot be empty")));
    }

    let mut chat = require_chat(tree, chat_id).await?;
    if !chat.is_participant(sender.id) {
        return Err(AppError::Forbidden(anyhow!("Not a member of this chat")));
    }

    let message = Message {
        id: tree.push_id(),
        chat_id: chat_id.to_string(),
        sender_id: sender.id,
        sender_name: sender.display_name.clone(),
        sender_avatar: sender.avatar_url.clone(),
        content: content.to_string(),
        message_type,
        timestamp: Utc::now(),
        read: false,
    };

    chat.last_message = Some(LastMessage {
        content: message.content.clone(),
        timestamp: message.timestamp,
        sender_id: sender.id,
        sender_name: sender.display_name.clone(),
    });
    chat.updated_at = message.timestamp;
    // Refresh-on-send: the denormalized snapshot catches up with the live
    // profile whenever its owner speaks.
    chat.participant_details.insert(sender.id, sender.snapshot());

    let batch = BatchWrite::new()
        .set(message_path(chat_id, &message.id), encode(&message)?)
        .set(chat_path(chat_id), encode(&chat)?);
    tree.commit(batch).await.map_err(|e| {
        tracing::error!("send message failed in {}: {}", chat_id, e);
        AppError::ServiceUnavailable(anyhow!("Failed to send message"))
    })?;
    Ok(message)
}

/// Order a message-log snapshot: timestamp ascending, push-id order breaking
/// ties. Entries that fail to decode are dropped with a warning rather than
/// poisoning the whole list.
pub fn collect_messages(snapshot: Option<Value>) -> Vec<Message> {
    let Some(Value::Object(entries)) = snapshot else {
        return Vec::new();
    };
    let mut messages: Vec<Message> = entries
        .into_iter()
        .filter_map(|(id, value)| match decode::<Message>(value) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::warn!("skipping undecodable message {}: {}", id, e);
                None
            }
        })
        .collect();
    messages.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.id.cmp(&b.id))
    });
    messages
}

pub async fn list_messages(tree: &dyn TreeStore, chat_id: &str) -> AppResult<Vec<Message>> {
    let snapshot = tree.get(&message_log_path(chat_id)).await.map_err(|e| {
        tracing::error!("message log fetch failed for {}: {}", chat_id, e);
        AppError::ServiceUnavailable(anyhow!("Failed to fetch messages"))
    })?;
    Ok(collect_messages(snapshot))
}

/// Flip a message's read flag. The message body itself stays immutable.
pub async fn mark_message_read(
    tree: &dyn TreeStore,
    chat_id: &str,
    message_id: &str,
    reader_id: Uuid,
) -> AppResult<()> {
    let chat = require_chat(tree, chat_id).await?;
    if !chat.is_participant(reader_id) {
        return Err(AppError::Forbidden(anyhow!("Not a member of this chat")));
    }
    let exists = tree
        .get(&message_path(chat_id, message_id))
        .await
        .map_err(|e| {
            tracing::error!("message fetch failed for {}/{}: {}", chat_id, message_id, e);
            AppError::ServiceUnavailable(anyhow!("Failed to fetch message"))
        })?
        .is_some();
    if !exists {
        return Err(AppError::NotFound(anyhow!("Message not found")));
    }

    let mut fields = Map::new();
    fields.insert("read".to_string(), Value::Bool(true));
    tree.update(&message_path(chat_id, message_id), fields)
        .await
        .map_err(|e| {
            tracing::error!("mark read failed for {}/{}: {}", chat_id, message_id, e);
            AppError::ServiceUnavailable(anyhow!("Failed to mark message read"))
        })
}
