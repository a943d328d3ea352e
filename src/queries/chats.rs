use std::collections::BTreeMap;

use anyhow::anyhow;
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::chats::{Chat, ChatType};
use crate::models::users::UserSnapshot;
use crate::store::{BatchWrite, DocumentStore, TreeStore};

use super::users::require_user;
use super::{chat_path, decode, encode, member_index_path, member_marker_path, message_log_path};

pub async fn get_chat(tree: &dyn TreeStore, chat_id: &str) -> AppResult<Option<Chat>> {
    let value = tree.get(&chat_path(chat_id)).await.map_err(|e| {
        tracing::error!("chat fetch failed for {}: {}", chat_id, e);
        AppError::ServiceUnavailable(anyhow!("Failed to fetch chat"))
    })?;
    value.map(decode).transpose()
}

pub async fn require_chat(tree: &dyn TreeStore, chat_id: &str) -> AppResult<Chat> {
    get_chat(tree, chat_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow!("Chat {} not found", chat_id)))
}

fn require_group(chat: &Chat) -> AppResult<()> {
    if chat.chat_type != ChatType::Group {
        return Err(AppError::BadRequest(anyhow!("Not a group chat")));
    }
    Ok(())
}

fn require_admin(chat: &Chat, actor_id: Uuid) -> AppResult<()> {
    if !chat.is_admin(actor_id) {
        return Err(AppError::Forbidden(anyhow!(
            "Only a group admin can do that"
        )));
    }
    Ok(())
}

/// The user's chats, newest activity first, resolved through the membership
/// index. An index entry whose chat record is already gone (deletion settles
/// index-first for the other side) is skipped.
pub async fn list_user_chats(tree: &dyn TreeStore, user_id: Uuid) -> AppResult<Vec<Chat>> {
    let index = tree.get(&member_index_path(user_id)).await.map_err(|e| {
        tracing::error!("membership index fetch failed for {}: {}", user_id, e);
        AppError::ServiceUnavailable(anyhow!("Failed to fetch chat list"))
    })?;
    let Some(Value::Object(entries)) = index else {
        return Ok(Vec::new());
    };

    let mut chats = Vec::with_capacity(entries.len());
    for chat_id in entries.keys() {
        if let Some(chat) = get_chat(tree, chat_id).await? {
            chats.push(chat);
        }
    }
    chats.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    Ok(chats)
}

/// Find or create the individual chat between two users. The deterministic
/// id makes this idempotent: both sides racing here converge on the same
/// record, and the loser's write only refreshes the body.
pub async fn get_or_create_individual_chat(
    tree: &dyn TreeStore,
    self_id: Uuid,
    self_snapshot: UserSnapshot,
    other_id: Uuid,
    other_snapshot: UserSnapshot,
) -> AppResult<Chat> {
    if self_id == other_id {
        return Err(AppError::BadRequest(anyhow!(
            "Cannot start a chat with yourself"
        )));
    }

    let chat_id = Chat::individual_chat_id(self_id, other_id);
    if let Some(existing) = get_chat(tree, &chat_id).await? {
        return Ok(existing);
    }

    let now = Utc::now();
    let mut participant_details = BTreeMap::new();
    participant_details.insert(self_id, self_snapshot);
    participant_details.insert(other_id, other_snapshot);
    let chat = Chat {
        id: chat_id.clone(),
        chat_type: ChatType::Individual,
        name: None,
        participants: vec![self_id, other_id],
        participant_details,
        admins: Vec::new(),
        created_by: self_id,
        last_message: None,
        created_at: now,
        updated_at: now,
    };

    let batch = BatchWrite::new()
        .set(chat_path(&chat_id), encode(&chat)?)
        .set(member_marker_path(self_id, &chat_id), Value::Bool(true))
        .set(member_marker_path(other_id, &chat_id), Value::Bool(true));
    commit(tree, batch, "create individual chat").await?;
    Ok(chat)
}

pub async fn create_group_chat(
    tree: &dyn TreeStore,
    docs: &dyn DocumentStore,
    creator_id: Uuid,
    creator_snapshot: UserSnapshot,
    member_ids: &[Uuid],
    name: Option<String>,
) -> AppResult<Chat> {
    let mut members: Vec<Uuid> = Vec::new();
    for &id in member_ids {
        if id != creator_id && !members.contains(&id) {
            members.push(id);
        }
    }
    if members.is_empty() {
        return Err(AppError::BadRequest(anyhow!(
            "Select at least one other member"
        )));
    }

    let now = Utc::now();
    let mut participants = vec![creator_id];
    let mut participant_details = BTreeMap::new();
    participant_details.insert(creator_id, creator_snapshot);
    for &member_id in &members {
        let member = require_user(docs, member_id).await?;
        participant_details.insert(member_id, member.snapshot());
        participants.push(member_id);
    }

    let chat_id = tree.push_id();
    let chat = Chat {
        id: chat_id.clone(),
        chat_type: ChatType::Group,
        name: name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
        participants: participants.clone(),
        participant_details,
        admins: vec![creator_id],
        created_by: creator_id,
        last_message: None,
        created_at: now,
        updated_at: now,
    };

    let mut batch = BatchWrite::new().set(chat_path(&chat_id), encode(&chat)?);
    for &participant in &participants {
        batch = batch.set(member_marker_path(participant, &chat_id), Value::Bool(true));
    }
    commit(tree, batch, "create group chat").await?;
    Ok(chat)
}

pub async fn rename_group(
    tree: &dyn TreeStore,
    chat_id: &str,
    actor_id: Uuid,
    new_name: &str,
) -> AppResult<Chat> {
    let mut chat = require_chat(tree, chat_id).await?;
    require_group(&chat)?;
    require_admin(&chat, actor_id)?;

    let new_name = new_name.trim();
    if new_name.is_empty() {
        return Err(AppError::BadRequest(anyhow!("Group name cannot be empty")));
    }

    chat.name = Some(new_name.to_string());
    chat.updated_at = Utc::now();
    let batch = BatchWrite::new().set(chat_path(chat_id), encode(&chat)?);
    commit(tree, batch, "rename group").await?;
    Ok(chat)
}

pub async fn remove_member(
    tree: &dyn TreeStore,
    chat_id: &str,
    actor_id: Uuid,
    target_id: Uuid,
) -> AppResult<Chat> {
    let mut chat = require_chat(tree, chat_id).await?;
    require_group(&chat)?;
    require_admin(&chat, actor_id)?;
    if target_id == actor_id {
        return Err(AppError::BadRequest(anyhow!(
            "Leave the group instead of removing yourself"
        )));
    }
    if !chat.is_participant(target_id) {
        return Err(AppError::NotFound(anyhow!("User is not in this group")));
    }

    chat.participants.retain(|&id| id != target_id);
    chat.participant_details.remove(&target_id);
    chat.admins.retain(|&id| id != target_id);
    chat.updated_at = Utc::now();

    let batch = BatchWrite::new()
        .set(chat_path(chat_id), encode(&chat)?)
        .remove(member_marker_path(target_id, chat_id));
    commit(tree, batch, "remove group member").await?;
    Ok(chat)
}

/// Promote or demote a member. A group with members always keeps at least
/// one admin: demoting the sole remaining admin is refused.
pub async fn toggle_admin(
    tree: &dyn TreeStore,
    chat_id: &str,
    actor_id: Uuid,
    target_id: Uuid,
) -> AppResult<Chat> {
    let mut chat = require_chat(tree, chat_id).await?;
    require_group(&chat)?;
    require_admin(&chat, actor_id)?;
    if !chat.is_participant(target_id) {
        return Err(AppError::NotFound(anyhow!("User is not in this group")));
    }

    if chat.is_admin(target_id) {
        if chat.admins.len() == 1 {
            return Err(AppError::Forbidden(anyhow!(
                "Cannot demote the last admin"
            )));
        }
        chat.admins.retain(|&id| id != target_id);
    } else {
        chat.admins.push(target_id);
    }
    chat.updated_at = Utc::now();

    let batch = BatchWrite::new().set(chat_path(chat_id), encode(&chat)?);
    commit(tree, batch, "toggle group admin").await?;
    Ok(chat)
}

/// Leave a group. The last participant out deletes the chat and its whole
/// message log; if the leaver was the last admin and members remain, the
/// longest-standing member is promoted.
pub async fn leave_group(tree: &dyn TreeStore, chat_id: &str, self_id: Uuid) -> AppResult<()> {
    let mut chat = require_chat(tree, chat_id).await?;
    require_group(&chat)?;
    if !chat.is_participant(self_id) {
        return Err(AppError::Forbidden(anyhow!("Not a member of this group")));
    }

    chat.participants.retain(|&id| id != self_id);
    chat.participant_details.remove(&self_id);
    chat.admins.retain(|&id| id != self_id);
    chat.updated_at = Utc::now();

    let batch = if chat.participants.is_empty() {
        BatchWrite::new()
            .remove(chat_path(chat_id))
            .remove(message_log_path(chat_id))
            .remove(member_marker_path(self_id, chat_id))
    } else {
        if chat.admins.is_empty() {
            let successor = chat.participants[0];
            chat.admins.push(successor);
            tracing::info!(
                "group {}: promoted {} after last admin left",
                chat_id,
                successor
            );
        }
        BatchWrite::new()
            .set(chat_path(chat_id), encode(&chat)?)
            .remove(member_marker_path(self_id, chat_id))
    };
    commit(tree, batch, "leave group").await
}

/// Delete an individual chat for both sides: markers, record, and message
/// log go together. There is no "delete for me only".
pub async fn delete_individual_chat(
    tree: &dyn TreeStore,
    chat_id: &str,
    self_id: Uuid,
) -> AppResult<()> {
    let chat = require_chat(tree, chat_id).await?;
    if chat.chat_type != ChatType::Individual {
        return Err(AppError::BadRequest(anyhow!("Not an individual chat")));
    }
    if !chat.is_participant(self_id) {
        return Err(AppError::Forbidden(anyhow!("Not a member of this chat")));
    }

    let mut batch = BatchWrite::new()
        .remove(chat_path(chat_id))
        .remove(message_log_path(chat_id));
    for &participant in &chat.participants {
        batch = batch.remove(member_marker_path(participant, chat_id));
    }
    commit(tree, batch, "delete individual chat").await
}

async fn commit(tree: &dyn TreeStore, batch: BatchWrite, action: &str) -> AppResult<()> {
    tree.commit(batch).await.map_err(|e| {
        tracing::error!("{} failed: {}", action, e);
        AppError::ServiceUnavailable(anyhow!("Failed to {}", action))
    })
}
