use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::websocket::{ChatRoom, UserConnection, WebSocketMessage};

#[derive(Clone)]
pub struct WebSocketManager {
    // Map of chat_id -> ChatRoom
    pub chat_rooms: Arc<DashMap<String, ChatRoom>>,
    // Map of user_id -> set of chat_ids they're connected to
    pub user_chats: Arc<DashMap<Uuid, Arc<DashMap<String, ()>>>>,
}

impl WebSocketManager {
    pub fn new() -> Self {
        Self {
            chat_rooms: Arc::new(DashMap::new()),
            user_chats: Arc::new(DashMap::new()),
        }
    }

    pub fn join_chat(
        &self,
        chat_id: &str,
        user_id: Uuid,
        sender: tokio::sync::mpsc::UnboundedSender<WebSocketMessage>,
    ) {
        let chat_room = self
            .chat_rooms
            .entry(chat_id.to_string())
            .or_insert_with(|| ChatRoom {
                chat_id: chat_id.to_string(),
                connections: Arc::new(DashMap::new()),
            });
        chat_room
            .connections
            .insert(user_id, UserConnection { user_id, sender });

        let user_chat_set = self
            .user_chats
            .entry(user_id)
            .or_insert_with(|| Arc::new(DashMap::new()));
        user_chat_set.insert(chat_id.to_string(), ());
        tracing::debug!("user {} joined room {}", user_id, chat_id);
    }

    pub fn leave_chat(&self, chat_id: &str, user_id: Uuid) {
        if let Some(chat_room) = self.chat_rooms.get(chat_id) {
            chat_room.connections.remove(&user_id);

            if let Some(user_chats) = self.user_chats.get(&user_id) {
                user_chats.remove(chat_id);
            }

            // Clean up empty chat room
            if chat_room.connections.is_empty() {
                drop(chat_room);
                self.chat_rooms
                    .remove_if(chat_id, |_, room| room.connections.is_empty());
            }
        }
        tracing::debug!("user {} left room {}", user_id, chat_id);
    }

    pub fn leave_all_chats(&self, user_id: Uuid) {
        if let Some((_, user_chats)) = self.user_chats.remove(&user_id) {
            for chat_id in user_chats.iter() {
                if let Some(chat_room) = self.chat_rooms.get(chat_id.key()) {
                    chat_room.connections.remove(&user_id);

                    if chat_room.connections.is_empty() {
                        drop(chat_room);
                        self.chat_rooms
                            .remove_if(chat_id.key(), |_, room| room.connections.is_empty());
                    }
                }
            }
        }
        tracing::debug!("user {} left all rooms", user_id);
    }

    pub async fn broadcast_to_chat(
        &self,
        chat_id: &str,
        message: WebSocketMessage,
        exclude_user: Option<Uuid>,
    ) {
        if let Some(chat_room) = self.chat_rooms.get(chat_id) {
            let mut dead = Vec::new();
            for connection in chat_room.connections.iter() {
                let user_id = *connection.key();

                // Skip excluded user (usually the sender)
                if exclude_user == Some(user_id) {
                    continue;
                }
                if connection.sender.send(message.clone()).is_err() {
                    dead.push(user_id);
                }
            }
            // Dead connections get swept here rather than mid-iteration.
            for user_id in dead {
                tracing::warn!("dropping dead connection for user {}", user_id);
                chat_room.connections.remove(&user_id);
            }
        }
    }

    pub async fn send_to_user(&self, user_id: Uuid, message: WebSocketMessage) -> bool {
        for chat_room in self.chat_rooms.iter() {
            if let Some(connection) = chat_room.connections.get(&user_id) {
                return match connection.sender.send(message) {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::warn!("failed to send to user {}: {}", user_id, e);
                        drop(connection);
                        chat_room.connections.remove(&user_id);
                        false
                    }
                };
            }
        }
        false
    }

    pub fn get_chat_users(&self, chat_id: &str) -> Vec<Uuid> {
        if let Some(chat_room) = self.chat_rooms.get(chat_id) {
            chat_room.connections.iter().map(|k| *k.key()).collect()
        } else {
            Vec::new()
        }
    }

    pub fn is_user_in_chat(&self, chat_id: &str, user_id: Uuid) -> bool {
        if let Some(chat_room) = self.chat_rooms.get(chat_id) {
            chat_room.connections.contains_key(&user_id)
        } else {
            false
        }
    }
}

impl Default for WebSocketManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Every listener and timer one connection owns, keyed by slot name.
/// Replacing a slot aborts whatever ran there before (this is what makes
/// switching the active chat or re-debouncing a search deterministic), and
/// dropping the whole set on any exit path tears everything down.
pub struct SubscriptionSet {
    tasks: HashMap<&'static str, JoinHandle<()>>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
        }
    }

    pub fn replace(&mut self, slot: &'static str, handle: JoinHandle<()>) {
        if let Some(previous) = self.tasks.insert(slot, handle) {
            previous.abort();
        }
    }

    pub fn cancel(&mut self, slot: &str) {
        if let Some(handle) = self.tasks.remove(slot) {
            handle.abort();
        }
    }
}

impl Default for SubscriptionSet {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SubscriptionSet {
    fn drop(&mut self) {
        for handle in self.tasks.values() {
            handle.abort();
        }
    }
}
