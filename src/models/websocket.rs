use uuid::Uuid;

use super::chats::Chat;
use super::messages::{Message, MessageType};
use super::users::PublicUser;

/// Frames pushed to connected clients.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
#[serde(tag = "type")]
pub enum WebSocketMessage {
    #[serde(rename = "message")]
    Message { message: Message },
    #[serde(rename = "chat_list")]
    ChatList { chats: Vec<Chat> },
    #[serde(rename = "messages")]
    Messages {
        chat_id: String,
        messages: Vec<Message>,
    },
    #[serde(rename = "typing")]
    Typing {
        chat_id: String,
        user_id: Uuid,
        is_typing: bool,
    },
    #[serde(rename = "message_read")]
    MessageRead {
        chat_id: String,
        message_id: String,
        user_id: Uuid,
    },
    #[serde(rename = "presence")]
    Presence {
        user_id: Uuid,
        is_online: bool,
        last_seen_label: String,
    },
    #[serde(rename = "search_results")]
    SearchResults { results: Vec<PublicUser> },
    #[serde(rename = "user_joined")]
    UserJoined {
        chat_id: String,
        user_id: Uuid,
        username: String,
    },
    #[serde(rename = "user_left")]
    UserLeft {
        chat_id: String,
        user_id: Uuid,
        username: String,
    },
    #[serde(rename = "error")]
    Error { message: String },
    #[serde(rename = "pong")]
    Pong,
}

/// Payload of an inbound `send_message` frame.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct IncomingMessage {
    pub chat_id: String,
    pub content: String,
    pub message_type: MessageType,
}

#[derive(Debug, Clone)]
pub struct UserConnection {
    pub user_id: Uuid,
    pub sender: tokio::sync::mpsc::UnboundedSender<WebSocketMessage>,
}

#[derive(Debug, Clone)]
pub struct ChatRoom {
    pub chat_id: String,
    pub connections: std::sync::Arc<dashmap::DashMap<Uuid, UserConnection>>,
}
