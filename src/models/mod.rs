pub mod chats;
pub mod messages;
pub mod presence;
pub mod sessions;
pub mod users;
pub mod websocket;
