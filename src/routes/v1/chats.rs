use crate::handlers::v1::{chats, messages};
use crate::{app_state::AppState, middlewares::auth::auth_middleware};
use axum::routing::{delete, get, patch, post};
use axum::{middleware, Router};

pub fn chats_routes() -> Router<AppState> {
    // Everything here requires a signed-in user; per-chat permissions are
    // enforced deeper down in the queries layer.
    Router::new()
        .route("/", get(chats::list_chats))
        .route("/direct", post(chats::create_direct_chat))
        .route("/group", post(chats::create_group_chat))
        .route("/{chat_id}", delete(chats::delete_chat))
        .route("/{chat_id}/name", patch(chats::rename_group))
        .route("/{chat_id}/leave", post(chats::leave_group))
        .route("/{chat_id}/members/{member_id}", delete(chats::remove_member))
        .route("/{chat_id}/admins/{member_id}", post(chats::toggle_admin))
        .route(
            "/{chat_id}/messages",
            get(messages::list_messages).post(messages::send_message),
        )
        .route(
            "/{chat_id}/messages/{message_id}/read",
            post(messages::mark_read),
        )
        .layer(middleware::from_fn(auth_middleware))
}
