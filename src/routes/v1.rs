pub mod chats;
pub mod presence;
pub mod session;
pub mod users;
pub mod websocket;

use crate::app_state::AppState;
use axum::Router;

pub fn v1_routes() -> Router<AppState> {
    Router::new()
        .nest("/session", session::session_routes())
        .nest("/users", users::users_routes())
        .nest("/chats", chats::chats_routes())
        .nest("/presence", presence::presence_routes())
        .merge(websocket::websocket_routes())
}
