use crate::app_state::AppState;
use crate::handlers::v1::auth;
use axum::{routing::post, Router};

pub fn session_routes() -> Router<AppState> {
    Router::new().route("/", post(auth::establish_session).delete(auth::end_session))
}
