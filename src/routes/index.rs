use crate::app_state::AppState;
use axum::{routing::get, Router};

async fn health() -> &'static str {
    "ok"
}

pub fn index_route() -> Router<AppState> {
    Router::new().route("/", get(health))
}
