use crate::handlers::v1::presence;
use crate::{app_state::AppState, middlewares::auth::auth_middleware};
use axum::routing::{get, post};
use axum::{middleware, Router};

pub fn presence_routes() -> Router<AppState> {
    Router::new()
        .route("/heartbeat", post(presence::heartbeat))
        .route("/{user_id}", get(presence::get_presence))
        .layer(middleware::from_fn(auth_middleware))
}
