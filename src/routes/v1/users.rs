use crate::handlers::v1::{profile, users};
use crate::{app_state::AppState, middlewares::auth::auth_middleware};
use axum::routing::get;
use axum::{middleware, Router};

pub fn users_routes() -> Router<AppState> {
    Router::new()
        .route("/search", get(users::search_users))
        .route(
            "/{user_id}/profile",
            get(profile::get_profile).patch(profile::update_profile),
        )
        .layer(middleware::from_fn(auth_middleware))
}
