use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{
    app_state::AppState, error::AppResult, handlers::session_user_id, queries::users,
};

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

/// Chat-partner discovery. The caller never appears in their own results.
pub async fn search_users(
    State(state): State<AppState>,
    session: Session,
    Query(params): Query<SearchParams>,
) -> AppResult<impl IntoResponse> {
    let user_id = session_user_id(&session).await?;
    let results = users::search_users(state.documents.as_ref(), &params.q, user_id).await?;
    Ok((axum::http::StatusCode::OK, Json(serde_json::json!(results))))
}
