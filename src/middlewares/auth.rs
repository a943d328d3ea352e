use anyhow::anyhow;
use axum::{extract::Request, middleware::Next, response::Response};
use tower_sessions::Session;

use crate::error::{AppError, AppResult};
use crate::models::sessions::UserSession;

pub async fn auth_middleware(session: Session, req: Request, next: Next) -> AppResult<Response> {
    match session.get::<UserSession>("user").await {
        Ok(Some(_user_session)) => Ok(next.run(req).await),
        Ok(None) => Err(AppError::Unauthorized(anyhow!("Not signed in"))),
        Err(e) => Err(AppError::InternalServerError(anyhow!(
            "Session lookup failed: {}",
            e
        ))),
    }
}
