pub mod v1;

use anyhow::anyhow;
use tower_sessions::Session;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::sessions::UserSession;

/// The signed-in user behind this request. Every protected handler starts
/// here; the auth middleware has already rejected anonymous requests, so a
/// miss at this point is a session-store fault.
pub(crate) async fn session_user_id(session: &Session) -> AppResult<Uuid> {
    let user_session = session
        .get::<UserSession>("user")
        .await
        .map_err(|_| AppError::Unauthorized(anyhow!("Cannot find user session")))?;

    match user_session {
        Some(user_data) => Ok(user_data.user_id),
        None => Err(AppError::Unauthorized(anyhow!("Not signed in"))),
    }
}
