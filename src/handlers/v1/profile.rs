use anyhow::anyhow;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use tower_sessions::Session;
use uuid::Uuid;
use validator::Validate;

use crate::{
    app_state::AppState,
    error::{AppError, AppResult},
    handlers::session_user_id,
    models::users::PublicUser,
    queries::users::{self, ProfileUpdate},
};

pub async fn get_profile(
    State(state): State<AppState>,
    session: Session,
    Path(user_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let session_id = session_user_id(&session).await?;

    let user_id = match user_id.parse::<Uuid>() {
        Ok(id) => id,
        Err(_) => return Err(AppError::BadRequest(anyhow!("Invalid user ID format"))),
    };

    let user = users::require_user(state.documents.as_ref(), user_id).await?;

    // Own profile comes back whole; anyone else sees the public subset.
    if session_id == user_id {
        Ok((
            axum::http::StatusCode::OK,
            axum::Json(serde_json::json!(user)),
        ))
    } else {
        Ok((
            axum::http::StatusCode::OK,
            axum::Json(serde_json::json!(PublicUser::from(&user))),
        ))
    }
}

#[derive(serde::Deserialize, Debug, Validate)]
pub struct ProfileUpdateData {
    #[validate(length(
        min = 1,
        max = 80,
        message = "Display name must be between 1 and 80 characters long"
    ))]
    pub display_name: Option<String>,
    #[validate(length(
        min = 3,
        max = 32,
        message = "Username must be between 3 and 32 characters long"
    ))]
    pub username: Option<String>,
    pub avatar_url: Option<String>,
    pub banner_url: Option<String>,
    #[validate(length(max = 500, message = "Bio is limited to 500 characters"))]
    pub bio: Option<String>,
    pub links: Option<Vec<String>>,
    pub skills: Option<Vec<String>>,
}

pub async fn update_profile(
    State(state): State<AppState>,
    session: Session,
    Path(user_id): Path<String>,
    axum::Json(mut profile_data): axum::Json<ProfileUpdateData>,
) -> AppResult<impl IntoResponse> {
    profile_data
        .validate()
        .map_err(|e| AppError::BadRequest(anyhow!("Invalid profile data: {}", e)))?;

    let session_id = session_user_id(&session).await?;

    let user_id = match user_id.parse::<Uuid>() {
        Ok(id) => id,
        Err(_) => return Err(AppError::BadRequest(anyhow!("Invalid user ID format"))),
    };
    if session_id != user_id {
        return Err(AppError::Forbidden(anyhow!(
            "You do not have permission to edit this profile"
        )));
    }

    // Trim everything textual; a display name that trims away entirely is
    // rejected rather than stored blank.
    if let Some(display_name) = &mut profile_data.display_name {
        *display_name = display_name.trim().to_string();
        if display_name.is_empty() {
            return Err(AppError::BadRequest(anyhow!("Display name cannot be empty")));
        }
    }
    if let Some(username) = &mut profile_data.username {
        *username = username.trim().to_string();
    }
    if let Some(avatar_url) = &mut profile_data.avatar_url {
        *avatar_url = avatar_url.trim().to_string();
    }
    if let Some(banner_url) = &mut profile_data.banner_url {
        *banner_url = banner_url.trim().to_string();
    }

    let updated = users::update_profile(
        state.documents.as_ref(),
        user_id,
        ProfileUpdate {
            display_name: profile_data.display_name,
            username: profile_data.username,
            avatar_url: profile_data.avatar_url,
            banner_url: profile_data.banner_url,
            bio: profile_data.bio,
            links: profile_data.links,
            skills: profile_data.skills,
        },
    )
    .await?;

    Ok((
        axum::http::StatusCode::OK,
        axum::Json(serde_json::json!(updated)),
    ))
}
