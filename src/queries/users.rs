use anyhow::anyhow;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::users::{PublicUser, UserRecord};
use crate::store::documents::prefix_end;
use crate::store::{DocumentStore, Query};

use super::{decode, encode};

pub const SEARCH_RESULT_CAP: usize = 8;
const FALLBACK_SCAN_LIMIT: usize = 50;

const USERS: &str = "users";

/// Ensure a directory record exists for an authenticated identity. First
/// sign-in creates the record; later sign-ins return the stored one
/// untouched, so profile edits survive re-authentication.
pub async fn upsert_on_auth(
    docs: &dyn DocumentStore,
    user_id: Uuid,
    email: &str,
    display_name: &str,
    avatar_url: Option<&str>,
) -> AppResult<UserRecord> {
    if let Some(existing) = get_user(docs, user_id).await? {
        return Ok(existing);
    }

    let now = Utc::now();
    let user = UserRecord {
        id: user_id,
        email: email.to_string(),
        display_name: display_name.to_string(),
        username: None,
        avatar_url: avatar_url.map(str::to_string),
        banner_url: None,
        bio: None,
        links: Vec::new(),
        skills: Vec::new(),
        display_name_lc: display_name.to_lowercase(),
        username_lc: None,
        created_at: now,
        updated_at: now,
    };
    docs.set(USERS, &user_id.to_string(), encode(&user)?)
        .await
        .map_err(|e| {
            tracing::error!("user upsert failed for {}: {}", user_id, e);
            AppError::ServiceUnavailable(anyhow!("Failed to create user record"))
        })?;
    Ok(user)
}

pub async fn get_user(docs: &dyn DocumentStore, user_id: Uuid) -> AppResult<Option<UserRecord>> {
    let value = docs.get(USERS, &user_id.to_string()).await.map_err(|e| {
        tracing::error!("user fetch failed for {}: {}", user_id, e);
        AppError::ServiceUnavailable(anyhow!("Failed to fetch user record"))
    })?;
    value.map(decode).transpose()
}

pub async fn require_user(docs: &dyn DocumentStore, user_id: Uuid) -> AppResult<UserRecord> {
    get_user(docs, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow!("Unknown user {}", user_id)))
}

/// Fields a profile edit may touch. `None` leaves a field as it is.
#[derive(Debug, Default, Clone)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
    pub banner_url: Option<String>,
    pub bio: Option<String>,
    pub links: Option<Vec<String>>,
    pub skills: Option<Vec<String>>,
}

pub async fn update_profile(
    docs: &dyn DocumentStore,
    user_id: Uuid,
    changes: ProfileUpdate,
) -> AppResult<UserRecord> {
    let mut user = require_user(docs, user_id).await?;

    if let Some(username) = changes.username {
        match &user.username {
            Some(current) if *current != username => {
                return Err(AppError::BadRequest(anyhow!(
                    "Username cannot be changed once set"
                )));
            }
            Some(_) => {}
            None => {
                user.username_lc = Some(username.to_lowercase());
                user.username = Some(username);
            }
        }
    }
    if let Some(display_name) = changes.display_name {
        user.display_name_lc = display_name.to_lowercase();
        user.display_name = display_name;
    }
    if let Some(avatar_url) = changes.avatar_url {
        user.avatar_url = Some(avatar_url);
    }
    if let Some(banner_url) = changes.banner_url {
        user.banner_url = Some(banner_url);
    }
    if let Some(bio) = changes.bio {
        user.bio = Some(bio);
    }
    if let Some(links) = changes.links {
        user.links = links;
    }
    if let Some(skills) = changes.skills {
        user.skills = skills;
    }
    user.updated_at = Utc::now();

    docs.set(USERS, &user_id.to_string(), encode(&user)?)
        .await
        .map_err(|e| {
            tracing::error!("profile update failed for {}: {}", user_id, e);
            AppError::ServiceUnavailable(anyhow!("Failed to update profile"))
        })?;
    Ok(user)
}

/// Partner-discovery search. Two indexed prefix queries (display name,
/// username); when those come back under the cap, a bounded scan with
/// substring matching fills in — the indexes are prefix-only, so the scan
/// is what catches mid-string hits.
pub async fn search_users(
    docs: &dyn DocumentStore,
    query_text: &str,
    exclude_id: Uuid,
) -> AppResult<Vec<PublicUser>> {
    let needle = query_text.trim().to_lowercase();
    if needle.is_empty() {
        return Ok(Vec::new());
    }

    let mut found: Vec<UserRecord> = Vec::new();
    for field in ["display_name_lc", "username_lc"] {
        let query = Query::new()
            .order_by(field)
            .start_at(json!(needle.clone()))
            .end_at(json!(prefix_end(&needle)))
            .limit(SEARCH_RESULT_CAP);
        let hits = docs.query(USERS, query).await.map_err(|e| {
            tracing::error!("user search query on {} failed: {}", field, e);
            AppError::ServiceUnavailable(anyhow!("Search failed"))
        })?;
        for hit in hits {
            found.push(decode(hit.data)?);
        }
    }

    if found.len() < SEARCH_RESULT_CAP {
        let scan = docs
            .query(USERS, Query::new().limit(FALLBACK_SCAN_LIMIT))
            .await
            .map_err(|e| {
                tracing::error!("user search fallback scan failed: {}", e);
                AppError::ServiceUnavailable(anyhow!("Search failed"))
            })?;
        for hit in scan {
            let user: UserRecord = decode(hit.data)?;
            let username_match = user
                .username_lc
                .as_deref()
                .is_some_and(|u| u.contains(&needle));
            if user.display_name_lc.contains(&needle)
                || username_match
                || user.email.to_lowercase().contains(&needle)
            {
                found.push(user);
            }
        }
    }

    let mut seen = std::collections::HashSet::new();
    found.retain(|user| user.id != exclude_id && seen.insert(user.id));
    found.sort_by(|a, b| a.display_name_lc.cmp(&b.display_name_lc));

    // Exact-prefix hits outrank substring-only hits; display name breaks
    // ties within each band. The sort above already ordered by name, and
    // the stable sort below preserves that within bands.
    found.sort_by_key(|user| {
        let prefix = user.display_name_lc.starts_with(&needle)
            || user
                .username_lc
                .as_deref()
                .is_some_and(|u| u.starts_with(&needle));
        !prefix
    });
    found.truncate(SEARCH_RESULT_CAP);

    Ok(found.iter().map(PublicUser::from).collect())
}
