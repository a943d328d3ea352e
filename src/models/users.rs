use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Directory record for one user, stored at `users/{id}` in the document
/// store. Created on first authentication, mutated by profile edits, never
/// hard-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    /// Immutable once set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    // Lowercase shadows of the searchable fields; the directory's range
    // queries are case-sensitive, so these are what the indexes run on.
    pub display_name_lc: String,
    // Absent (not null) when unset, so ordered queries on it skip the
    // record the way the hosted index would.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_lc: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn snapshot(&self) -> UserSnapshot {
        UserSnapshot {
            display_name: self.display_name.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

/// Denormalized {display name, avatar} pair embedded in chat records and
/// messages. A cache, not a live view: it refreshes when its owner sends a
/// message, so it can lag behind the live profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// The subset of a user record served to other users (search results,
/// partner discovery).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub display_name: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

impl From<&UserRecord> for PublicUser {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            display_name: user.display_name.clone(),
            username: user.username.clone(),
            avatar_url: user.avatar_url.clone(),
            bio: user.bio.clone(),
        }
    }
}
