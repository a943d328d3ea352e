use uuid::Uuid;

use cohort_backend::models::users::UserRecord;
use cohort_backend::queries::users::{self, ProfileUpdate};
use cohort_backend::store::{InMemoryDocumentStore, InMemoryTreeStore};

pub fn stores() -> (InMemoryTreeStore, InMemoryDocumentStore) {
    (InMemoryTreeStore::new(), InMemoryDocumentStore::new())
}

pub async fn seed_user(docs: &InMemoryDocumentStore, display_name: &str, email: &str) -> UserRecord {
    users::upsert_on_auth(docs, Uuid::new_v4(), email, display_name, None)
        .await
        .expect("seed user")
}

pub async fn seed_user_with_username(
    docs: &InMemoryDocumentStore,
    display_name: &str,
    username: &str,
    email: &str,
) -> UserRecord {
    let user = seed_user(docs, display_name, email).await;
    users::update_profile(
        docs,
        user.id,
        ProfileUpdate {
            username: Some(username.to_string()),
            ..Default::default()
        },
    )
    .await
    .expect("set username")
}
