mod common;

use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use tokio_test::assert_ok;

use cohort_backend::models::presence::PresenceRecord;
use cohort_backend::queries::{presence, presence_path, users};
use cohort_backend::store::tree::TreeOp;
use cohort_backend::store::{ConnectionId, TreeStore};

use common::{seed_user, seed_user_with_username, stores};

async fn write_record(tree: &dyn TreeStore, user_id: Uuid, is_online: bool, age_secs: i64) {
    let record = PresenceRecord {
        is_online,
        last_seen: Utc::now() - Duration::seconds(age_secs),
        uid: user_id,
    };
    tree.set(&presence_path(user_id), serde_json::to_value(&record).unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn fresh_online_record_reads_online() {
    let (tree, _docs) = stores();
    let user_id = Uuid::new_v4();

    tokio_test::assert_ok!(presence::set_presence(&tree, user_id, true).await);
    let status = presence::get_status(&tree, user_id).await.unwrap();
    assert!(status.is_online);
    assert_eq!(status.last_seen_label, "Online");
}

#[tokio::test]
async fn record_is_online_at_119s_and_stale_at_121s() {
    let (tree, _docs) = stores();
    let user_id = Uuid::new_v4();

    write_record(&tree, user_id, true, 119).await;
    let status = presence::get_status(&tree, user_id).await.unwrap();
    assert!(status.is_online);

    write_record(&tree, user_id, true, 121).await;
    let status = presence::get_status(&tree, user_id).await.unwrap();
    assert!(!status.is_online);
    assert_eq!(status.last_seen_label, "2m ago");
}

#[tokio::test]
async fn never_seen_user_reads_offline() {
    let (tree, _docs) = stores();
    let status = presence::get_status(&tree, Uuid::new_v4()).await.unwrap();
    assert!(!status.is_online);
    assert_eq!(status.last_seen_label, "Offline");
}

#[tokio::test]
async fn armed_disconnect_write_flips_presence_offline() {
    let (tree, _docs) = stores();
    let user_id = Uuid::new_v4();
    let conn = ConnectionId::new_v4();

    presence::set_presence(&tree, user_id, true).await.unwrap();
    presence::arm_disconnect_write(&tree, conn, user_id)
        .await
        .unwrap();

    // Ungraceful drop: the store runs the armed write.
    tree.connection_lost(conn).await;
    let record = presence::get_record(&tree, user_id).await.unwrap().unwrap();
    assert!(!record.is_online);
}

#[tokio::test]
async fn rearming_replaces_rather_than_stacking() {
    let (tree, _docs) = stores();
    let user_id = Uuid::new_v4();
    let conn = ConnectionId::new_v4();

    presence::arm_disconnect_write(&tree, conn, user_id)
        .await
        .unwrap();
    let first_armed = Utc::now();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    presence::arm_disconnect_write(&tree, conn, user_id)
        .await
        .unwrap();

    tree.connection_lost(conn).await;
    let record = presence::get_record(&tree, user_id).await.unwrap().unwrap();
    // The later arming's timestamp won.
    assert!(record.last_seen >= first_armed);

    // A graceful goodbye cancels the armed write entirely.
    let conn2 = ConnectionId::new_v4();
    tree.on_disconnect(
        conn2,
        TreeOp::Set {
            path: presence_path(user_id),
            value: json!({"is_online": false, "last_seen": Utc::now(), "uid": user_id}),
        },
    )
    .await;
    presence::set_presence(&tree, user_id, true).await.unwrap();
    tree.cancel_on_disconnect(conn2).await;
    tree.connection_lost(conn2).await;
    let record = presence::get_record(&tree, user_id).await.unwrap().unwrap();
    assert!(record.is_online);
}

#[tokio::test]
async fn search_ranks_prefix_matches_first() {
    let (_tree, docs) = stores();
    let alice = seed_user_with_username(&docs, "Alice Smith", "alice", "alice@example.com").await;
    let bob = seed_user_with_username(&docs, "Bob Alison", "bobA", "bob@example.com").await;
    let searcher = seed_user(&docs, "Searcher", "searcher@example.com").await;

    let results = users::search_users(&docs, "ali", searcher.id).await.unwrap();
    assert!(results.len() >= 2);
    assert_eq!(results[0].id, alice.id);
    assert!(results.iter().any(|r| r.id == bob.id));
}

#[tokio::test]
async fn search_excludes_caller_and_caps_results() {
    let (_tree, docs) = stores();
    let searcher = seed_user(&docs, "Zed Searcher", "zed@example.com").await;
    for i in 0..12 {
        seed_user(&docs, &format!("Zoe {:02}", i), &format!("zoe{}@example.com", i)).await;
    }

    let results = users::search_users(&docs, "zo", searcher.id).await.unwrap();
    assert_eq!(results.len(), users::SEARCH_RESULT_CAP);
    assert!(results.iter().all(|r| r.id != searcher.id));
    // Ties broken by display name.
    assert_eq!(results[0].display_name, "Zoe 00");
}

#[tokio::test]
async fn fallback_scan_finds_substring_and_email_matches() {
    let (_tree, docs) = stores();
    let searcher = seed_user(&docs, "Searcher", "searcher@example.com").await;
    let dana = seed_user(&docs, "Dana Brightwood", "dana@example.com").await;
    let eli = seed_user(&docs, "Eli Stone", "eli.keystone@mail.example.com").await;

    // "bright" is mid-string in dana's display name; the prefix indexes
    // miss it and the bounded scan catches it.
    let results = users::search_users(&docs, "right", searcher.id).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, dana.id);

    // Email substring only.
    let results = users::search_users(&docs, "keystone", searcher.id)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, eli.id);

    // Blank queries return nothing without touching the store.
    let results = users::search_users(&docs, "   ", searcher.id).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn username_is_immutable_once_set() {
    let (_tree, docs) = stores();
    let user = seed_user_with_username(&docs, "Fay", "fay", "fay@example.com").await;

    // Same value is a no-op, not an error.
    users::update_profile(
        &docs,
        user.id,
        users::ProfileUpdate {
            username: Some("fay".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let rejected = users::update_profile(
        &docs,
        user.id,
        users::ProfileUpdate {
            username: Some("fay2".to_string()),
            ..Default::default()
        },
    )
    .await;
    assert!(matches!(
        rejected,
        Err(cohort_backend::error::AppError::BadRequest(_))
    ));
}

#[tokio::test]
async fn profile_edit_updates_search_shadow_fields() {
    let (_tree, docs) = stores();
    let user = seed_user(&docs, "Greta", "gw@example.com").await;
    let searcher = seed_user(&docs, "Searcher", "searcher@example.com").await;

    users::update_profile(
        &docs,
        user.id,
        users::ProfileUpdate {
            display_name: Some("Henrietta".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let by_new = users::search_users(&docs, "Henr", searcher.id).await.unwrap();
    assert_eq!(by_new.len(), 1);
    assert_eq!(by_new[0].id, user.id);

    let by_old = users::search_users(&docs, "Greta", searcher.id).await.unwrap();
    assert!(by_old.is_empty());
}
