mod common;

use serde_json::Value;
use uuid::Uuid;

use cohort_backend::error::AppError;
use cohort_backend::models::chats::{Chat, ChatType};
use cohort_backend::queries::{chats, member_marker_path, message_log_path, messages};
use cohort_backend::store::TreeStore;

use common::{seed_user, stores};

async fn marker_set(tree: &dyn TreeStore, user_id: Uuid, chat_id: &str) -> bool {
    tree.get(&member_marker_path(user_id, chat_id))
        .await
        .unwrap()
        == Some(Value::Bool(true))
}

/// Membership bookkeeping is bidirectional: every participant has a marker,
/// and the chat record agrees.
async fn assert_membership_consistent(tree: &dyn TreeStore, chat: &Chat) {
    for &participant in &chat.participants {
        assert!(
            marker_set(tree, participant, &chat.id).await,
            "participant {} missing marker for {}",
            participant,
            chat.id
        );
    }
    for &admin in &chat.admins {
        assert!(chat.is_participant(admin), "admin {} not a participant", admin);
    }
}

#[tokio::test]
async fn individual_chat_creation_is_idempotent_both_directions() {
    let (tree, docs) = stores();
    let alice = seed_user(&docs, "Alice", "alice@example.com").await;
    let bob = seed_user(&docs, "Bob", "bob@example.com").await;

    let (from_alice, from_bob) = tokio::join!(
        chats::get_or_create_individual_chat(
            &tree,
            alice.id,
            alice.snapshot(),
            bob.id,
            bob.snapshot(),
        ),
        chats::get_or_create_individual_chat(
            &tree,
            bob.id,
            bob.snapshot(),
            alice.id,
            alice.snapshot(),
        ),
    );
    let from_alice = from_alice.unwrap();
    let from_bob = from_bob.unwrap();

    assert_eq!(from_alice.id, from_bob.id);
    assert_eq!(from_alice.chat_type, ChatType::Individual);
    assert_eq!(from_alice.participants.len(), 2);

    // Exactly one chat record exists.
    let all_chats = tree.get("chats").await.unwrap().unwrap();
    assert_eq!(all_chats.as_object().unwrap().len(), 1);

    let stored = chats::require_chat(&tree, &from_alice.id).await.unwrap();
    assert_membership_consistent(&tree, &stored).await;
}

#[tokio::test]
async fn chat_with_self_is_rejected() {
    let (tree, docs) = stores();
    let alice = seed_user(&docs, "Alice", "alice@example.com").await;

    let result = chats::get_or_create_individual_chat(
        &tree,
        alice.id,
        alice.snapshot(),
        alice.id,
        alice.snapshot(),
    )
    .await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));
}

#[tokio::test]
async fn group_requires_another_member() {
    let (tree, docs) = stores();
    let alice = seed_user(&docs, "Alice", "alice@example.com").await;

    let result = chats::create_group_chat(
        &tree,
        &docs,
        alice.id,
        alice.snapshot(),
        &[alice.id],
        Some("Solo".to_string()),
    )
    .await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));
}

#[tokio::test]
async fn group_creation_marks_every_participant() {
    let (tree, docs) = stores();
    let alice = seed_user(&docs, "Alice", "alice@example.com").await;
    let bob = seed_user(&docs, "Bob", "bob@example.com").await;
    let carol = seed_user(&docs, "Carol", "carol@example.com").await;

    let chat = chats::create_group_chat(
        &tree,
        &docs,
        alice.id,
        alice.snapshot(),
        &[bob.id, carol.id, bob.id],
        Some("Study".to_string()),
    )
    .await
    .unwrap();

    assert_eq!(chat.chat_type, ChatType::Group);
    assert_eq!(chat.participants.len(), 3);
    assert_eq!(chat.admins, vec![alice.id]);
    assert_eq!(chat.created_by, alice.id);
    assert_eq!(chat.participant_details[&bob.id].display_name, "Bob");
    assert_membership_consistent(&tree, &chat).await;

    let listed = chats::list_user_chats(&tree, bob.id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, chat.id);
}

#[tokio::test]
async fn rename_is_admin_gated() {
    let (tree, docs) = stores();
    let alice = seed_user(&docs, "Alice", "alice@example.com").await;
    let bob = seed_user(&docs, "Bob", "bob@example.com").await;

    let chat = chats::create_group_chat(
        &tree,
        &docs,
        alice.id,
        alice.snapshot(),
        &[bob.id],
        Some("Study".to_string()),
    )
    .await
    .unwrap();

    let denied = chats::rename_group(&tree, &chat.id, bob.id, "Hijacked").await;
    assert!(matches!(denied, Err(AppError::Forbidden(_))));
    let unchanged = chats::require_chat(&tree, &chat.id).await.unwrap();
    assert_eq!(unchanged.name.as_deref(), Some("Study"));

    let renamed = chats::rename_group(&tree, &chat.id, alice.id, "Study Group")
        .await
        .unwrap();
    assert_eq!(renamed.name.as_deref(), Some("Study Group"));
    assert!(renamed.updated_at >= chat.updated_at);
}

#[tokio::test]
async fn remove_member_cleans_marker_and_details() {
    let (tree, docs) = stores();
    let alice = seed_user(&docs, "Alice", "alice@example.com").await;
    let bob = seed_user(&docs, "Bob", "bob@example.com").await;
    let carol = seed_user(&docs, "Carol", "carol@example.com").await;

    let chat = chats::create_group_chat(
        &tree,
        &docs,
        alice.id,
        alice.snapshot(),
        &[bob.id, carol.id],
        None,
    )
    .await
    .unwrap();

    // Non-admin cannot remove anyone.
    let denied = chats::remove_member(&tree, &chat.id, bob.id, carol.id).await;
    assert!(matches!(denied, Err(AppError::Forbidden(_))));

    let updated = chats::remove_member(&tree, &chat.id, alice.id, bob.id)
        .await
        .unwrap();
    assert!(!updated.is_participant(bob.id));
    assert!(!updated.participant_details.contains_key(&bob.id));
    assert!(!marker_set(&tree, bob.id, &chat.id).await);
    assert_membership_consistent(&tree, &updated).await;
}

#[tokio::test]
async fn toggle_admin_promotes_demotes_and_guards_last_admin() {
    let (tree, docs) = stores();
    let alice = seed_user(&docs, "Alice", "alice@example.com").await;
    let bob = seed_user(&docs, "Bob", "bob@example.com").await;

    let chat = chats::create_group_chat(&tree, &docs, alice.id, alice.snapshot(), &[bob.id], None)
        .await
        .unwrap();

    // Sole admin cannot demote themselves.
    let denied = chats::toggle_admin(&tree, &chat.id, alice.id, alice.id).await;
    assert!(matches!(denied, Err(AppError::Forbidden(_))));

    let promoted = chats::toggle_admin(&tree, &chat.id, alice.id, bob.id)
        .await
        .unwrap();
    assert!(promoted.is_admin(bob.id));

    // Two admins now; either may demote the other.
    let demoted = chats::toggle_admin(&tree, &chat.id, bob.id, alice.id)
        .await
        .unwrap();
    assert!(!demoted.is_admin(alice.id));
    assert_eq!(demoted.admins, vec![bob.id]);

    // And the survivor is again protected.
    let denied = chats::toggle_admin(&tree, &chat.id, bob.id, bob.id).await;
    assert!(matches!(denied, Err(AppError::Forbidden(_))));
}

#[tokio::test]
async fn leaving_hands_admin_to_longest_standing_member() {
    let (tree, docs) = stores();
    let alice = seed_user(&docs, "Alice", "alice@example.com").await;
    let bob = seed_user(&docs, "Bob", "bob@example.com").await;
    let carol = seed_user(&docs, "Carol", "carol@example.com").await;

    let chat = chats::create_group_chat(
        &tree,
        &docs,
        alice.id,
        alice.snapshot(),
        &[bob.id, carol.id],
        None,
    )
    .await
    .unwrap();

    chats::leave_group(&tree, &chat.id, alice.id).await.unwrap();

    let remaining = chats::require_chat(&tree, &chat.id).await.unwrap();
    assert_eq!(remaining.participants, vec![bob.id, carol.id]);
    // Bob joined before carol, so bob inherits admin.
    assert_eq!(remaining.admins, vec![bob.id]);
    assert!(!marker_set(&tree, alice.id, &chat.id).await);
    assert_membership_consistent(&tree, &remaining).await;
}

#[tokio::test]
async fn last_participant_leaving_deletes_chat_and_log() {
    let (tree, docs) = stores();
    let alice = seed_user(&docs, "Alice", "alice@example.com").await;
    let bob = seed_user(&docs, "Bob", "bob@example.com").await;

    let chat = chats::create_group_chat(&tree, &docs, alice.id, alice.snapshot(), &[bob.id], None)
        .await
        .unwrap();
    messages::send_message(
        &tree,
        &chat.id,
        &alice,
        "hello",
        cohort_backend::models::messages::MessageType::Text,
    )
    .await
    .unwrap();

    chats::leave_group(&tree, &chat.id, bob.id).await.unwrap();
    assert!(chats::get_chat(&tree, &chat.id).await.unwrap().is_some());

    chats::leave_group(&tree, &chat.id, alice.id).await.unwrap();
    assert!(chats::get_chat(&tree, &chat.id).await.unwrap().is_none());
    assert!(tree
        .get(&message_log_path(&chat.id))
        .await
        .unwrap()
        .is_none());
    assert!(!marker_set(&tree, alice.id, &chat.id).await);
}

#[tokio::test]
async fn deleting_individual_chat_removes_everything_for_both_sides() {
    let (tree, docs) = stores();
    let alice = seed_user(&docs, "Alice", "alice@example.com").await;
    let bob = seed_user(&docs, "Bob", "bob@example.com").await;

    let chat = chats::get_or_create_individual_chat(
        &tree,
        alice.id,
        alice.snapshot(),
        bob.id,
        bob.snapshot(),
    )
    .await
    .unwrap();
    messages::send_message(
        &tree,
        &chat.id,
        &bob,
        "hey",
        cohort_backend::models::messages::MessageType::Text,
    )
    .await
    .unwrap();

    // An outsider cannot delete it.
    let mallory = seed_user(&docs, "Mallory", "mallory@example.com").await;
    let denied = chats::delete_individual_chat(&tree, &chat.id, mallory.id).await;
    assert!(matches!(denied, Err(AppError::Forbidden(_))));

    chats::delete_individual_chat(&tree, &chat.id, bob.id)
        .await
        .unwrap();
    assert!(chats::get_chat(&tree, &chat.id).await.unwrap().is_none());
    assert!(tree
        .get(&message_log_path(&chat.id))
        .await
        .unwrap()
        .is_none());
    assert!(!marker_set(&tree, alice.id, &chat.id).await);
    assert!(!marker_set(&tree, bob.id, &chat.id).await);

    assert!(chats::list_user_chats(&tree, alice.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn end_to_end_group_scenario() {
    let (tree, docs) = stores();
    let a = seed_user(&docs, "Ana", "ana@example.com").await;
    let b = seed_user(&docs, "Ben", "ben@example.com").await;

    let chat = chats::create_group_chat(
        &tree,
        &docs,
        a.id,
        a.snapshot(),
        &[b.id],
        Some("Study".to_string()),
    )
    .await
    .unwrap();

    let denied = chats::rename_group(&tree, &chat.id, b.id, "Renamed").await;
    assert!(matches!(denied, Err(AppError::Forbidden(_))));

    let renamed = chats::rename_group(&tree, &chat.id, a.id, "Study Group")
        .await
        .unwrap();
    assert_eq!(renamed.name.as_deref(), Some("Study Group"));

    chats::leave_group(&tree, &chat.id, b.id).await.unwrap();
    let remaining = chats::require_chat(&tree, &chat.id).await.unwrap();
    assert_eq!(remaining.participants, vec![a.id]);

    chats::leave_group(&tree, &chat.id, a.id).await.unwrap();
    assert!(chats::get_chat(&tree, &chat.id).await.unwrap().is_none());
    assert!(tree
        .get(&message_log_path(&chat.id))
        .await
        .unwrap()
        .is_none());
}
