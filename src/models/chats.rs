use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::users::UserSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Individual,
    Group,
}

/// Mirror of the newest entry in the chat's message log, kept on the chat
/// record so chat lists render without reading the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastMessage {
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub sender_id: Uuid,
    pub sender_name: String,
}

/// A conversation record, stored at `chats/{id}`.
///
/// Individual chats have exactly two participants and a deterministic id
/// (the sorted-joined pair), which is what makes creation idempotent. Group
/// ids are push ids. `participants` keeps join order; the head of the list
/// is the longest-standing member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub chat_type: ChatType,
    #[serde(default)]
    pub name: Option<String>,
    pub participants: Vec<Uuid>,
    pub participant_details: BTreeMap<Uuid, UserSnapshot>,
    #[serde(default)]
    pub admins: Vec<Uuid>,
    pub created_by: Uuid,
    #[serde(default)]
    pub last_message: Option<LastMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    /// Canonical id for the individual chat between two users, identical
    /// whichever side computes it.
    pub fn individual_chat_id(a: Uuid, b: Uuid) -> String {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        format!("{}_{}", low, high)
    }

    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.participants.contains(&user_id)
    }

    pub fn is_admin(&self, user_id: Uuid) -> bool {
        self.admins.contains(&user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn individual_chat_id_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(
            Chat::individual_chat_id(a, b),
            Chat::individual_chat_id(b, a)
        );
    }

    #[test]
    fn individual_chat_id_with_self_is_stable() {
        let a = Uuid::new_v4();
        assert_eq!(Chat::individual_chat_id(a, a), format!("{}_{}", a, a));
    }
}
