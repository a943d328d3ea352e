use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How often a live connection re-writes its presence record.
pub const HEARTBEAT_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);

/// A record older than this is treated as offline no matter what its flag
/// says. Must exceed the heartbeat interval with margin, or healthy clients
/// flicker offline.
pub const STALENESS_WINDOW_SECS: i64 = 120;

/// Stored at `presence/{userId}`; rewritten on connect, heartbeat, and
/// disconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
    pub uid: Uuid,
}

/// What other users are shown: the stored flag combined with the staleness
/// window, plus a human last-seen label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceStatus {
    pub is_online: bool,
    pub last_seen_label: String,
}

impl PresenceRecord {
    pub fn status_at(&self, now: DateTime<Utc>) -> PresenceStatus {
        let elapsed = (now - self.last_seen).num_seconds().max(0);
        let effectively_online = self.is_online && elapsed < STALENESS_WINDOW_SECS;
        PresenceStatus {
            is_online: effectively_online,
            last_seen_label: if effectively_online {
                "Online".to_string()
            } else {
                last_seen_label(elapsed)
            },
        }
    }
}

/// Fixed thresholds: <60s "Just now", then minutes, hours, days.
pub fn last_seen_label(elapsed_secs: i64) -> String {
    if elapsed_secs < 60 {
        "Just now".to_string()
    } else if elapsed_secs < 3600 {
        format!("{}m ago", elapsed_secs / 60)
    } else if elapsed_secs < 86400 {
        format!("{}h ago", elapsed_secs / 3600)
    } else {
        format!("{}d ago", elapsed_secs / 86400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(is_online: bool, last_seen: DateTime<Utc>) -> PresenceRecord {
        PresenceRecord {
            is_online,
            last_seen,
            uid: Uuid::new_v4(),
        }
    }

    #[test]
    fn online_inside_staleness_window() {
        let now = Utc::now();
        let status = record(true, now - Duration::seconds(119)).status_at(now);
        assert!(status.is_online);
        assert_eq!(status.last_seen_label, "Online");
    }

    #[test]
    fn stale_record_reads_offline_even_if_flag_says_online() {
        let now = Utc::now();
        let status = record(true, now - Duration::seconds(121)).status_at(now);
        assert!(!status.is_online);
        assert_eq!(status.last_seen_label, "2m ago");
    }

    #[test]
    fn label_thresholds() {
        assert_eq!(last_seen_label(0), "Just now");
        assert_eq!(last_seen_label(59), "Just now");
        assert_eq!(last_seen_label(300), "5m ago");
        assert_eq!(last_seen_label(7200), "2h ago");
        assert_eq!(last_seen_label(3 * 86400), "3d ago");
    }

    #[test]
    fn offline_flag_wins_even_when_fresh() {
        let now = Utc::now();
        let status = record(false, now - Duration::seconds(5)).status_at(now);
        assert!(!status.is_online);
        assert_eq!(status.last_seen_label, "Just now");
    }
}
