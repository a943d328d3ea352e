use anyhow::anyhow;
use chrono::Utc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::presence::{PresenceRecord, PresenceStatus};
use crate::store::tree::TreeOp;
use crate::store::{ConnectionId, TreeStore};

use super::{decode, encode, presence_path};

pub async fn set_presence(tree: &dyn TreeStore, user_id: Uuid, is_online: bool) -> AppResult<()> {
    let record = PresenceRecord {
        is_online,
        last_seen: Utc::now(),
        uid: user_id,
    };
    tree.set(&presence_path(user_id), encode(&record)?)
        .await
        .map_err(|e| {
            // The acting user never sees this; their record just goes stale
            // for everyone else until the next heartbeat lands.
            tracing::warn!("presence write failed for {}: {}", user_id, e);
            AppError::ServiceUnavailable(anyhow!("Failed to write presence"))
        })
}

/// Re-arm the offline write that fires if `conn` drops without a goodbye.
/// Called on connect and again on every heartbeat so the recorded
/// `last_seen` stays close to the moment the connection actually dies.
pub async fn arm_disconnect_write(
    tree: &dyn TreeStore,
    conn: ConnectionId,
    user_id: Uuid,
) -> AppResult<()> {
    let record = PresenceRecord {
        is_online: false,
        last_seen: Utc::now(),
        uid: user_id,
    };
    tree.on_disconnect(
        conn,
        TreeOp::Set {
            path: presence_path(user_id),
            value: encode(&record)?,
        },
    )
    .await;
    Ok(())
}

pub async fn get_record(tree: &dyn TreeStore, user_id: Uuid) -> AppResult<Option<PresenceRecord>> {
    let value = tree.get(&presence_path(user_id)).await.map_err(|e| {
        tracing::error!("presence fetch failed for {}: {}", user_id, e);
        AppError::ServiceUnavailable(anyhow!("Failed to fetch presence"))
    })?;
    value.map(decode).transpose()
}

/// Effective status for display: stored flag AND staleness window. A user
/// with no record at all has simply never been seen.
pub async fn get_status(tree: &dyn TreeStore, user_id: Uuid) -> AppResult<PresenceStatus> {
    Ok(match get_record(tree, user_id).await? {
        Some(record) => record.status_at(Utc::now()),
        None => PresenceStatus {
            is_online: false,
            last_seen_label: "Offline".to_string(),
        },
    })
}
