use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Identifies one client connection for on-disconnect bookkeeping.
pub type ConnectionId = Uuid;

/// A single mutation against the tree.
#[derive(Debug, Clone)]
pub enum TreeOp {
    /// Replace the node at `path` with `value`.
    Set { path: String, value: Value },
    /// Merge `fields` into the object at `path`, creating it if absent.
    Update {
        path: String,
        fields: Map<String, Value>,
    },
    /// Remove the subtree at `path`.
    Remove { path: String },
}

impl TreeOp {
    pub fn path(&self) -> &str {
        match self {
            TreeOp::Set { path, .. } => path,
            TreeOp::Update { path, .. } => path,
            TreeOp::Remove { path } => path,
        }
    }
}

/// A multi-path mutation that the store applies atomically: either every op
/// lands and subscribers observe the combined result, or nothing is written.
#[derive(Debug, Clone, Default)]
pub struct BatchWrite {
    ops: Vec<TreeOp>,
}

impl BatchWrite {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    pub fn set(mut self, path: impl Into<String>, value: Value) -> Self {
        self.ops.push(TreeOp::Set {
            path: path.into(),
            value,
        });
        self
    }

    pub fn update(mut self, path: impl Into<String>, fields: Map<String, Value>) -> Self {
        self.ops.push(TreeOp::Update {
            path: path.into(),
            fields,
        });
        self
    }

    pub fn remove(mut self, path: impl Into<String>) -> Self {
        self.ops.push(TreeOp::Remove { path: path.into() });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<TreeOp> {
        self.ops
    }
}

/// A live value listener on one subtree.
///
/// The current snapshot of the subtree arrives immediately after
/// subscription, then again after every mutation that touches it (`None`
/// when the subtree is absent). Dropping the subscription tears the listener
/// down; delivery stops on the next mutation at the latest.
pub struct TreeSubscription {
    pub(crate) rx: mpsc::UnboundedReceiver<Option<Value>>,
}

impl TreeSubscription {
    /// Next snapshot, or `None` once the store side has gone away.
    pub async fn next(&mut self) -> Option<Option<Value>> {
        self.rx.recv().await
    }
}

#[async_trait]
pub trait TreeStore: Send + Sync {
    /// Read the subtree at `path`, `None` if absent.
    async fn get(&self, path: &str) -> Result<Option<Value>>;

    async fn set(&self, path: &str, value: Value) -> Result<()>;

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<()>;

    async fn remove(&self, path: &str) -> Result<()>;

    /// Store-generated, roughly time-ordered unique id. Ids handed out by one
    /// process are strictly increasing in lexicographic order.
    fn push_id(&self) -> String;

    /// Apply every op in `batch` atomically.
    async fn commit(&self, batch: BatchWrite) -> Result<()>;

    /// Attach a value listener at `path`.
    async fn subscribe(&self, path: &str) -> TreeSubscription;

    /// Register an op to run automatically if `conn` is lost. One op per
    /// path: re-registering a path replaces the earlier op, so callers can
    /// re-arm with fresh values. Everything registered runs as one batch.
    async fn on_disconnect(&self, conn: ConnectionId, op: TreeOp);

    /// Drop `conn`'s pending on-disconnect ops without running them (graceful
    /// teardown already wrote its own state).
    async fn cancel_on_disconnect(&self, conn: ConnectionId);

    /// Signal that `conn` was lost; runs its registered ops.
    async fn connection_lost(&self, conn: ConnectionId);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn batch_collects_ops_in_order() {
        let batch = BatchWrite::new()
            .set("chats/c1", json!({"name": "x"}))
            .remove("chat-members/u1/c1");
        let ops = batch.into_ops();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].path(), "chats/c1");
        assert!(matches!(ops[1], TreeOp::Remove { .. }));
    }
}
