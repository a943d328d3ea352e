use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, RwLock};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use ulid::Ulid;

use super::documents::{Document, DocumentStore, Filter, Query};
use super::tree::{BatchWrite, ConnectionId, TreeOp, TreeStore, TreeSubscription};

/// In-process implementation of the real-time tree store. Stands in for the
/// hosted collaborator in the dev server and the test suite; the whole tree
/// lives behind one write lock, which is what makes batch commits atomic.
pub struct InMemoryTreeStore {
    state: RwLock<TreeState>,
    ids: Mutex<ulid::Generator>,
}

struct TreeState {
    root: Value,
    subscribers: Vec<Subscriber>,
    disconnect_ops: HashMap<ConnectionId, BTreeMap<String, TreeOp>>,
}

// A dropped listener is detected by its closed channel and pruned on the
// next notification pass.
struct Subscriber {
    segments: Vec<String>,
    tx: mpsc::UnboundedSender<Option<Value>>,
}

fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn node_at<'a>(root: &'a Value, segments: &[String]) -> Option<&'a Value> {
    let mut node = root;
    for segment in segments {
        node = node.as_object()?.get(segment)?;
    }
    Some(node)
}

fn set_at(root: &mut Value, segments: &[String], value: Value) {
    let Some((last, parents)) = segments.split_last() else {
        *root = value;
        return;
    };
    let mut node = root;
    for segment in parents {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        node = node
            .as_object_mut()
            .expect("just coerced to object")
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Some(map) = node.as_object_mut() {
        map.insert(last.clone(), value);
    }
}

fn remove_at(root: &mut Value, segments: &[String]) {
    let Some((last, parents)) = segments.split_last() else {
        *root = Value::Object(Map::new());
        return;
    };
    let Some(parent) = node_at_mut(root, parents) else {
        return;
    };
    if let Some(map) = parent.as_object_mut() {
        map.remove(last);
    }
    // Prune now-empty ancestors so absent and empty subtrees are the same
    // observable state.
    for depth in (1..segments.len()).rev() {
        let (child, ancestors) = segments[..depth].split_last().expect("depth >= 1");
        let Some(node) = node_at_mut(root, ancestors) else {
            return;
        };
        let Some(map) = node.as_object_mut() else {
            return;
        };
        let child_empty = map
            .get(child)
            .is_some_and(|v| v.as_object().is_some_and(|m| m.is_empty()));
        if child_empty {
            map.remove(child);
        } else {
            break;
        }
    }
}

fn node_at_mut<'a>(root: &'a mut Value, segments: &[String]) -> Option<&'a mut Value> {
    let mut node = root;
    for segment in segments {
        node = node.as_object_mut()?.get_mut(segment)?;
    }
    Some(node)
}

fn update_at(root: &mut Value, segments: &[String], fields: Map<String, Value>) {
    match node_at_mut(root, segments) {
        Some(node) if node.is_object() => {
            let map = node.as_object_mut().expect("checked above");
            for (key, value) in fields {
                // A null field value deletes the key, mirroring the hosted
                // store's partial-update semantics.
                if value.is_null() {
                    map.remove(&key);
                } else {
                    map.insert(key, value);
                }
            }
        }
        _ => {
            let mut map = Map::new();
            for (key, value) in fields {
                if !value.is_null() {
                    map.insert(key, value);
                }
            }
            set_at(root, segments, Value::Object(map));
        }
    }
}

/// True when a mutation at `changed` is observable from a listener at
/// `listened`: one path is an ancestor of (or equal to) the other.
fn paths_overlap(changed: &[String], listened: &[String]) -> bool {
    let shorter = changed.len().min(listened.len());
    changed[..shorter] == listened[..shorter]
}

impl InMemoryTreeStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(TreeState {
                root: Value::Object(Map::new()),
                subscribers: Vec::new(),
                disconnect_ops: HashMap::new(),
            }),
            ids: Mutex::new(ulid::Generator::new()),
        }
    }

    fn apply_locked(state: &mut TreeState, ops: Vec<TreeOp>) {
        let changed: Vec<Vec<String>> = ops.iter().map(|op| split_path(op.path())).collect();
        for op in ops {
            match op {
                TreeOp::Set { path, value } => set_at(&mut state.root, &split_path(&path), value),
                TreeOp::Update { path, fields } => {
                    update_at(&mut state.root, &split_path(&path), fields)
                }
                TreeOp::Remove { path } => remove_at(&mut state.root, &split_path(&path)),
            }
        }
        // One notification pass per commit: each affected listener sees the
        // combined result, never an intermediate state.
        state.subscribers.retain(|sub| {
            if !changed.iter().any(|c| paths_overlap(c, &sub.segments)) {
                return true;
            }
            let snapshot = node_at(&state.root, &sub.segments).cloned();
            sub.tx.send(snapshot).is_ok()
        });
    }
}

impl Default for InMemoryTreeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TreeStore for InMemoryTreeStore {
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        Ok(node_at(&state.root, &split_path(path)).cloned())
    }

    async fn set(&self, path: &str, value: Value) -> Result<()> {
        self.commit(BatchWrite::new().set(path, value)).await
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<()> {
        self.commit(BatchWrite::new().update(path, fields)).await
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.commit(BatchWrite::new().remove(path)).await
    }

    fn push_id(&self) -> String {
        let mut ids = self.ids.lock().unwrap_or_else(|e| e.into_inner());
        ids.generate()
            .unwrap_or_else(|_| Ulid::new())
            .to_string()
    }

    async fn commit(&self, batch: BatchWrite) -> Result<()> {
        if batch.is_empty() {
            return Err(anyhow!("empty batch"));
        }
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        Self::apply_locked(&mut state, batch.into_ops());
        Ok(())
    }

    async fn subscribe(&self, path: &str) -> TreeSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let segments = split_path(path);
        // Initial snapshot before any further mutation can interleave.
        let _ = tx.send(node_at(&state.root, &segments).cloned());
        state.subscribers.push(Subscriber { segments, tx });
        TreeSubscription { rx }
    }

    async fn on_disconnect(&self, conn: ConnectionId, op: TreeOp) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state
            .disconnect_ops
            .entry(conn)
            .or_default()
            .insert(op.path().to_string(), op);
    }

    async fn cancel_on_disconnect(&self, conn: ConnectionId) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.disconnect_ops.remove(&conn);
    }

    async fn connection_lost(&self, conn: ConnectionId) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if let Some(ops) = state.disconnect_ops.remove(&conn) {
            if !ops.is_empty() {
                Self::apply_locked(&mut state, ops.into_values().collect());
            }
        }
    }
}

/// In-process document store: collections of JSON records with the query
/// subset the user directory needs (equality, order-by with range bounds,
/// limit).
pub struct InMemoryDocumentStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Value>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

fn field_of<'a>(doc: &'a Value, field: &str) -> Option<&'a Value> {
    doc.as_object()?.get(field)
}

fn value_cmp(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn set(&self, collection: &str, id: &str, value: Value) -> Result<()> {
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), value);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: Map<String, Value>) -> Result<()> {
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| anyhow!("no record {}/{}", collection, id))?;
        if !doc.is_object() {
            *doc = Value::Object(Map::new());
        }
        let map = doc.as_object_mut().expect("coerced above");
        for (key, value) in fields {
            if value.is_null() {
                map.remove(&key);
            } else {
                map.insert(key, value);
            }
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        if let Some(docs) = collections.get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }

    async fn query(&self, collection: &str, query: Query) -> Result<Vec<Document>> {
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut matches: Vec<Document> = docs
            .iter()
            .filter(|&(_, data)| {
                query.filters.iter().all(|filter| match filter {
                    Filter::Eq(field, expected) => field_of(data, field) == Some(expected),
                })
            })
            .map(|(id, data)| Document {
                id: id.clone(),
                data: data.clone(),
            })
            .collect();

        if let Some(order_field) = &query.order_by {
            // Records without the order field fall out of an ordered query,
            // matching the hosted store's index behavior.
            matches.retain(|doc| field_of(&doc.data, order_field).is_some());
            matches.sort_by(|a, b| {
                let left = field_of(&a.data, order_field).expect("retained above");
                let right = field_of(&b.data, order_field).expect("retained above");
                value_cmp(left, right)
            });
            if let Some(start) = &query.start_at {
                matches.retain(|doc| {
                    value_cmp(field_of(&doc.data, order_field).expect("retained above"), start)
                        != std::cmp::Ordering::Less
                });
            }
            if let Some(end) = &query.end_at {
                matches.retain(|doc| {
                    value_cmp(field_of(&doc.data, order_field).expect("retained above"), end)
                        != std::cmp::Ordering::Greater
                });
            }
        }

        if let Some(limit) = query.limit {
            matches.truncate(limit);
        }
        Ok(matches)
    }
}
