use std::sync::Arc;

use crate::store::{DocumentStore, TreeStore};
use crate::websocket::manager::WebSocketManager;

#[derive(Clone)]
pub struct AppState {
    pub tree: Arc<dyn TreeStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub websocket_manager: WebSocketManager,
}
