use std::sync::Arc;

use tower_sessions::{MemoryStore, SessionManagerLayer};
use tracing_subscriber::EnvFilter;

use cohort_backend::app_state::AppState;
use cohort_backend::store::{InMemoryDocumentStore, InMemoryTreeStore};
use cohort_backend::websocket::manager::WebSocketManager;
use cohort_backend::{config, routes};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = match config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Error loading configuration: {}", e);
            std::process::exit(1);
        }
    };

    let state = AppState {
        tree: Arc::new(InMemoryTreeStore::new()),
        documents: Arc::new(InMemoryDocumentStore::new()),
        websocket_manager: WebSocketManager::new(),
    };

    let session_layer = SessionManagerLayer::new(MemoryStore::default()).with_secure(false);
    let app = routes::create_routes()
        .layer(session_layer)
        .with_state(state);

    let listener = match tokio::net::TcpListener::bind(&config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", config.bind_addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!("listening on {}", config.bind_addr);
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {}", e);
        std::process::exit(1);
    }
}
