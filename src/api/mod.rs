//! HTTP API server for the pantry gateway

pub mod health;
pub mod items;
pub mod websocket;

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::catalog::ItemResolver;
use crate::config::Config;
use crate::db::{ActionLogRepo, DbPool, Embedder, ItemRepo};
use crate::pipeline::{PipelineDeps, SessionHandle};
use crate::Result;

/// Registry of live session pipelines, keyed by session ID
///
/// Owned by the API server. Entries are inserted on WebSocket connect and
/// removed synchronously on disconnect, which drops the pipeline's input
/// sender and tears the session task down.
#[derive(Default)]
pub struct SessionRegistry {
    inner: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionRegistry {
    /// Register a session, returning any handle it displaced
    pub async fn insert(&self, session_id: String, handle: SessionHandle) -> Option<SessionHandle> {
        self.inner.write().await.insert(session_id, handle)
    }

    /// Deregister a session
    pub async fn remove(&self, session_id: &str) -> Option<SessionHandle> {
        self.inner.write().await.remove(session_id)
    }

    /// Look up a live session's input handle
    pub async fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.inner.read().await.get(session_id).cloned()
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

/// Shared state for API handlers
pub struct ApiState {
    pub db: DbPool,
    pub items: ItemRepo,
    pub actions: ActionLogRepo,
    /// Present only when an embedding API key is configured
    pub embedder: Option<Arc<Embedder>>,
    /// Dependencies handed to each spawned session pipeline
    pub pipeline_deps: PipelineDeps,
    pub sessions: SessionRegistry,
}

/// API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    /// Assemble the server from configuration and an initialized database
    #[must_use]
    pub fn new(config: &Config, db: DbPool) -> Self {
        let items = ItemRepo::new(db.clone());
        let actions = ActionLogRepo::new(db.clone());

        let embedder = config.api_keys.openai.as_ref().and_then(|key| {
            match Embedder::with_model(key.clone(), config.embed_model.clone()) {
                Ok(embedder) => Some(Arc::new(embedder)),
                Err(e) => {
                    tracing::warn!(error = %e, "embedder unavailable, item resolution falls back to exact names");
                    None
                }
            }
        });

        let resolver = embedder
            .as_ref()
            .map(|embedder| ItemResolver::new(Arc::clone(embedder), items.clone()));

        let pipeline_deps = PipelineDeps {
            extractor: crate::nlp::select_extractor(config),
            resolver,
            items: items.clone(),
            actions: actions.clone(),
        };

        let state = Arc::new(ApiState {
            db,
            items,
            actions,
            embedder,
            pipeline_deps,
            sessions: SessionRegistry::default(),
        });

        Self {
            state,
            port: config.port,
        }
    }

    /// Build the router with all routes
    fn router(&self) -> Router {
        let router = Router::new()
            .nest("/api/items", items::router(self.state.clone()))
            .nest("/api/actions", items::actions_router(self.state.clone()))
            .nest("/ws", websocket::router(self.state.clone()))
            .merge(health::router());

        // CORS layer for cross-origin requests from the kitchen display
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        router.layer(cors).layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "API server listening");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registry_insert_and_remove() {
        let registry = SessionRegistry::default();
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        let handle = SessionHandle { input: tx };

        assert!(registry.insert("s1".to_string(), handle).await.is_none());
        assert_eq!(registry.len().await, 1);
        assert!(registry.get("s1").await.is_some());

        assert!(registry.remove("s1").await.is_some());
        assert_eq!(registry.len().await, 0);
        assert!(registry.remove("s1").await.is_none());
    }
}
