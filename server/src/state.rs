use std::sync::Arc;

use crate::store::Store;
use crate::ws::{EventRouter, SessionRegistry};

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// Document store collaborator
    pub store: Arc<dyn Store>,
    /// Active WebSocket connections per user
    pub registry: Arc<SessionRegistry>,
    /// Best-effort event fan-out over the registry
    pub router: EventRouter,
    /// JWT signing secret (256-bit random key)
    pub jwt_secret: Vec<u8>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, jwt_secret: Vec<u8>) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let router = EventRouter::new(registry.clone());
        Self {
            store,
            registry,
            router,
            jwt_secret,
        }
    }
}
