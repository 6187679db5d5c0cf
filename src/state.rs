use std::sync::Arc;

use crate::config::AppConfig;
use crate::embedder::EmbeddingClient;
use crate::store::VectorStore;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<VectorStore>,
    pub embedder: Arc<EmbeddingClient>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let store = Arc::new(VectorStore::new(config.index_params()));
        let embedder = Arc::new(EmbeddingClient::new());
        Self {
            config,
            store,
            embedder,
        }
    }
}
