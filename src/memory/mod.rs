//! Scene memory: an archive of finished scenes, searchable by similarity.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  store()   ┌──────────────────┐
//! │  SceneStudio │──────────▶│   SceneMemory     │
//! └──────────────┘            │ (SQLite / memory) │
//!                             └────────┬─────────┘
//!                                      │ embed()
//!                             ┌────────▼─────────┐
//!                             │     Embedder      │
//!                             │ (OpenAI / hashing)│
//!                             └──────────────────┘
//! ```
//!
//! Failures here never fail a run; callers log and move on.

mod embed;
mod sqlite;
mod store;
mod types;

pub use embed::{Embedder, EmbeddingClient, HashingEmbedder};
pub use sqlite::SqliteSceneStore;
pub use store::{InMemorySceneStore, SceneMemory};
pub use types::*;

use std::sync::Arc;

use crate::config::Config;

/// Open the persistent scene archive described by `config`.
///
/// Returns `None` when memory is disabled or the archive cannot be opened.
pub async fn open_memory(config: &Config) -> Option<Arc<dyn SceneMemory>> {
    if !config.memory.enabled {
        tracing::info!("Memory system disabled by configuration");
        return None;
    }

    let embedder = Arc::new(
        EmbeddingClient::new(
            config.openai.api_key.clone(),
            config.openai.base_url.clone(),
            config.memory.embed_model.clone(),
        )
        .with_timeout(config.request_timeout),
    );

    match SqliteSceneStore::open(&config.memory.persist_dir, embedder).await {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            tracing::warn!("Could not initialize memory system: {}", e);
            None
        }
    }
}
