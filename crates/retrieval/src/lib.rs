//! MeshPilot retrieval — local embedding + pgvector documentation search.
//!
//! Retrieval is best-effort context for the reasoning loop: any encoder or
//! store failure is logged and degrades to an empty result, never a hard
//! stop.

pub mod embedder;
pub mod store;

pub use embedder::{EMBEDDING_DIM, Embedder};
pub use store::VectorStore;

use async_trait::async_trait;
use tracing::warn;

use meshpilot_config::RetrievalConfig;
use meshpilot_core::error::Error;
use meshpilot_core::retrieval::KnowledgeSearch;

/// The retrieval service: encoder + store behind [`KnowledgeSearch`].
pub struct RetrievalService {
    embedder: Embedder,
    store: VectorStore,
}

impl std::fmt::Debug for RetrievalService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalService").finish_non_exhaustive()
    }
}

impl RetrievalService {
    /// Build the service and verify the configured store dimension matches
    /// the encoder. A mismatch is fatal — silently returning wrong-sized
    /// vectors would make every query nonsense.
    pub async fn connect(config: &RetrievalConfig) -> Result<Self, Error> {
        if config.embedding_dim != EMBEDDING_DIM {
            return Err(Error::Config {
                message: format!(
                    "retrieval.embedding_dim is {} but the encoder produces {}",
                    config.embedding_dim, EMBEDDING_DIM
                ),
            });
        }
        let database_url = config.database_url.as_deref().ok_or_else(|| Error::Config {
            message: "retrieval.database_url is not set".into(),
        })?;
        let store =
            VectorStore::connect(database_url, &config.table, config.min_similarity).await?;
        Ok(Self {
            embedder: Embedder::new(),
            store,
        })
    }

    pub fn from_parts(embedder: Embedder, store: VectorStore) -> Self {
        Self { embedder, store }
    }
}

#[async_trait]
impl KnowledgeSearch for RetrievalService {
    async fn search(&self, query: &str, limit: usize) -> Vec<String> {
        let embedding = match self.embedder.embed(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Embedding failed, retrieval skipped");
                return Vec::new();
            }
        };

        match self.store.top_k(&embedding, limit).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "Vector store query failed, retrieval skipped");
                Vec::new()
            }
        }
    }
}
