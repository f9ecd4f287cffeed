//! KnowledgeSearch trait — retrieval-augmented context lookup.
//!
//! Retrieval is advisory: implementations log failures and return an empty
//! list rather than surfacing an error. The loop treats the result purely
//! as prompt context.

use async_trait::async_trait;

/// Approximate nearest-neighbor lookup over the documentation store.
#[async_trait]
pub trait KnowledgeSearch: Send + Sync {
    /// Return up to `limit` documentation chunks relevant to the query,
    /// best first. Never fails; errors degrade to an empty result.
    async fn search(&self, query: &str, limit: usize) -> Vec<String>;
}
