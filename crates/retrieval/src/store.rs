//! pgvector documentation store.
//!
//! Two physical tables are consulted in order: `{table}_new` first, then
//! the named fallback. If the new table returns any rows, it wins.
//! Similarity is `1 - cosine_distance`, computed with pgvector's `<=>`
//! operator; rows at or below the configured floor are excluded.

use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use meshpilot_core::error::RetrievalError;

/// Cosine top-k query interface over the documentation tables.
pub struct VectorStore {
    pool: PgPool,
    /// Fallback table name; the `_new` variant is derived from it.
    table: String,
    min_similarity: f32,
}

impl VectorStore {
    /// Connect to Postgres.
    pub async fn connect(
        database_url: &str,
        table: impl Into<String>,
        min_similarity: f32,
    ) -> Result<Self, RetrievalError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| RetrievalError::Storage(format!("Postgres connection failed: {e}")))?;

        info!("Connected to Postgres vector store");
        Ok(Self {
            pool,
            table: table.into(),
            min_similarity,
        })
    }

    /// Create from an existing pool (tests, shared pools).
    pub fn from_pool(pool: PgPool, table: impl Into<String>, min_similarity: f32) -> Self {
        Self {
            pool,
            table: table.into(),
            min_similarity,
        }
    }

    /// Top-k contents by cosine similarity, new table first.
    pub async fn top_k(
        &self,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<String>, RetrievalError> {
        let literal = vector_literal(embedding);
        let new_table = format!("{}_new", self.table);

        match self.query_table(&new_table, &literal, limit).await {
            Ok(rows) if !rows.is_empty() => {
                debug!(table = %new_table, count = rows.len(), "Retrieval hit");
                return Ok(rows);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(table = %new_table, error = %e, "New table query failed, trying fallback");
            }
        }

        let rows = self.query_table(&self.table, &literal, limit).await?;
        debug!(table = %self.table, count = rows.len(), "Retrieval fallback result");
        Ok(rows)
    }

    async fn query_table(
        &self,
        table: &str,
        embedding_literal: &str,
        limit: usize,
    ) -> Result<Vec<String>, RetrievalError> {
        // Table names come from config, not user input; they cannot be
        // bound as parameters so they are interpolated.
        let sql = format!(
            "SELECT content, 1 - (embedding <=> $1::vector) AS similarity \
             FROM {table} \
             WHERE 1 - (embedding <=> $1::vector) > $2 \
             ORDER BY similarity DESC \
             LIMIT $3"
        );

        let rows = sqlx::query(&sql)
            .bind(embedding_literal)
            .bind(self.min_similarity)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RetrievalError::Storage(format!("query on {table} failed: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|row| row.get::<String, _>("content"))
            .collect())
    }
}

/// Render an embedding as a pgvector literal: `[0.1,0.2,...]`.
pub fn vector_literal(embedding: &[f32]) -> String {
    let mut out = String::with_capacity(embedding.len() * 10 + 2);
    out.push('[');
    for (i, v) in embedding.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&format!("{v}"));
    }
    out.push(']');
    out
}
