//! Similarity retrieval over a published document index

use std::sync::Arc;

use docqa_core::{DocQaError, Result, RetrievalResult};
use uuid::Uuid;

use crate::embedding::EmbeddingClient;
use crate::index::normalize_l2;
use crate::storage::IndexStore;

/// Default preview length in characters
pub const DEFAULT_PREVIEW_CHARS: usize = 200;

/// Retrieves the chunks of one document most similar to a question
pub struct Retriever {
    embedder: Arc<dyn EmbeddingClient>,
    store: IndexStore,
    preview_chars: usize,
}

impl Retriever {
    /// `embedder` must be the model the document was indexed with
    pub fn new(embedder: Arc<dyn EmbeddingClient>, store: IndexStore) -> Self {
        Self {
            embedder,
            store,
            preview_chars: DEFAULT_PREVIEW_CHARS,
        }
    }

    pub fn with_preview_chars(mut self, preview_chars: usize) -> Self {
        self.preview_chars = preview_chars;
        self
    }

    /// Top-`top_k` chunks by descending similarity
    ///
    /// Fails with `IndexNotFound` when the document has no published index.
    /// May return fewer than `top_k` results when the index is smaller.
    pub async fn retrieve(
        &self,
        document_id: Uuid,
        question: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>> {
        let store = self.store.clone();
        let (index, mapping) = tokio::task::spawn_blocking(move || store.load(document_id))
            .await
            .map_err(|e| DocQaError::StorageError(format!("Index load task failed: {e}")))??;

        if question.trim().is_empty() {
            return Err(DocQaError::ValidationError(
                "question must not be empty".to_string(),
            ));
        }
        if top_k == 0 || index.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = self.embedder.embed(question).await?;
        normalize_l2(&mut query);

        let neighbors = index.search(&query, top_k)?;

        let mut results = Vec::with_capacity(neighbors.len());
        for neighbor in neighbors.into_iter().filter(|n| n.is_match()) {
            let position = neighbor.position as usize;
            let text = mapping
                .get(position)
                .ok_or_else(|| DocQaError::IndexInconsistent {
                    document_id,
                    reason: format!("no mapping entry for vector {position}"),
                })?;

            results.push(RetrievalResult {
                vector_id: position,
                similarity: neighbor.score,
                text: text.to_string(),
                preview: preview(text, self.preview_chars),
            });
        }

        tracing::debug!(
            document_id = %document_id,
            top_k,
            hits = results.len(),
            "Retrieved chunks"
        );

        Ok(results)
    }
}

/// First `max_chars` characters of `text`
pub fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_counts_characters() {
        assert_eq!(preview("héllo wörld", 4), "héll");
        assert_eq!(preview("short", 200), "short");
        assert_eq!(preview("", 10), "");
    }
}
