//! Index construction: embed chunks in order and publish the artifacts

use std::sync::Arc;

use docqa_core::{DocQaError, Result};
use uuid::Uuid;

use crate::embedding::EmbeddingClient;
use crate::index::FlatIndex;
use crate::storage::{IdMapping, IndexStore};

/// Default number of chunks per embedding request
pub const DEFAULT_BATCH_SIZE: usize = 64;

/// An index and its mapping, built but not yet published
#[derive(Debug, Clone)]
pub struct BuiltIndex {
    pub index: FlatIndex,
    pub mapping: IdMapping,
}

impl BuiltIndex {
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Builds per-document flat indexes
pub struct IndexBuilder {
    embedder: Arc<dyn EmbeddingClient>,
    store: IndexStore,
    batch_size: usize,
}

impl IndexBuilder {
    pub fn new(embedder: Arc<dyn EmbeddingClient>, store: IndexStore) -> Self {
        Self {
            embedder,
            store,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Set the number of chunks sent per embedding request
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// Embed chunks and build an index in memory
    ///
    /// Vector `i` of the result is the embedding of `chunks[i]`. Empty input
    /// or a blank chunk is rejected before anything is embedded.
    pub async fn build(&self, chunks: &[String]) -> Result<BuiltIndex> {
        if chunks.is_empty() {
            return Err(DocQaError::UnsupportedInput(
                "cannot build an index from zero chunks".to_string(),
            ));
        }
        if let Some(position) = chunks.iter().position(|c| c.trim().is_empty()) {
            return Err(DocQaError::UnsupportedInput(format!(
                "chunk {position} is empty"
            )));
        }

        let mut index: Option<FlatIndex> = None;

        for batch in chunks.chunks(self.batch_size) {
            let vectors = self.embedder.embed_batch(batch).await?;
            if vectors.len() != batch.len() {
                return Err(DocQaError::EmbeddingError(format!(
                    "Embedding backend returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                )));
            }

            if index.is_none() {
                let dimension = vectors.first().map(Vec::len).unwrap_or_default();
                if dimension == 0 {
                    return Err(DocQaError::EmbeddingError(
                        "Embedding backend returned an empty vector".to_string(),
                    ));
                }
                index = Some(FlatIndex::new(dimension));
            }
            if let Some(target) = index.as_mut() {
                target.add(&vectors)?;
            }
        }

        let index = index.ok_or_else(|| {
            DocQaError::UnsupportedInput("cannot build an index from zero chunks".to_string())
        })?;

        tracing::debug!(
            chunks = chunks.len(),
            dimension = index.dimension(),
            model = self.embedder.model(),
            "Built flat index"
        );

        Ok(BuiltIndex {
            index,
            mapping: IdMapping::new(chunks.to_vec()),
        })
    }

    /// Build and durably publish a document's index; returns the vector count
    ///
    /// Nothing is written unless the whole build succeeds. A previous build for
    /// the same document is replaced, never merged.
    pub async fn build_and_publish(&self, document_id: Uuid, chunks: &[String]) -> Result<usize> {
        let built = self.build(chunks).await?;
        self.publish(document_id, built).await
    }

    /// Durably publish an index built by [`IndexBuilder::build`]
    pub async fn publish(&self, document_id: Uuid, built: BuiltIndex) -> Result<usize> {
        let count = built.len();

        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.save(document_id, &built.index, &built.mapping))
            .await
            .map_err(|e| DocQaError::StorageError(format!("Index publish task failed: {e}")))??;

        tracing::info!(document_id = %document_id, chunks = count, "Index published");
        Ok(count)
    }
}
