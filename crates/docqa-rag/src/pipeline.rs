//! Document QA service
//!
//! Owns the lifecycle glue around the retrieval core: registering documents,
//! turning extracted text into a published index plus chunk rows, and
//! answering questions from the chunks retrieved for them.
//!
//! Index builds for one document are serialized, and queries against that
//! document wait for an in-flight build to finish, so readers only ever see
//! a complete index, mapping and chunk set. A build that fails after its
//! artifacts were published is rolled back and the document marked failed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use docqa_core::{
    AnswerOutcome, AppConfig, DocQaError, DocumentChunk, DocumentRecord, DocumentStatus,
    LlmClient, MetadataRepository, RagConfig, Result, RetrievalResult, MAX_TOP_K,
};
use docqa_text::{normalize_text, ChunkConfig, SentenceChunker};
use docqa_vector::{
    create_embedding_client, BuiltIndex, EmbeddingClient, IndexBuilder, IndexStore, Retriever,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::answer::ContextAnswerer;
use crate::cache::{CacheConfig, CacheStatsReport, CachedEmbeddingClient, EmbeddingCache};
use crate::llm::create_llm_client;

/// A chunk that contributed context to an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerSource {
    pub chunk_id: Uuid,
    pub chunk_index: u32,
    pub similarity: f32,
    pub preview: String,
}

/// Answer to a question about one document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaAnswer {
    pub document_id: Uuid,
    pub question: String,
    pub outcome: AnswerOutcome,
    pub sources: Vec<AnswerSource>,
}

impl QaAnswer {
    pub fn answer(&self) -> &str {
        self.outcome.text()
    }
}

/// Document question-answering service
pub struct DocumentQaService {
    metadata: Arc<dyn MetadataRepository>,
    chunker: SentenceChunker,
    builder: IndexBuilder,
    retriever: Retriever,
    answerer: ContextAnswerer,
    index_store: IndexStore,
    embedding_cache: Option<EmbeddingCache>,
    default_top_k: usize,
    document_locks: Mutex<HashMap<Uuid, Arc<RwLock<()>>>>,
}

impl DocumentQaService {
    /// Assemble the service from explicit collaborators
    pub fn new(
        metadata: Arc<dyn MetadataRepository>,
        embedder: Arc<dyn EmbeddingClient>,
        llm: Arc<dyn LlmClient>,
        index_store: IndexStore,
        rag: &RagConfig,
    ) -> Self {
        Self {
            metadata,
            chunker: SentenceChunker::new(ChunkConfig::new(rag.chunk_size, rag.chunk_overlap)),
            builder: IndexBuilder::new(embedder.clone(), index_store.clone()),
            retriever: Retriever::new(embedder, index_store.clone())
                .with_preview_chars(rag.preview_chars),
            answerer: ContextAnswerer::new(llm)
                .with_max_contexts(rag.max_contexts)
                .with_excerpt_chars(rag.fallback_excerpt_chars),
            index_store,
            embedding_cache: None,
            default_top_k: rag.top_k,
            document_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Build providers, caches and storage from application configuration
    pub fn from_config(config: &AppConfig, metadata: Arc<dyn MetadataRepository>) -> Result<Self> {
        let cache = EmbeddingCache::with_config(&CacheConfig::from(&config.rag));
        let embedder: Arc<dyn EmbeddingClient> = Arc::new(CachedEmbeddingClient::new(
            create_embedding_client(&config.llm)?,
            cache.clone(),
        ));
        let llm = create_llm_client(&config.llm)?;

        tracing::info!(
            provider = ?config.llm.provider,
            model = %config.llm.model,
            embedding_model = %config.llm.embedding_model,
            index_dir = %config.storage.index_dir.display(),
            "Initializing document QA service"
        );

        let mut service = Self::new(
            metadata,
            embedder,
            llm,
            IndexStore::new(&config.storage.index_dir),
            &config.rag,
        )
        .with_embedding_batch_size(config.llm.embedding_batch_size)
        .with_generation_timeout(Duration::from_secs(config.llm.timeout_secs));
        service.embedding_cache = Some(cache);
        Ok(service)
    }

    pub fn with_embedding_batch_size(mut self, batch_size: usize) -> Self {
        self.builder = self.builder.with_batch_size(batch_size);
        self
    }

    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.answerer = self.answerer.with_timeout(timeout);
        self
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataRepository> {
        &self.metadata
    }

    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }

    /// Query embedding cache statistics, when a cache is configured
    pub fn cache_stats(&self) -> Option<CacheStatsReport> {
        self.embedding_cache.as_ref().map(|c| c.stats().report())
    }

    // ------------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------------

    /// Register a new document awaiting indexing
    pub async fn register_document(&self, title: &str) -> Result<DocumentRecord> {
        let title = title.trim();
        if title.is_empty() {
            return Err(DocQaError::ValidationError(
                "document title must not be empty".to_string(),
            ));
        }

        let record = DocumentRecord::new(title);
        self.metadata.create_document(&record).await?;
        tracing::info!(document_id = %record.id, title = %record.title, "Document registered");
        Ok(record)
    }

    pub async fn get_document(&self, id: Uuid) -> Result<DocumentRecord> {
        self.metadata
            .get_document(id)
            .await?
            .ok_or(DocQaError::DocumentNotFound(id))
    }

    pub async fn list_documents(&self, limit: i64, offset: i64) -> Result<Vec<DocumentRecord>> {
        self.metadata.list_documents(limit, offset).await
    }

    /// Persisted chunks of a document, in index order
    pub async fn chunks(&self, id: Uuid) -> Result<Vec<DocumentChunk>> {
        self.get_document(id).await?;
        self.metadata.get_chunks(id).await
    }

    /// Remove a document, its chunk rows and its index artifacts
    pub async fn delete_document(&self, id: Uuid) -> Result<()> {
        let lock = self.document_lock(id).await;
        let result = {
            let _guard = lock.write().await;
            self.delete_locked(id).await
        };
        self.release_lock(id, lock).await;
        result
    }

    async fn delete_locked(&self, id: Uuid) -> Result<()> {
        if !self.metadata.delete_document(id).await? {
            return Err(DocQaError::DocumentNotFound(id));
        }
        self.delete_artifacts(id).await?;

        tracing::info!(document_id = %id, "Document deleted");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Indexing
    // ------------------------------------------------------------------------

    /// Normalize, chunk and index extracted text; returns the chunk count
    ///
    /// Replaces any previous index and chunk set of the document. Text that
    /// yields no chunks marks the document failed.
    pub async fn index_document(&self, id: Uuid, text: &str) -> Result<usize> {
        let lock = self.document_lock(id).await;
        let result = {
            let _guard = lock.write().await;
            self.index_locked(id, text).await
        };
        self.release_lock(id, lock).await;
        result
    }

    async fn index_locked(&self, id: Uuid, text: &str) -> Result<usize> {
        self.get_document(id).await?;

        let normalized = normalize_text(text);
        let chunks = self.chunker.chunk(&normalized);
        if chunks.is_empty() {
            self.metadata
                .update_status(id, DocumentStatus::Failed)
                .await?;
            tracing::warn!(document_id = %id, "No usable text to index");
            return Err(DocQaError::EmptyExtraction(id));
        }

        // Nothing is written until the embeddings are complete
        let built = match self.builder.build(&chunks).await {
            Ok(built) => built,
            Err(e) => {
                tracing::error!(document_id = %id, error = %e, "Index build failed");
                return Err(e);
            }
        };

        match self.publish(id, built, chunks).await {
            Ok(count) => {
                tracing::info!(document_id = %id, chunks = count, "Document indexed");
                Ok(count)
            }
            Err(e) => {
                tracing::error!(document_id = %id, error = %e, "Index publish failed, rolling back");
                self.roll_back(id).await;
                Err(e)
            }
        }
    }

    /// Publish artifacts, then the matching chunk rows, then the status
    async fn publish(&self, id: Uuid, built: BuiltIndex, chunks: Vec<String>) -> Result<usize> {
        let count = self.builder.publish(id, built).await?;

        let rows: Vec<DocumentChunk> = chunks
            .into_iter()
            .enumerate()
            .map(|(i, content)| DocumentChunk::new(id, i as u32, content))
            .collect();
        self.metadata.replace_chunks(id, &rows).await?;
        self.metadata
            .update_status(id, DocumentStatus::Indexed)
            .await?;

        Ok(count)
    }

    /// Leave a document with no queryable index after a partial publish
    ///
    /// Artifacts may no longer match the chunk rows, so both the artifacts
    /// and the `indexed` status are withdrawn.
    async fn roll_back(&self, id: Uuid) {
        if let Err(e) = self.delete_artifacts(id).await {
            tracing::error!(document_id = %id, error = %e, "Failed to remove index artifacts");
        }
        if let Err(e) = self.metadata.update_status(id, DocumentStatus::Failed).await {
            tracing::error!(document_id = %id, error = %e, "Failed to mark document failed");
        }
    }

    async fn delete_artifacts(&self, id: Uuid) -> Result<bool> {
        let store = self.index_store.clone();
        tokio::task::spawn_blocking(move || store.delete(id))
            .await
            .map_err(|e| DocQaError::StorageError(format!("Index delete task failed: {e}")))?
    }

    // ------------------------------------------------------------------------
    // Retrieval and answering
    // ------------------------------------------------------------------------

    /// Chunks most similar to `question`, best first
    pub async fn retrieve(
        &self,
        id: Uuid,
        question: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>> {
        check_top_k(top_k)?;

        let lock = self.document_lock(id).await;
        let result = {
            let _guard = lock.read().await;
            self.retrieve_locked(id, question, top_k).await
        };
        self.release_lock(id, lock).await;
        result
    }

    /// Answer a question from the document's most relevant chunks
    ///
    /// Retrieved vector ids are resolved to chunk rows; rows that no longer
    /// exist are skipped, and a row whose text differs from the indexed text
    /// fails the request with `IndexInconsistent`.
    pub async fn ask(&self, id: Uuid, question: &str, top_k: usize) -> Result<QaAnswer> {
        check_top_k(top_k)?;

        let lock = self.document_lock(id).await;
        let resolved = {
            let _guard = lock.read().await;
            self.contexts_locked(id, question, top_k).await
        };
        // Generation does not touch the index
        self.release_lock(id, lock).await;
        let (contexts, sources) = resolved?;

        let outcome = self.answerer.answer(question, &contexts).await;

        tracing::info!(
            document_id = %id,
            contexts = contexts.len(),
            outcome = outcome.kind(),
            "Question answered"
        );

        Ok(QaAnswer {
            document_id: id,
            question: question.to_string(),
            outcome,
            sources,
        })
    }

    async fn retrieve_locked(
        &self,
        id: Uuid,
        question: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievalResult>> {
        let document = self.get_document(id).await?;
        if !document.is_indexed() {
            return Err(DocQaError::IndexNotFound(id));
        }
        self.retriever.retrieve(id, question, top_k).await
    }

    async fn contexts_locked(
        &self,
        id: Uuid,
        question: &str,
        top_k: usize,
    ) -> Result<(Vec<String>, Vec<AnswerSource>)> {
        let results = self.retrieve_locked(id, question, top_k).await?;
        self.resolve_chunks(id, results).await
    }

    async fn resolve_chunks(
        &self,
        id: Uuid,
        results: Vec<RetrievalResult>,
    ) -> Result<(Vec<String>, Vec<AnswerSource>)> {
        let mut contexts = Vec::with_capacity(results.len());
        let mut sources = Vec::with_capacity(results.len());

        for result in results {
            let Ok(chunk_index) = u32::try_from(result.vector_id) else {
                continue;
            };
            let Some(chunk) = self.metadata.get_chunk(id, chunk_index).await? else {
                tracing::warn!(document_id = %id, chunk_index, "No chunk row for vector, skipping");
                continue;
            };
            if chunk.content != result.text {
                return Err(DocQaError::IndexInconsistent {
                    document_id: id,
                    reason: format!("chunk {chunk_index} text differs from the indexed text"),
                });
            }

            sources.push(AnswerSource {
                chunk_id: chunk.id,
                chunk_index,
                similarity: result.similarity,
                preview: result.preview,
            });
            contexts.push(chunk.content);
        }

        Ok((contexts, sources))
    }

    /// Lock for one document, shared by every in-flight operation on it
    ///
    /// Entries held only by the table are swept here, which also reclaims
    /// entries left behind by cancelled operations.
    async fn document_lock(&self, id: Uuid) -> Arc<RwLock<()>> {
        let mut locks = self.document_locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(id).or_default().clone()
    }

    /// Drop the table entry once no other operation holds the lock
    async fn release_lock(&self, id: Uuid, lock: Arc<RwLock<()>>) {
        let mut locks = self.document_locks.lock().await;
        let idle = locks
            .get(&id)
            .is_some_and(|entry| Arc::ptr_eq(entry, &lock) && Arc::strong_count(entry) == 2);
        if idle {
            locks.remove(&id);
        }
    }
}

fn check_top_k(top_k: usize) -> Result<()> {
    if top_k > MAX_TOP_K {
        return Err(DocQaError::ValidationError(format!(
            "top_k must be at most {MAX_TOP_K}, got {top_k}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docqa_core::{InMemoryMetadataStore, Prompt};
    use docqa_vector::HashingEmbedding;

    struct EchoLlm;

    #[async_trait]
    impl LlmClient for EchoLlm {
        async fn generate(&self, prompt: &Prompt) -> Result<String> {
            Ok(prompt.user.clone())
        }

        fn model(&self) -> &str {
            "echo"
        }
    }

    fn service(dir: &tempfile::TempDir) -> DocumentQaService {
        DocumentQaService::new(
            Arc::new(InMemoryMetadataStore::new()),
            Arc::new(HashingEmbedding::new(64)),
            Arc::new(EchoLlm),
            IndexStore::new(dir.path()),
            &RagConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_lock_table_does_not_grow_with_unknown_ids() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir);

        for _ in 0..100 {
            let id = Uuid::new_v4();
            assert!(service.retrieve(id, "q", 5).await.is_err());
            assert!(service.ask(id, "q", 5).await.is_err());
            assert!(service.index_document(id, "Some text.").await.is_err());
            assert!(service.delete_document(id).await.is_err());
        }

        assert!(service.document_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_lock_table_empties_after_indexing_and_asking() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir);
        let doc = service.register_document("notes").await.unwrap();

        service
            .index_document(doc.id, "The launch is on Monday.")
            .await
            .unwrap();
        service.ask(doc.id, "When is the launch?", 3).await.unwrap();

        assert!(service.document_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_lock_entry_is_swept() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir);

        // Simulates an operation cancelled before releasing its entry
        drop(service.document_lock(Uuid::new_v4()).await);
        assert_eq!(service.document_locks.lock().await.len(), 1);

        let held = service.document_lock(Uuid::new_v4()).await;
        assert_eq!(service.document_locks.lock().await.len(), 1);
        drop(held);
    }

    #[test]
    fn test_check_top_k() {
        assert!(check_top_k(0).is_ok());
        assert!(check_top_k(MAX_TOP_K).is_ok());
        assert!(matches!(
            check_top_k(usize::MAX),
            Err(DocQaError::ValidationError(_))
        ));
    }
}
