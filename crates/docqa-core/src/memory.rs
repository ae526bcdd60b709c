//! In-memory metadata store
//!
//! Used by tests and by single-process tools that do not need durable
//! document records.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::metadata::MetadataRepository;
use crate::{DocQaError, DocumentChunk, DocumentRecord, DocumentStatus, Result};

/// Metadata repository backed by process memory
#[derive(Default)]
pub struct InMemoryMetadataStore {
    documents: RwLock<HashMap<Uuid, DocumentRecord>>,
    chunks: RwLock<HashMap<Uuid, Vec<DocumentChunk>>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataRepository for InMemoryMetadataStore {
    async fn create_document(&self, doc: &DocumentRecord) -> Result<Uuid> {
        let mut documents = self.documents.write().await;
        if documents.contains_key(&doc.id) {
            return Err(DocQaError::DatabaseError(format!(
                "Document {} already exists",
                doc.id
            )));
        }
        documents.insert(doc.id, doc.clone());
        Ok(doc.id)
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<DocumentRecord>> {
        Ok(self.documents.read().await.get(&id).cloned())
    }

    async fn list_documents(&self, limit: i64, offset: i64) -> Result<Vec<DocumentRecord>> {
        let mut docs: Vec<_> = self.documents.read().await.values().cloned().collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(docs
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn update_status(&self, id: Uuid, status: DocumentStatus) -> Result<()> {
        let mut documents = self.documents.write().await;
        let doc = documents
            .get_mut(&id)
            .ok_or(DocQaError::DocumentNotFound(id))?;
        doc.status = status;
        doc.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_document(&self, id: Uuid) -> Result<bool> {
        self.chunks.write().await.remove(&id);
        Ok(self.documents.write().await.remove(&id).is_some())
    }

    async fn replace_chunks(&self, document_id: Uuid, chunks: &[DocumentChunk]) -> Result<()> {
        if let Some(stray) = chunks.iter().find(|c| c.document_id != document_id) {
            return Err(DocQaError::ValidationError(format!(
                "Chunk {} belongs to document {}, not {document_id}",
                stray.chunk_index, stray.document_id
            )));
        }

        let mut ordered = chunks.to_vec();
        ordered.sort_by_key(|c| c.chunk_index);
        self.chunks.write().await.insert(document_id, ordered);
        Ok(())
    }

    async fn get_chunk(
        &self,
        document_id: Uuid,
        chunk_index: u32,
    ) -> Result<Option<DocumentChunk>> {
        Ok(self
            .chunks
            .read()
            .await
            .get(&document_id)
            .and_then(|chunks| chunks.iter().find(|c| c.chunk_index == chunk_index))
            .cloned())
    }

    async fn get_chunks(&self, document_id: Uuid) -> Result<Vec<DocumentChunk>> {
        Ok(self
            .chunks
            .read()
            .await
            .get(&document_id)
            .cloned()
            .unwrap_or_default())
    }
}
