//! SQLite metadata store
//!
//! Persists document records and the chunk rows that back each vector
//! index position, using SQLx and SQLite.

use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{DocQaError, DocumentChunk, DocumentRecord, DocumentStatus, Result, StorageConfig};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY NOT NULL,
        title TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'registered',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS document_chunks (
        id TEXT PRIMARY KEY NOT NULL,
        document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
        chunk_index INTEGER NOT NULL,
        content TEXT NOT NULL,
        UNIQUE (document_id, chunk_index)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_chunks_document ON document_chunks(document_id)",
];

/// SQLite metadata store
pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

impl SqliteMetadataStore {
    /// Connect, creating the database file if it does not exist
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| DocQaError::DatabaseError(format!("Invalid database URL: {e}")))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| DocQaError::DatabaseError(format!("SQLite connection failed: {e}")))?;

        Ok(Self { pool })
    }

    /// Open the configured database and create its tables
    ///
    /// The parent directory of a file-backed database is created first.
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        if let Some(parent) = sqlite_file_parent(&config.database_url) {
            std::fs::create_dir_all(&parent).map_err(|e| {
                DocQaError::DatabaseError(format!(
                    "Failed to create database directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let store = Self::new(&config.database_url, config.max_connections).await?;
        store.migrate().await?;
        tracing::info!(database_url = %config.database_url, "Metadata store ready");
        Ok(store)
    }

    /// Create from an existing pool
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables if they are missing
    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| DocQaError::DatabaseError(format!("Migration failed: {e}")))?;
        }
        Ok(())
    }
}

/// Directory holding a `sqlite://` database file, if the URL names one
fn sqlite_file_parent(database_url: &str) -> Option<PathBuf> {
    let path = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next().unwrap_or_default();
    if path.is_empty() || path.starts_with(":memory:") {
        return None;
    }
    PathBuf::from(path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(PathBuf::from)
}

/// Document row from database
#[derive(Debug, FromRow)]
struct DocumentRow {
    id: String,
    title: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DocumentRow> for DocumentRecord {
    type Error = DocQaError;

    fn try_from(row: DocumentRow) -> Result<Self> {
        Ok(DocumentRecord {
            id: parse_uuid(&row.id)?,
            title: row.title,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Document chunk row from database
#[derive(Debug, FromRow)]
struct ChunkRow {
    id: String,
    document_id: String,
    chunk_index: i64,
    content: String,
}

impl TryFrom<ChunkRow> for DocumentChunk {
    type Error = DocQaError;

    fn try_from(row: ChunkRow) -> Result<Self> {
        Ok(DocumentChunk {
            id: parse_uuid(&row.id)?,
            document_id: parse_uuid(&row.document_id)?,
            chunk_index: u32::try_from(row.chunk_index).map_err(|_| {
                DocQaError::DatabaseError(format!("Chunk index out of range: {}", row.chunk_index))
            })?,
            content: row.content,
        })
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| DocQaError::DatabaseError(format!("Invalid id {raw}: {e}")))
}

/// Trait for metadata operations
#[async_trait]
pub trait MetadataRepository: Send + Sync {
    /// Store a new document record
    async fn create_document(&self, doc: &DocumentRecord) -> Result<Uuid>;

    /// Get document by ID
    async fn get_document(&self, id: Uuid) -> Result<Option<DocumentRecord>>;

    /// List documents, newest first
    async fn list_documents(&self, limit: i64, offset: i64) -> Result<Vec<DocumentRecord>>;

    /// Move a document to a new lifecycle state
    async fn update_status(&self, id: Uuid, status: DocumentStatus) -> Result<()>;

    /// Delete a document and its chunk rows; returns whether it existed
    async fn delete_document(&self, id: Uuid) -> Result<bool>;

    /// Atomically replace every chunk row of a document
    async fn replace_chunks(&self, document_id: Uuid, chunks: &[DocumentChunk]) -> Result<()>;

    /// Get the chunk stored at a vector position
    async fn get_chunk(&self, document_id: Uuid, chunk_index: u32)
        -> Result<Option<DocumentChunk>>;

    /// Get chunks for a document in index order
    async fn get_chunks(&self, document_id: Uuid) -> Result<Vec<DocumentChunk>>;
}

#[async_trait]
impl MetadataRepository for SqliteMetadataStore {
    async fn create_document(&self, doc: &DocumentRecord) -> Result<Uuid> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, title, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(doc.id.to_string())
        .bind(&doc.title)
        .bind(doc.status.as_str())
        .bind(doc.created_at)
        .bind(doc.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DocQaError::DatabaseError(format!("Failed to create document: {e}")))?;

        Ok(doc.id)
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<DocumentRecord>> {
        let row: Option<DocumentRow> = sqlx::query_as(
            r#"
            SELECT id, title, status, created_at, updated_at
            FROM documents
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DocQaError::DatabaseError(format!("Failed to get document: {e}")))?;

        row.map(DocumentRecord::try_from).transpose()
    }

    async fn list_documents(&self, limit: i64, offset: i64) -> Result<Vec<DocumentRecord>> {
        let rows: Vec<DocumentRow> = sqlx::query_as(
            r#"
            SELECT id, title, status, created_at, updated_at
            FROM documents
            ORDER BY created_at DESC, rowid DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DocQaError::DatabaseError(format!("Failed to list documents: {e}")))?;

        rows.into_iter().map(DocumentRecord::try_from).collect()
    }

    async fn update_status(&self, id: Uuid, status: DocumentStatus) -> Result<()> {
        let result = sqlx::query("UPDATE documents SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(id.to_string())
            .bind(status.as_str())
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(|e| DocQaError::DatabaseError(format!("Failed to update document: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(DocQaError::DocumentNotFound(id));
        }
        Ok(())
    }

    async fn delete_document(&self, id: Uuid) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DocQaError::DatabaseError(format!("Failed to begin transaction: {e}")))?;

        sqlx::query("DELETE FROM document_chunks WHERE document_id = $1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| DocQaError::DatabaseError(format!("Failed to delete chunks: {e}")))?;

        let result = sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| DocQaError::DatabaseError(format!("Failed to delete document: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| DocQaError::DatabaseError(format!("Failed to commit delete: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn replace_chunks(&self, document_id: Uuid, chunks: &[DocumentChunk]) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DocQaError::DatabaseError(format!("Failed to begin transaction: {e}")))?;

        sqlx::query("DELETE FROM document_chunks WHERE document_id = $1")
            .bind(document_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| DocQaError::DatabaseError(format!("Failed to clear chunks: {e}")))?;

        for chunk in chunks {
            if chunk.document_id != document_id {
                return Err(DocQaError::ValidationError(format!(
                    "Chunk {} belongs to document {}, not {document_id}",
                    chunk.chunk_index, chunk.document_id
                )));
            }

            sqlx::query(
                r#"
                INSERT INTO document_chunks (id, document_id, chunk_index, content)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(chunk.id.to_string())
            .bind(document_id.to_string())
            .bind(i64::from(chunk.chunk_index))
            .bind(&chunk.content)
            .execute(&mut *tx)
            .await
            .map_err(|e| DocQaError::DatabaseError(format!("Failed to create chunk: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| DocQaError::DatabaseError(format!("Failed to commit chunks: {e}")))?;

        Ok(())
    }

    async fn get_chunk(
        &self,
        document_id: Uuid,
        chunk_index: u32,
    ) -> Result<Option<DocumentChunk>> {
        let row: Option<ChunkRow> = sqlx::query_as(
            r#"
            SELECT id, document_id, chunk_index, content
            FROM document_chunks
            WHERE document_id = $1 AND chunk_index = $2
            "#,
        )
        .bind(document_id.to_string())
        .bind(i64::from(chunk_index))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DocQaError::DatabaseError(format!("Failed to get chunk: {e}")))?;

        row.map(DocumentChunk::try_from).transpose()
    }

    async fn get_chunks(&self, document_id: Uuid) -> Result<Vec<DocumentChunk>> {
        let rows: Vec<ChunkRow> = sqlx::query_as(
            r#"
            SELECT id, document_id, chunk_index, content
            FROM document_chunks
            WHERE document_id = $1
            ORDER BY chunk_index
            "#,
        )
        .bind(document_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DocQaError::DatabaseError(format!("Failed to get chunks: {e}")))?;

        rows.into_iter().map(DocumentChunk::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_file_parent() {
        assert_eq!(
            sqlite_file_parent("sqlite://storage/docqa.db"),
            Some(PathBuf::from("storage"))
        );
        assert_eq!(
            sqlite_file_parent("sqlite:/var/lib/docqa/meta.db?mode=rwc"),
            Some(PathBuf::from("/var/lib/docqa"))
        );
        assert_eq!(sqlite_file_parent("sqlite::memory:"), None);
        assert_eq!(sqlite_file_parent("sqlite://docqa.db"), None);
        assert_eq!(sqlite_file_parent("postgres://localhost/db"), None);
    }

    async fn memory_store() -> SqliteMetadataStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteMetadataStore::from_pool(pool);
        store.migrate().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_document_lifecycle() {
        let store = memory_store().await;
        let doc = DocumentRecord::new("handbook.pdf");
        let id = store.create_document(&doc).await.unwrap();

        let loaded = store.get_document(id).await.unwrap().unwrap();
        assert_eq!(loaded.title, "handbook.pdf");
        assert_eq!(loaded.status, DocumentStatus::Registered);

        store
            .update_status(id, DocumentStatus::Indexed)
            .await
            .unwrap();
        let loaded = store.get_document(id).await.unwrap().unwrap();
        assert!(loaded.is_indexed());

        assert!(store.delete_document(id).await.unwrap());
        assert!(store.get_document(id).await.unwrap().is_none());
        assert!(!store.delete_document(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_status_unknown_document() {
        let store = memory_store().await;
        let err = store
            .update_status(Uuid::new_v4(), DocumentStatus::Indexed)
            .await
            .unwrap_err();
        assert!(matches!(err, DocQaError::DocumentNotFound(_)));
    }

    #[tokio::test]
    async fn test_replace_chunks_overwrites_previous_build() {
        let store = memory_store().await;
        let doc = DocumentRecord::new("notes.txt");
        store.create_document(&doc).await.unwrap();

        let first: Vec<_> = ["a", "b", "c"]
            .iter()
            .enumerate()
            .map(|(i, t)| DocumentChunk::new(doc.id, i as u32, *t))
            .collect();
        store.replace_chunks(doc.id, &first).await.unwrap();
        assert_eq!(store.get_chunks(doc.id).await.unwrap().len(), 3);

        let second = vec![DocumentChunk::new(doc.id, 0, "only")];
        store.replace_chunks(doc.id, &second).await.unwrap();

        let chunks = store.get_chunks(doc.id).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "only");
        assert!(store.get_chunk(doc.id, 2).await.unwrap().is_none());
        assert_eq!(
            store.get_chunk(doc.id, 0).await.unwrap().unwrap().content,
            "only"
        );
    }

    #[tokio::test]
    async fn test_replace_chunks_rejects_foreign_chunk() {
        let store = memory_store().await;
        let doc = DocumentRecord::new("a.txt");
        store.create_document(&doc).await.unwrap();
        store
            .replace_chunks(doc.id, &[DocumentChunk::new(doc.id, 0, "kept")])
            .await
            .unwrap();

        let foreign = vec![
            DocumentChunk::new(doc.id, 0, "new"),
            DocumentChunk::new(Uuid::new_v4(), 1, "stray"),
        ];
        assert!(store.replace_chunks(doc.id, &foreign).await.is_err());

        // Rolled back: the previous chunk set is intact
        let chunks = store.get_chunks(doc.id).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "kept");
    }

    #[tokio::test]
    async fn test_list_documents_newest_first() {
        let store = memory_store().await;
        let first = DocumentRecord::new("first");
        store.create_document(&first).await.unwrap();
        let second = DocumentRecord::new("second");
        store.create_document(&second).await.unwrap();

        let docs = store.list_documents(10, 0).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].title, "second");

        let page = store.list_documents(1, 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].title, "first");
    }
}
