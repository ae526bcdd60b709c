//! docqa Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout the docqa system:
//! - Document and chunk records
//! - Retrieval results and answer outcomes
//! - Common error types
//! - Shared traits for language-model backends
//! - Configuration management
//! - Metadata storage (SQLite, in-memory)

pub mod config;
pub mod memory;
pub mod metadata;

pub use config::{
    AppConfig, ConfigError, LlmConfig, LlmProvider, LoggingConfig, RagConfig, ServerConfig,
    StorageConfig, MAX_TOP_K,
};
pub use memory::InMemoryMetadataStore;
pub use metadata::{MetadataRepository, SqliteMetadataStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for docqa operations
#[derive(Error, Debug)]
pub enum DocQaError {
    /// Retrieval was attempted before a successful index build
    #[error("Vector index not found for document {0}; index the document first")]
    IndexNotFound(Uuid),

    #[error("Document not found: {0}")]
    DocumentNotFound(Uuid),

    /// Upstream extraction produced no usable text
    #[error("No text could be extracted from document {0}")]
    EmptyExtraction(Uuid),

    #[error("Answer generation failed: {0}")]
    GenerationFailure(String),

    /// Malformed or empty chunk input to the index builder
    #[error("Unsupported input: {0}")]
    UnsupportedInput(String),

    /// Index, mapping and chunk store disagree about a document's chunks
    #[error("Index for document {document_id} is inconsistent: {reason}")]
    IndexInconsistent { document_id: Uuid, reason: String },

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, DocQaError>;

// ============================================================================
// Document Models
// ============================================================================

/// Lifecycle state of a document as far as the retrieval core cares
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Known, but no index has been published yet
    #[default]
    Registered,
    /// Index, mapping and chunk rows are published
    Indexed,
    /// Indexing was refused (e.g. nothing extractable)
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Indexed => "indexed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentStatus {
    type Err = DocQaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "registered" => Ok(Self::Registered),
            "indexed" => Ok(Self::Indexed),
            "failed" => Ok(Self::Failed),
            other => Err(DocQaError::DatabaseError(format!(
                "unknown document status: {other}"
            ))),
        }
    }
}

/// A document known to the system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Unique identifier, also the artifact storage key
    pub id: Uuid,

    /// Document title (usually the original filename)
    pub title: String,

    /// Current lifecycle state
    pub status: DocumentStatus,

    /// Registration timestamp
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

impl DocumentRecord {
    /// Create a new, not yet indexed document
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            status: DocumentStatus::Registered,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_indexed(&self) -> bool {
        self.status == DocumentStatus::Indexed
    }
}

/// A persisted chunk of document content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Unique identifier
    pub id: Uuid,

    /// Parent document ID
    pub document_id: Uuid,

    /// Chunk index within the document; equals its vector position
    pub chunk_index: u32,

    /// Text content, exactly as embedded
    pub content: String,
}

impl DocumentChunk {
    /// Create a new chunk
    pub fn new(document_id: Uuid, chunk_index: u32, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            chunk_index,
            content: content.into(),
        }
    }
}

// ============================================================================
// Retrieval and Answer Types
// ============================================================================

/// One ranked hit from a similarity search over a document index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Position in the index (== chunk index)
    pub vector_id: usize,

    /// Inner product of normalized vectors, in [-1, 1]
    pub similarity: f32,

    /// Full chunk text
    pub text: String,

    /// Bounded prefix of the chunk text
    pub preview: String,
}

/// Result of asking the answerer a question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerOutcome {
    /// The model produced an answer from the supplied context
    Answered { text: String },

    /// No context was retrieved; the model was not called
    NoContext { text: String },

    /// Generation failed; `text` carries an excerpt of the best context
    Degraded { text: String, reason: String },
}

impl AnswerOutcome {
    /// The user-facing answer string
    pub fn text(&self) -> &str {
        match self {
            Self::Answered { text } | Self::NoContext { text } | Self::Degraded { text, .. } => {
                text
            }
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Answered { text } | Self::NoContext { text } | Self::Degraded { text, .. } => {
                text
            }
        }
    }

    /// Short label used in API responses and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Answered { .. } => "answered",
            Self::NoContext { .. } => "no_context",
            Self::Degraded { .. } => "degraded",
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

// ============================================================================
// Traits
// ============================================================================

/// A prompt split into system instructions and the user turn
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }

    /// Flatten for backends without a separate system role
    pub fn to_single_text(&self) -> String {
        if self.system.is_empty() {
            self.user.clone()
        } else {
            format!("{}\n\n{}", self.system, self.user)
        }
    }
}

/// Trait for LLM clients
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a completion for the prompt
    async fn generate(&self, prompt: &Prompt) -> Result<String>;

    /// Model identifier for logging
    fn model(&self) -> &str;
}

// ============================================================================
// Tests
// ============================================================================
