//! docqa Configuration Management
//!
//! Handles configuration from environment variables and TOML config files
//! with sensible defaults for development.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Upper bound on the number of chunks a single query may request
pub const MAX_TOP_K: usize = 100;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Document store and index artifact locations
    pub storage: StorageConfig,

    /// LLM and embedding provider configuration
    pub llm: LlmConfig,

    /// Chunking, retrieval and answering parameters
    pub rag: RagConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::ParseError { message, .. } => ConfigError::ParseError { path, message },
            other => other,
        })
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env()?;
        Ok(self)
    }

    /// Reject combinations the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rag.chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "rag.chunk_size".to_string(),
                value: "0".to_string(),
            });
        }
        if self.rag.top_k == 0 || self.rag.top_k > MAX_TOP_K {
            return Err(ConfigError::InvalidValue {
                key: "rag.top_k".to_string(),
                value: self.rag.top_k.to_string(),
            });
        }
        if self.rag.max_contexts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "rag.max_contexts".to_string(),
                value: "0".to_string(),
            });
        }
        if self.llm.embedding_batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "llm.embedding_batch_size".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        // Server
        if let Ok(host) = std::env::var("API_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("API_PORT") {
            self.server.port = parse_env("API_PORT", port)?;
        }
        // CORS origins from environment variable (comma-separated)
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // Storage
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.storage.database_url = url;
        }
        if let Ok(dir) = std::env::var("INDEX_DIR") {
            self.storage.index_dir = PathBuf::from(dir);
        }

        // LLM
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            self.llm.provider = provider.parse()?;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.llm.openai_api_key = Some(key);
        }
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            self.llm.openai_base_url = Some(url);
        }
        if let Ok(url) = std::env::var("OLLAMA_URL") {
            self.llm.ollama_url = url;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            self.llm.embedding_model = model;
        }

        // Chunking
        if let Ok(size) = std::env::var("CHUNK_SIZE") {
            self.rag.chunk_size = parse_env("CHUNK_SIZE", size)?;
        }
        if let Ok(overlap) = std::env::var("CHUNK_OVERLAP") {
            self.rag.chunk_overlap = parse_env("CHUNK_OVERLAP", overlap)?;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(json) = std::env::var("LOG_JSON") {
            self.logging.json_format = parse_env("LOG_JSON", json)?;
        }

        self.validate()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: String) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
    })
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Maximum request body size in bytes
    pub max_body_size: usize,

    /// Enable CORS
    pub cors_enabled: bool,

    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_body_size: 25 * 1024 * 1024, // 25MB of extracted text
            cors_enabled: true,
            // Empty by default for security - set via CORS_ORIGINS env var
            cors_origins: vec![],
        }
    }
}

/// Where documents, chunks and index artifacts live
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite connection URL for documents and chunks
    pub database_url: String,

    /// Connection pool size
    pub max_connections: u32,

    /// Directory holding per-document index and mapping artifacts
    pub index_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://storage/docqa.db".to_string(),
            max_connections: 5,
            index_dir: PathBuf::from("storage/indexes"),
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// LLM provider to use
    pub provider: LlmProvider,

    /// OpenAI API key
    pub openai_api_key: Option<String>,

    /// OpenAI API base URL (for Azure or compatible APIs)
    pub openai_base_url: Option<String>,

    /// Ollama server URL
    pub ollama_url: String,

    /// Chat model name
    pub model: String,

    /// Embedding model name; indexing and querying must use the same one
    pub embedding_model: String,

    /// Number of chunks sent per embedding request
    pub embedding_batch_size: usize,

    /// Maximum tokens for completion
    pub max_tokens: u32,

    /// Temperature for generation
    pub temperature: f32,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAI,
            openai_api_key: None,
            openai_base_url: None,
            ollama_url: "http://localhost:11434".to_string(),
            model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_batch_size: 64,
            max_tokens: 800,
            temperature: 0.1,
            timeout_secs: 60,
        }
    }
}

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAI,
    Ollama,
    Azure,
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "azure" => Ok(Self::Azure),
            _ => Err(ConfigError::InvalidValue {
                key: "LLM_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Chunking, retrieval and answering parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,

    /// Sentence overlap budget between consecutive chunks, in characters
    pub chunk_overlap: usize,

    /// Default number of chunks retrieved per question
    pub top_k: usize,

    /// Maximum number of retrieved chunks handed to the model
    pub max_contexts: usize,

    /// Length of the preview attached to retrieval results
    pub preview_chars: usize,

    /// Length of the context excerpt returned when generation fails
    pub fallback_excerpt_chars: usize,

    /// Maximum number of cached query embeddings
    pub embedding_cache_capacity: u64,

    /// Time-to-live of cached query embeddings (seconds)
    pub embedding_cache_ttl_secs: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 600,
            chunk_overlap: 100,
            top_k: 5,
            max_contexts: 5,
            preview_chars: 200,
            fallback_excerpt_chars: 300,
            embedding_cache_capacity: 10_000,
            embedding_cache_ttl_secs: 3600,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

impl From<ConfigError> for crate::DocQaError {
    fn from(err: ConfigError) -> Self {
        crate::DocQaError::ConfigError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.rag.chunk_size, 600);
        assert_eq!(config.rag.chunk_overlap, 100);
        assert_eq!(config.rag.max_contexts, 5);
        assert_eq!(config.rag.preview_chars, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_llm_provider_parse() {
        assert_eq!(
            "openai".parse::<LlmProvider>().unwrap(),
            LlmProvider::OpenAI
        );
        assert_eq!(
            "Ollama".parse::<LlmProvider>().unwrap(),
            LlmProvider::Ollama
        );
        assert!("invalid".parse::<LlmProvider>().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [rag]
            chunk_size = 300

            [llm]
            provider = "ollama"
            embedding_model = "all-minilm"
            "#,
        )
        .unwrap();

        assert_eq!(config.rag.chunk_size, 300);
        assert_eq!(config.rag.chunk_overlap, 100);
        assert_eq!(config.llm.provider, LlmProvider::Ollama);
        assert_eq!(config.llm.embedding_model, "all-minilm");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let err = AppConfig::from_toml_str("[rag]\nchunk_size = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_top_k_bounds() {
        assert!(AppConfig::from_toml_str("[rag]\ntop_k = 100\n").is_ok());
        let err = AppConfig::from_toml_str("[rag]\ntop_k = 101\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "rag.top_k"));
    }

    #[test]
    fn test_malformed_toml() {
        let err = AppConfig::from_toml_str("[rag\nchunk_size = ").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }
}
