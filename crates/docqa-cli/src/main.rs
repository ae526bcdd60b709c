//! docqa CLI - Command-line interface
//!
//! Usage:
//!   docqa chunk <file>
//!   docqa register <title>
//!   docqa index <id> <file>
//!   docqa search <id> <question>
//!   docqa ask <id> <question>
//!   docqa documents

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use docqa_core::{AppConfig, LoggingConfig, MetadataRepository, SqliteMetadataStore};
use docqa_rag::DocumentQaService;
use docqa_text::{normalize_text, ChunkConfig, SentenceChunker};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "docqa")]
#[command(about = "Ask questions about your documents")]
#[command(version)]
struct Cli {
    /// TOML configuration file; environment variables take precedence
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a text file into overlapping chunks
    Chunk {
        /// Text file to chunk
        file: PathBuf,
        /// Target chunk length in characters
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Characters of trailing context carried into the next chunk
        #[arg(long)]
        overlap: Option<usize>,
    },
    /// Register a document
    Register {
        /// Document title
        title: String,
    },
    /// Index the extracted text of a registered document
    Index {
        /// Document ID
        id: Uuid,
        /// Text file holding the document's extracted text
        file: PathBuf,
    },
    /// Show the chunks most similar to a question
    Search {
        /// Document ID
        id: Uuid,
        /// Question to rank chunks against
        question: String,
        #[arg(long, short = 'k')]
        top_k: Option<usize>,
    },
    /// Answer a question from a document
    Ask {
        /// Document ID
        id: Uuid,
        /// Question to ask
        question: String,
        #[arg(long, short = 'k')]
        top_k: Option<usize>,
    },
    /// List registered documents
    Documents {
        #[arg(long, default_value_t = 20)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },
    /// Delete a document and its index
    Delete {
        /// Document ID
        id: Uuid,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Chunk {
            file,
            chunk_size,
            overlap,
        } => {
            let text = read_text(&file)?;
            let chunker = SentenceChunker::new(ChunkConfig::new(
                chunk_size.unwrap_or(config.rag.chunk_size),
                overlap.unwrap_or(config.rag.chunk_overlap),
            ));
            let chunks = chunker.chunk(&normalize_text(&text));

            if cli.json {
                print_json(&chunks)?;
            } else {
                for (i, chunk) in chunks.iter().enumerate() {
                    println!("[{i}] ({} chars) {chunk}", chunk.chars().count());
                }
            }
        }
        Commands::Register { title } => {
            let service = open_service(&config).await?;
            let doc = service.register_document(&title).await?;
            if cli.json {
                print_json(&doc)?;
            } else {
                println!("{}", doc.id);
            }
        }
        Commands::Index { id, file } => {
            let text = read_text(&file)?;
            let service = open_service(&config).await?;
            let count = service.index_document(id, &text).await?;
            println!("Indexed {count} chunks for document {id}");
        }
        Commands::Search {
            id,
            question,
            top_k,
        } => {
            let service = open_service(&config).await?;
            let top_k = top_k.unwrap_or(service.default_top_k());
            let results = service.retrieve(id, &question, top_k).await?;

            if cli.json {
                print_json(&results)?;
            } else {
                for result in &results {
                    println!(
                        "#{:<4} {:.4}  {}",
                        result.vector_id, result.similarity, result.preview
                    );
                }
            }
        }
        Commands::Ask {
            id,
            question,
            top_k,
        } => {
            let service = open_service(&config).await?;
            let top_k = top_k.unwrap_or(service.default_top_k());
            let answer = service.ask(id, &question, top_k).await?;

            if cli.json {
                print_json(&answer)?;
            } else {
                println!("{}", answer.answer());
                if !answer.sources.is_empty() {
                    println!();
                    println!("Sources:");
                    for source in &answer.sources {
                        println!(
                            "  chunk {} ({:.3}): {}",
                            source.chunk_index, source.similarity, source.preview
                        );
                    }
                }
            }
        }
        Commands::Documents { limit, offset } => {
            let service = open_service(&config).await?;
            let documents = service.list_documents(limit, offset).await?;

            if cli.json {
                print_json(&documents)?;
            } else {
                for doc in &documents {
                    println!(
                        "{}  {:<10}  {}  {}",
                        doc.id,
                        doc.status,
                        doc.created_at.format("%Y-%m-%d %H:%M"),
                        doc.title
                    );
                }
            }
        }
        Commands::Delete { id } => {
            let service = open_service(&config).await?;
            service.delete_document(id).await?;
            println!("Deleted document {id}");
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)
            .and_then(AppConfig::with_env_override)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => AppConfig::from_env().context("loading configuration from environment")?,
    };
    Ok(config)
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,docqa={}", logging.level)));

    // stdout carries command output
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn open_service(config: &AppConfig) -> anyhow::Result<DocumentQaService> {
    tracing::debug!(
        database_url = %config.storage.database_url,
        index_dir = %config.storage.index_dir.display(),
        "Opening document store"
    );
    let metadata: Arc<dyn MetadataRepository> =
        Arc::new(SqliteMetadataStore::connect(&config.storage).await?);
    Ok(DocumentQaService::from_config(config, metadata)?)
}

fn read_text(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
