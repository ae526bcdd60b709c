//! docqa Vector - Embedding, flat indexing, and retrieval
//!
//! Each document gets its own exact inner-product index over L2-normalized
//! embeddings. Vector position `i` always corresponds to chunk `i` of the
//! document, which is the join key between the index, its id mapping, and the
//! persisted chunk rows.

pub mod builder;
pub mod embedding;
pub mod index;
pub mod retriever;
pub mod storage;

pub use builder::{BuiltIndex, IndexBuilder};
pub use embedding::{
    create_embedding_client, EmbeddingClient, HashingEmbedding, OllamaEmbedding, OpenAiEmbedding,
};
pub use index::{normalize_l2, FlatIndex, Neighbor, NO_MATCH};
pub use retriever::{preview, Retriever};
pub use storage::{IdMapping, IndexStore};
