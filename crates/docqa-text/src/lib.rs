//! docqa Text - Normalization and sentence-respecting chunking
//!
//! Raw extracted text is cleaned with [`normalize_text`] and then split by
//! [`SentenceChunker`] into overlapping chunks. Chunks never cut through a
//! sentence; the overlap carried between consecutive chunks is made of whole
//! sentences taken from the end of the previous chunk.
//!
//! All lengths are measured in characters (Unicode scalar values), not bytes
//! or tokens.

mod normalize;

pub use normalize::normalize_text;

use serde::{Deserialize, Serialize};

// ============================================================================
// Chunking
// ============================================================================

/// Default target chunk size in characters
pub const DEFAULT_CHUNK_SIZE: usize = 600;

/// Default overlap budget in characters
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// Configuration for sentence chunking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,

    /// Maximum length of the sentence suffix repeated at the start of the
    /// next chunk
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
        }
    }
}

/// One emitted chunk together with the sentences it was built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    /// Zero-based position in the chunk sequence
    pub index: u32,

    /// Sentences in source order, including carried overlap
    pub sentences: Vec<String>,

    /// How many leading sentences were carried over from the previous chunk
    pub overlap_sentences: usize,
}

impl ChunkSpan {
    /// Chunk text: sentences joined with single spaces
    pub fn content(&self) -> String {
        self.sentences.join(" ")
    }

    /// Sum of sentence lengths, ignoring separators
    pub fn sentence_chars(&self) -> usize {
        self.sentences.iter().map(|s| s.chars().count()).sum()
    }

    /// Sentences that appear here for the first time
    pub fn new_sentences(&self) -> &[String] {
        &self.sentences[self.overlap_sentences..]
    }
}

/// Splits text into overlapping, sentence-aligned chunks
#[derive(Debug, Clone, Default)]
pub struct SentenceChunker {
    config: ChunkConfig,
}

impl SentenceChunker {
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Chunk text into plain strings
    pub fn chunk(&self, text: &str) -> Vec<String> {
        self.chunk_spans(text)
            .iter()
            .map(ChunkSpan::content)
            .collect()
    }

    /// Chunk text, keeping sentence boundaries and overlap bookkeeping
    pub fn chunk_spans(&self, text: &str) -> Vec<ChunkSpan> {
        let mut spans = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_len = 0usize;
        let mut carried = 0usize;

        for sentence in split_sentences(text) {
            let len = sentence.chars().count();

            if current_len + len > self.config.chunk_size && !current.is_empty() {
                let (seed, seed_len) = tail_overlap(&current, self.config.overlap);
                spans.push(make_span(spans.len(), &current, carried));

                current = seed;
                current_len = seed_len;
                carried = current.len();
            }

            current.push(sentence);
            current_len += len;
        }

        if !current.is_empty() {
            spans.push(make_span(spans.len(), &current, carried));
        }

        tracing::trace!(
            chunks = spans.len(),
            chunk_size = self.config.chunk_size,
            overlap = self.config.overlap,
            "Chunked text"
        );

        spans
    }
}

/// Chunk `text` with explicit size and overlap
pub fn chunk(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    SentenceChunker::new(ChunkConfig::new(chunk_size, overlap)).chunk(text)
}

fn make_span(index: usize, sentences: &[&str], overlap_sentences: usize) -> ChunkSpan {
    ChunkSpan {
        index: index as u32,
        sentences: sentences.iter().map(|s| s.to_string()).collect(),
        overlap_sentences,
    }
}

/// Longest run of trailing sentences whose total length fits in `budget`
fn tail_overlap<'a>(sentences: &[&'a str], budget: usize) -> (Vec<&'a str>, usize) {
    let mut taken = 0usize;
    let mut total = 0usize;

    for sentence in sentences.iter().rev() {
        let len = sentence.chars().count();
        if total + len > budget {
            break;
        }
        total += len;
        taken += 1;
    }

    (sentences[sentences.len() - taken..].to_vec(), total)
}

/// Split text at sentence boundaries
///
/// A boundary is a run of whitespace directly preceded by `.`, `!` or `?`.
/// Pieces are trimmed and empty pieces are dropped.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut prev: Option<char> = None;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if ch.is_whitespace() && matches!(prev, Some('.' | '!' | '?')) {
            push_trimmed(&mut sentences, &text[start..idx]);

            let mut end = idx + ch.len_utf8();
            while let Some(&(next_idx, next)) = chars.peek() {
                if !next.is_whitespace() {
                    break;
                }
                end = next_idx + next.len_utf8();
                chars.next();
            }
            start = end;
            prev = None;
            continue;
        }
        prev = Some(ch);
    }

    push_trimmed(&mut sentences, &text[start..]);
    sentences
}

fn push_trimmed<'a>(out: &mut Vec<&'a str>, piece: &'a str) {
    let piece = piece.trim();
    if !piece.is_empty() {
        out.push(piece);
    }
}

// ============================================================================
// Tests
// ============================================================================
