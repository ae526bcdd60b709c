//! Per-document index artifacts on disk
//!
//! Each indexed document owns two files in the index directory:
//!
//! - `{id}.idx`: binary flat index. Header is the magic `DQIX`, a format
//!   version (u16), the dimension (u32), the vector count (u64) and the
//!   SHA-256 fingerprint of the chunk texts, followed by `count * dimension`
//!   little-endian f32 values.
//! - `{id}_map.json`: `{"<position>": {"chunk_index": n, "text": "..."}}`.
//!
//! Both files are written to temporary paths, synced, and renamed into place.
//! The mapping is published first and the index last, and the index header
//! records the mapping's count and fingerprint, so a reader never pairs an
//! index with a mapping from a different build without noticing.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use docqa_core::{DocQaError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::index::FlatIndex;

const MAGIC: &[u8; 4] = b"DQIX";
const FORMAT_VERSION: u16 = 1;
const HEADER_LEN: usize = 4 + 2 + 4 + 8 + 32;

// ============================================================================
// Id Mapping
// ============================================================================

/// Ordered association from vector position to chunk text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdMapping {
    texts: Vec<String>,
}

impl IdMapping {
    pub fn new(texts: Vec<String>) -> Self {
        Self { texts }
    }

    pub fn get(&self, position: usize) -> Option<&str> {
        self.texts.get(position).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    /// SHA-256 over the length-prefixed texts, in order
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for text in &self.texts {
            hasher.update((text.len() as u64).to_le_bytes());
            hasher.update(text.as_bytes());
        }
        hasher.finalize().into()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct MappingEntry {
    chunk_index: usize,
    text: String,
}

// ============================================================================
// Index Store
// ============================================================================

/// Directory of per-document index and mapping artifacts
#[derive(Debug, Clone)]
pub struct IndexStore {
    root: PathBuf,
}

impl IndexStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_path(&self, document_id: Uuid) -> PathBuf {
        self.root.join(format!("{document_id}.idx"))
    }

    pub fn mapping_path(&self, document_id: Uuid) -> PathBuf {
        self.root.join(format!("{document_id}_map.json"))
    }

    /// Whether a published index exists for the document
    pub fn exists(&self, document_id: Uuid) -> bool {
        self.index_path(document_id).is_file() && self.mapping_path(document_id).is_file()
    }

    /// Durably publish an index and its mapping, replacing any previous build
    pub fn save(&self, document_id: Uuid, index: &FlatIndex, mapping: &IdMapping) -> Result<()> {
        if index.len() != mapping.len() {
            return Err(DocQaError::IndexInconsistent {
                document_id,
                reason: format!(
                    "index holds {} vectors but mapping holds {} entries",
                    index.len(),
                    mapping.len()
                ),
            });
        }

        fs::create_dir_all(&self.root).map_err(|e| {
            DocQaError::StorageError(format!(
                "Failed to create index directory {}: {e}",
                self.root.display()
            ))
        })?;

        let entries: BTreeMap<String, MappingEntry> = mapping
            .texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                (
                    i.to_string(),
                    MappingEntry {
                        chunk_index: i,
                        text: text.clone(),
                    },
                )
            })
            .collect();
        let mapping_bytes = serde_json::to_vec(&entries)
            .map_err(|e| DocQaError::StorageError(format!("Failed to encode mapping: {e}")))?;

        let index_bytes = encode_index(index, &mapping.fingerprint());

        write_atomic(&self.mapping_path(document_id), &mapping_bytes)?;
        if let Err(e) = write_atomic(&self.index_path(document_id), &index_bytes) {
            // The new mapping must not stay paired with a previous index
            self.discard(document_id);
            return Err(e);
        }

        tracing::debug!(
            document_id = %document_id,
            vectors = index.len(),
            dimension = index.dimension(),
            "Published index artifacts"
        );
        Ok(())
    }

    /// Load and cross-check a document's index and mapping
    pub fn load(&self, document_id: Uuid) -> Result<(FlatIndex, IdMapping)> {
        let index_bytes = read_artifact(document_id, &self.index_path(document_id))?;
        let mapping_bytes = read_artifact(document_id, &self.mapping_path(document_id))?;

        let inconsistent = |reason: String| DocQaError::IndexInconsistent {
            document_id,
            reason,
        };

        let header = decode_header(&index_bytes).map_err(&inconsistent)?;
        let mapping = decode_mapping(&mapping_bytes).map_err(&inconsistent)?;

        if header.count != mapping.len() {
            return Err(inconsistent(format!(
                "index holds {} vectors but mapping holds {} entries",
                header.count,
                mapping.len()
            )));
        }
        if header.fingerprint != mapping.fingerprint() {
            return Err(inconsistent(
                "mapping text does not match the indexed chunks".to_string(),
            ));
        }

        let body = &index_bytes[HEADER_LEN..];
        let expected = header
            .count
            .checked_mul(header.dimension)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| inconsistent("index header overflows".to_string()))?;
        if body.len() != expected {
            return Err(inconsistent(format!(
                "index body is {} bytes, expected {expected}",
                body.len()
            )));
        }

        let values: Vec<f32> = body
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        let index = FlatIndex::from_normalized(header.dimension, values)?;

        Ok((index, mapping))
    }

    /// Best-effort removal of both artifacts after a failed publish
    fn discard(&self, document_id: Uuid) {
        for path in [self.mapping_path(document_id), self.index_path(document_id)] {
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to discard artifact");
                }
            }
        }
    }

    /// Remove both artifacts; returns whether anything was deleted
    pub fn delete(&self, document_id: Uuid) -> Result<bool> {
        let mut removed = false;
        // Index first so a concurrent reader sees "not found", not a torn pair
        for path in [self.index_path(document_id), self.mapping_path(document_id)] {
            match fs::remove_file(&path) {
                Ok(()) => removed = true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(DocQaError::StorageError(format!(
                        "Failed to remove {}: {e}",
                        path.display()
                    )))
                }
            }
        }
        Ok(removed)
    }
}

// ============================================================================
// Encoding
// ============================================================================

struct IndexHeader {
    dimension: usize,
    count: usize,
    fingerprint: [u8; 32],
}

fn encode_index(index: &FlatIndex, fingerprint: &[u8; 32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + index.len() * index.dimension() * 4);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&(index.dimension() as u32).to_le_bytes());
    bytes.extend_from_slice(&(index.len() as u64).to_le_bytes());
    bytes.extend_from_slice(fingerprint);
    for value in index.values() {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn decode_header(bytes: &[u8]) -> std::result::Result<IndexHeader, String> {
    if bytes.len() < HEADER_LEN {
        return Err(format!("index file is truncated ({} bytes)", bytes.len()));
    }
    if &bytes[0..4] != MAGIC {
        return Err("index file has an unknown format".to_string());
    }

    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != FORMAT_VERSION {
        return Err(format!("unsupported index format version {version}"));
    }

    let mut dimension = [0u8; 4];
    dimension.copy_from_slice(&bytes[6..10]);
    let mut count = [0u8; 8];
    count.copy_from_slice(&bytes[10..18]);
    let mut fingerprint = [0u8; 32];
    fingerprint.copy_from_slice(&bytes[18..50]);

    let dimension = u32::from_le_bytes(dimension) as usize;
    if dimension == 0 {
        return Err("index dimension is zero".to_string());
    }

    Ok(IndexHeader {
        dimension,
        count: usize::try_from(u64::from_le_bytes(count))
            .map_err(|_| "index count does not fit in memory".to_string())?,
        fingerprint,
    })
}

fn decode_mapping(bytes: &[u8]) -> std::result::Result<IdMapping, String> {
    let entries: BTreeMap<String, MappingEntry> =
        serde_json::from_slice(bytes).map_err(|e| format!("mapping is not valid JSON: {e}"))?;

    let mut slots: Vec<Option<String>> = vec![None; entries.len()];
    for (key, entry) in entries {
        let position: usize = key
            .parse()
            .map_err(|_| format!("mapping key {key:?} is not a position"))?;
        if position != entry.chunk_index {
            return Err(format!(
                "mapping entry {position} points at chunk {}",
                entry.chunk_index
            ));
        }
        let slot = slots
            .get_mut(position)
            .ok_or_else(|| format!("mapping position {position} is out of range"))?;
        if slot.replace(entry.text).is_some() {
            return Err(format!("mapping position {position} appears twice"));
        }
    }

    let texts = slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| slot.ok_or_else(|| format!("mapping position {i} is missing")))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(IdMapping::new(texts))
}

// ============================================================================
// File helpers
// ============================================================================

fn read_artifact(document_id: Uuid, path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => DocQaError::IndexNotFound(document_id),
        _ => DocQaError::StorageError(format!("Failed to read {}: {e}", path.display())),
    })
}

/// Write to a sibling temp file, fsync, then rename over `path`
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let storage_err = |what: &str, e: std::io::Error| {
        DocQaError::StorageError(format!("{what} {}: {e}", path.display()))
    };

    let tmp_path = path.with_extension(format!(
        "{}.tmp",
        path.extension().and_then(|e| e.to_str()).unwrap_or("bin")
    ));

    let result = (|| -> Result<()> {
        let mut file = File::create(&tmp_path).map_err(|e| storage_err("Failed to create", e))?;
        file.write_all(bytes)
            .map_err(|e| storage_err("Failed to write", e))?;
        file.sync_all().map_err(|e| storage_err("Failed to sync", e))?;
        drop(file);

        fs::rename(&tmp_path, path).map_err(|e| storage_err("Failed to publish", e))?;
        if let Some(parent) = path.parent() {
            sync_dir(parent).map_err(|e| storage_err("Failed to sync directory for", e))?;
        }
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}
