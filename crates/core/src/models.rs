use crate::chunking::ChunkingConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

pub const DEFAULT_COLLECTION: &str = "tender_chunks";

pub const DEFAULT_TOP_K: usize = 15;

/// Separator used when a chunk's tags are flattened into its metadata.
pub const TAG_DELIMITER: char = ';';

/// Heuristic page number for a chunk; two chunks per page.
pub fn page_estimate(position: u32) -> u32 {
    position / 2
}

/// Metadata persisted next to every chunk record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    pub source: String,
    pub page: u32,
    pub chunk_position: u32,
    pub tags: String,
}

impl ChunkMetadata {
    pub fn new(source: impl Into<String>, position: u32, tags: &[String]) -> Self {
        Self {
            source: source.into(),
            page: page_estimate(position),
            chunk_position: position,
            tags: join_tags(tags),
        }
    }

    pub fn tag_set(&self) -> HashSet<&str> {
        self.tags
            .split(TAG_DELIMITER)
            .filter(|tag| !tag.is_empty())
            .collect()
    }
}

pub fn join_tags(tags: &[String]) -> String {
    tags.join(&TAG_DELIMITER.to_string())
}

pub fn record_id(source: &str, position: u32) -> String {
    format!("{source}_{position}")
}

/// A chunk as written to the store. The store computes the embedding
/// when none is supplied.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub embedding: Option<Vec<f32>>,
}

/// A chunk as read back from the store, embedding included.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChunk {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub distance: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RetrievalBranch {
    /// At least one chunk shared a tag with the query; ranked by cosine similarity.
    TagFiltered,
    /// No chunk matched; plain nearest-neighbour query.
    VectorFallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalHit {
    pub id: String,
    pub text: String,
    pub source: String,
    pub page: u32,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub query: String,
    pub tags: Vec<String>,
    pub branch: RetrievalBranch,
    pub hits: Vec<RetrievalHit>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn texts(&self) -> Vec<&str> {
        self.hits.iter().map(|hit| hit.text.as_str()).collect()
    }

    pub fn into_texts(self) -> Vec<String> {
        self.hits.into_iter().map(|hit| hit.text).collect()
    }
}

#[derive(Debug, Clone)]
pub struct IndexingOptions {
    pub collection: String,
    pub chunking: ChunkingConfig,
    /// Leading characters of a document sent to the model for tagging.
    pub snippet_chars: usize,
    /// Fold accents and collapse whitespace before chunking.
    pub normalize_text: bool,
}

impl Default for IndexingOptions {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            chunking: ChunkingConfig::default(),
            snippet_chars: 1_000,
            normalize_text: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalOptions {
    pub collection: String,
    pub top_k: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            top_k: DEFAULT_TOP_K,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndexedDocument {
    pub source: String,
    pub chunk_count: usize,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct IndexingReport {
    pub collection: String,
    pub total_chunks: usize,
    pub documents: Vec<IndexedDocument>,
    pub skipped_files: Vec<SkippedFile>,
    pub indexed_at: DateTime<Utc>,
}
