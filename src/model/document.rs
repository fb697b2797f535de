//! Document and chunk models.
//!
//! A [`Document`] exists only for the duration of one ingestion. The chunker
//! turns it into [`Chunk`]s whose metadata is what ends up stored next to
//! each vector.

use serde::{Deserialize, Serialize};

/// Open, string-keyed metadata map.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Reserved metadata key holding the chunk's text.
///
/// Every stored record must carry it so search results can be hydrated
/// without going back to the source document.
pub const CONTENT_KEY: &str = "content";

/// Raw input to the pipeline.
#[derive(Debug, Clone, Default)]
pub struct Document {
    /// Document name (file name for uploads)
    pub name: String,

    /// Full text content
    pub raw_text: String,

    /// Caller-supplied metadata copied onto every chunk
    pub metadata: Metadata,
}

impl Document {
    /// Create a document with empty metadata.
    pub fn new(name: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            raw_text: raw_text.into(),
            metadata: Metadata::new(),
        }
    }

    /// Attach caller metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Positional metadata of a chunk.
///
/// Offsets count Unicode scalar values of the source text, not bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    pub file_name: String,
    pub chunk_index: usize,
    pub start_index: usize,
    pub end_index: usize,

    /// Caller-supplied keys, flattened next to the positional ones
    #[serde(flatten)]
    pub extra: Metadata,
}

/// A contiguous window of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// `<fileName>-chunk-<index>`
    pub id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Build the derived chunk id.
    #[must_use]
    pub fn make_id(file_name: &str, index: usize) -> String {
        format!("{file_name}-chunk-{index}")
    }

    /// Metadata as stored with the embedding: caller keys, then the
    /// positional keys and the chunk text under [`CONTENT_KEY`].
    ///
    /// Positional keys and content always win over caller keys of the
    /// same name.
    #[must_use]
    pub fn record_metadata(&self) -> Metadata {
        let meta = &self.metadata;
        let mut map = meta.extra.clone();
        map.insert("fileName".into(), meta.file_name.clone().into());
        map.insert("chunkIndex".into(), meta.chunk_index.into());
        map.insert("startIndex".into(), meta.start_index.into());
        map.insert("endIndex".into(), meta.end_index.into());
        map.insert(CONTENT_KEY.into(), self.content.clone().into());
        map
    }
}
