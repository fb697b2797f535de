//! Persisted embedding records and the shapes used to create, update and
//! query them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::document::{Metadata, CONTENT_KEY};

/// Where a record's text came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum SourceType {
    Document,
    Text,
    Other(String),
}

impl From<String> for SourceType {
    fn from(s: String) -> Self {
        Self::from_str(&s)
    }
}

impl From<SourceType> for String {
    fn from(source: SourceType) -> Self {
        source.as_str().to_string()
    }
}

impl SourceType {
    /// Get the string representation for storage.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Document => "document",
            Self::Text => "text",
            Self::Other(s) => s,
        }
    }

    /// Parse from storage. Unknown values are preserved.
    #[must_use]
    pub fn from_str(s: &str) -> Self {
        match s {
            "document" => Self::Document,
            "text" => Self::Text,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A stored vector with its text and ownership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: Uuid,

    /// Collection name given at ingestion
    pub name: String,

    pub description: Option<String>,
    pub source_type: SourceType,

    /// Chunk id for pipeline-created records
    pub source_id: Option<String>,

    pub embedding_model: String,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub vector: Vec<f32>,

    pub dimensions: usize,

    /// Always carries [`CONTENT_KEY`]
    pub metadata: Metadata,

    pub owner_id: Uuid,

    /// Stored source file this record was chunked from
    pub file_id: Option<String>,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
}

impl EmbeddingRecord {
    /// The stored chunk text.
    #[must_use]
    pub fn content(&self) -> &str {
        self.metadata
            .get(CONTENT_KEY)
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
    }
}

/// Insert payload for a new record.
#[derive(Debug, Clone)]
pub struct NewEmbedding {
    pub name: String,
    pub description: Option<String>,
    pub source_type: SourceType,
    pub source_id: Option<String>,
    pub embedding_model: String,
    pub vector: Vec<f32>,
    pub metadata: Metadata,
    pub owner_id: Uuid,
    pub file_id: Option<String>,
}

/// Partial update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingUpdate {
    pub name: Option<String>,
    pub description: Option<String>,

    /// Replaces the whole map; must still carry [`CONTENT_KEY`]
    pub metadata: Option<Metadata>,
}

impl EmbeddingUpdate {
    /// True when nothing would change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.metadata.is_none()
    }
}

/// A nearest-neighbour hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    pub id: Uuid,
    pub name: String,
    pub content: String,
    pub metadata: Metadata,

    /// Cosine similarity (-1.0 to 1.0)
    pub similarity: f32,
}

/// A source file copied into the local file store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingFile {
    pub id: String,
    pub job_id: Uuid,
    pub file_name: String,
    pub file_type: String,
    pub file_size: u64,

    /// Absolute path of the stored copy
    pub file_path: String,

    pub owner_id: Uuid,
    pub created_at: i64,
}

/// One search hit served to a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingUsage {
    pub id: i64,
    pub embedding_id: Uuid,
    pub agent_id: Option<String>,
    pub query: String,
    pub similarity: f32,
    pub owner_id: Uuid,
    pub created_at: i64,
}
