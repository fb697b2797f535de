//! Embedding job model.
//!
//! One job per ingestion invocation. Jobs are created in `processing` and
//! end in exactly one terminal state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::document::Metadata;

/// What kind of input a job ingested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    FileUpload,
    TextInput,
}

impl JobType {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FileUpload => "file_upload",
            Self::TextInput => "text_input",
        }
    }

    /// Parse from storage.
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "file_upload" => Some(Self::FileUpload),
            "text_input" => Some(Self::TextInput),
            _ => None,
        }
    }
}

/// Job status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse from string.
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Terminal states are final.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Only `processing -> completed` and `processing -> failed` are legal.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Processing, Self::Completed) | (Self::Processing, Self::Failed)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tracked ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingJob {
    pub id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,

    /// Input parameters recorded for observability
    pub parameters: Metadata,

    /// Source files stored for a file upload
    pub file_ids: Option<Vec<String>>,

    /// Summary written on completion (and partial counts on failure)
    pub result: Option<Metadata>,

    /// Error message of a failed job
    pub error: Option<String>,

    pub owner_id: Uuid,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,

    /// Time the job reached a terminal state (Unix milliseconds)
    pub completed_at: Option<i64>,
}
