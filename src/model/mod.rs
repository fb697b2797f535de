//! Data models for docembed.
//!
//! This module contains all domain models:
//! - Document and Chunk (ephemeral pipeline input)
//! - EmbeddingRecord, RankedResult (persisted vectors and search hits)
//! - EmbeddingJob (ingestion tracking)
//! - EmbeddingFile, EmbeddingUsage (source files and retrieval log)
//! - AgentSettings (per-agent search defaults)

pub mod agent;
pub mod document;
pub mod job;
pub mod record;

pub use agent::{
    validate_retrieval, AgentSettings, AgentSettingsUpdate, DEFAULT_SEARCH_LIMIT,
    DEFAULT_SEARCH_THRESHOLD,
};
pub use document::{Chunk, ChunkMetadata, Document, Metadata, CONTENT_KEY};
pub use job::{EmbeddingJob, JobStatus, JobType};
pub use record::{
    EmbeddingFile, EmbeddingRecord, EmbeddingUpdate, EmbeddingUsage, NewEmbedding, RankedResult,
    SourceType,
};
