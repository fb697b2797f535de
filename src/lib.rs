//! docembed - document embedding pipeline
//!
//! Splits documents into overlapping chunks, embeds each chunk through a
//! pluggable provider, stores the vectors with per-owner isolation and
//! answers cosine-similarity queries. Every ingestion is tracked as a job.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`pipeline`] - Ingestion and search orchestration
//! - [`embeddings`] - Chunker, providers (OpenAI, Ollama, offline hash) and client
//! - [`storage`] - SQLite store for records, jobs, files and usage
//! - [`model`] - Data types (Document, Chunk, EmbeddingRecord, EmbeddingJob)
//! - [`config`] - Path and owner resolution
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod storage;

pub use error::{Error, Result};
pub use pipeline::{EmbeddingPipeline, IngestRequest, PipelineConfig, SearchRequest, SourceFile};
