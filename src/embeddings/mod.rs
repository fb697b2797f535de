//! Embedding generation and text chunking.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │     Pipeline     │
//! └────────┬─────────┘
//!          │
//!          ▼
//! ┌──────────────────┐
//! │ EmbeddingClient  │  ← blank-input check + per-call timeout
//! └────────┬─────────┘
//!          │ BoxedProvider
//!     ┌────┼─────────┐
//!     ▼    ▼         ▼
//! ┌──────┐┌──────┐┌──────┐
//! │OpenAI││Ollama││ Hash │
//! └──────┘└──────┘└──────┘
//!   HTTP    HTTP   offline
//! ```
//!
//! # Configuration
//!
//! Settings are loaded from `~/.docembed/config.json`. Environment
//! variables take precedence:
//! - `DOCEMBED_PROVIDER` - `openai`, `ollama` or `hash`
//! - `DOCEMBED_MODEL` - Embedding model id
//! - `DOCEMBED_ENDPOINT` - Provider base URL
//! - `OPENAI_API_KEY` / `DOCEMBED_API_KEY` - API key for OpenAI
//! - `DOCEMBED_CHUNK_SIZE`, `DOCEMBED_CHUNK_OVERLAP` - Chunker defaults
//! - `DOCEMBED_CONCURRENCY` - Parallel embedding calls per ingestion
//! - `DOCEMBED_TIMEOUT_SECS` - Per-call provider timeout

pub mod chunking;
pub mod client;
pub mod config;
pub mod factory;
pub mod hash;
pub mod ollama;
pub mod openai;
pub mod provider;
pub mod types;

// Re-exports for convenience
pub use chunking::{chunk_document, chunk_text, reassemble, ChunkConfig};
pub use client::EmbeddingClient;
pub use config::{
    get_embedding_settings, reset_embedding_settings, resolve_settings, save_embedding_settings,
    ResolvedSettings,
};
pub use factory::{create_client, create_provider, detect_available_providers, ProviderDetection};
pub use hash::HashProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use provider::{BoxedProvider, EmbeddingProvider};
pub use types::{
    model_config, DocembedConfig, EmbeddingProviderType, EmbeddingSettings, ModelConfig,
    ProviderInfo,
};
