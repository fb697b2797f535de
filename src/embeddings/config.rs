//! Embedding configuration management.
//!
//! Loads and saves embedding settings from `~/.docembed/config.json`.
//!
//! Resolution priority for every setting: environment variable > config
//! file > built-in default.

use crate::error::{Error, Result};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use super::chunking::ChunkConfig;
use super::types::{default_model, DocembedConfig, EmbeddingProviderType, EmbeddingSettings};

/// Default per-call timeout for provider requests.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Get the config file path.
fn config_path() -> Result<PathBuf> {
    crate::config::global_docembed_dir()
        .map(|dir| dir.join("config.json"))
        .ok_or(Error::Config("Could not determine home directory".into()))
}

/// Load the full docembed configuration.
pub fn load_config() -> Result<DocembedConfig> {
    let path = config_path()?;

    if !path.exists() {
        return Ok(DocembedConfig::default());
    }

    let content = fs::read_to_string(&path).map_err(|e| {
        Error::Config(format!("Failed to read config file: {e}"))
    })?;

    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file: {e}"))
    })
}

/// Save the full docembed configuration.
pub fn save_config(config: &DocembedConfig) -> Result<()> {
    let path = config_path()?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            Error::Config(format!("Failed to create config directory: {e}"))
        })?;
    }

    let content = serde_json::to_string_pretty(config).map_err(|e| {
        Error::Config(format!("Failed to serialize config: {e}"))
    })?;

    fs::write(&path, content).map_err(|e| {
        Error::Config(format!("Failed to write config file: {e}"))
    })?;

    Ok(())
}

/// Get embedding settings from config file.
pub fn get_embedding_settings() -> Result<Option<EmbeddingSettings>> {
    let config = load_config()?;
    Ok(config.embeddings)
}

/// Save embedding settings (merges with existing config).
pub fn save_embedding_settings(settings: &EmbeddingSettings) -> Result<EmbeddingSettings> {
    let mut config = load_config()?;
    let merged = config.embeddings.unwrap_or_default().merged_with(settings);
    config.embeddings = Some(merged.clone());
    save_config(&config)?;
    Ok(merged)
}

/// Reset embedding settings (removes from config).
pub fn reset_embedding_settings() -> Result<()> {
    let mut config = load_config()?;
    config.embeddings = None;
    save_config(&config)
}

/// Read a non-empty environment variable.
fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Settings from environment variables only.
///
/// Unparseable numeric values are rejected rather than silently ignored.
pub fn settings_from_env() -> Result<EmbeddingSettings> {
    let provider = env_nonempty("DOCEMBED_PROVIDER")
        .map(|p| p.parse::<EmbeddingProviderType>().map_err(Error::Config))
        .transpose()?;

    let parse_num = |name: &str| -> Result<Option<u64>> {
        env_nonempty(name)
            .map(|v| {
                v.trim()
                    .parse::<u64>()
                    .map_err(|_| Error::Config(format!("{name} must be a non-negative integer, got '{v}'")))
            })
            .transpose()
    };

    Ok(EmbeddingSettings {
        provider,
        model: env_nonempty("DOCEMBED_MODEL"),
        endpoint: env_nonempty("DOCEMBED_ENDPOINT"),
        api_key: env_nonempty("DOCEMBED_API_KEY").or_else(|| env_nonempty("OPENAI_API_KEY")),
        chunk_size: parse_num("DOCEMBED_CHUNK_SIZE")?.map(|v| v as usize),
        chunk_overlap: parse_num("DOCEMBED_CHUNK_OVERLAP")?.map(|v| v as usize),
        concurrency: parse_num("DOCEMBED_CONCURRENCY")?.map(|v| v as usize),
        timeout_secs: parse_num("DOCEMBED_TIMEOUT_SECS")?,
    })
}

/// Effective settings: config file overlaid with environment.
pub fn resolve_settings() -> Result<EmbeddingSettings> {
    let file = get_embedding_settings()?.unwrap_or_default();
    Ok(file.merged_with(&settings_from_env()?))
}

/// Fully resolved values the pipeline runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSettings {
    pub provider: EmbeddingProviderType,
    pub model: String,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub chunk: ChunkConfig,
    pub concurrency: usize,
    pub timeout: Duration,
}

impl ResolvedSettings {
    /// Fill defaults into partially specified settings.
    ///
    /// Without an explicit provider, OpenAI is used when an API key is
    /// present, otherwise a local Ollama server.
    #[must_use]
    pub fn from_settings(settings: &EmbeddingSettings) -> Self {
        let provider = settings.provider.unwrap_or(if settings.api_key.is_some() {
            EmbeddingProviderType::Openai
        } else {
            EmbeddingProviderType::Ollama
        });
        let defaults = ChunkConfig::default();

        Self {
            provider,
            model: settings
                .model
                .clone()
                .unwrap_or_else(|| default_model(provider).to_string()),
            endpoint: settings.endpoint.clone(),
            api_key: settings.api_key.clone(),
            chunk: ChunkConfig {
                chunk_size: settings.chunk_size.unwrap_or(defaults.chunk_size),
                chunk_overlap: settings.chunk_overlap.unwrap_or(defaults.chunk_overlap),
            },
            concurrency: settings.concurrency.unwrap_or(1).max(1),
            timeout: Duration::from_secs(settings.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS).max(1)),
        }
    }
}
