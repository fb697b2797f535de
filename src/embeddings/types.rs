//! Embedding types and configuration.
//!
//! Settings live in `~/.docembed/config.json`; see [`super::config`] for
//! the resolution order.

use serde::{Deserialize, Serialize};

/// Embedding provider types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderType {
    /// OpenAI-compatible `/embeddings` endpoint
    Openai,
    /// Local Ollama server
    Ollama,
    /// Offline deterministic hash embeddings
    Hash,
}

impl std::fmt::Display for EmbeddingProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Openai => write!(f, "openai"),
            Self::Ollama => write!(f, "ollama"),
            Self::Hash => write!(f, "hash"),
        }
    }
}

impl std::str::FromStr for EmbeddingProviderType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::Openai),
            "ollama" => Ok(Self::Ollama),
            "hash" | "offline" => Ok(Self::Hash),
            _ => Err(format!(
                "Unknown provider: {s}. Valid options: openai, ollama, hash"
            )),
        }
    }
}

/// Embedding settings stored in `~/.docembed/config.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    pub provider: Option<EmbeddingProviderType>,
    pub model: Option<String>,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub chunk_size: Option<usize>,
    pub chunk_overlap: Option<usize>,
    pub concurrency: Option<usize>,
    pub timeout_secs: Option<u64>,
}

impl EmbeddingSettings {
    /// Overlay `other` on top of `self`; fields set in `other` win.
    #[must_use]
    pub fn merged_with(self, other: &Self) -> Self {
        Self {
            provider: other.provider.or(self.provider),
            model: other.model.clone().or(self.model),
            endpoint: other.endpoint.clone().or(self.endpoint),
            api_key: other.api_key.clone().or(self.api_key),
            chunk_size: other.chunk_size.or(self.chunk_size),
            chunk_overlap: other.chunk_overlap.or(self.chunk_overlap),
            concurrency: other.concurrency.or(self.concurrency),
            timeout_secs: other.timeout_secs.or(self.timeout_secs),
        }
    }

    /// Copy with the API key masked, for display.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if let Some(key) = copy.api_key.as_mut() {
            let tail: String = key.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
            *key = format!("****{tail}");
        }
        copy
    }
}

/// docembed local configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocembedConfig {
    pub embeddings: Option<EmbeddingSettings>,
}

/// Provider metadata.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub model: String,
    pub dimensions: usize,
    pub max_chars: usize,
}

/// Model configuration with dimensions and max chars.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    pub name: String,
    pub dimensions: usize,
    pub max_chars: usize,
}

impl ModelConfig {
    fn new(name: &str, dimensions: usize, max_chars: usize) -> Self {
        Self {
            name: name.to_string(),
            dimensions,
            max_chars,
        }
    }
}

/// OpenAI model configurations.
pub mod openai_models {
    use super::ModelConfig;

    pub const DEFAULT_MODEL: &str = "text-embedding-ada-002";

    pub fn get_config(model: &str) -> ModelConfig {
        match model {
            "text-embedding-3-large" => ModelConfig::new(model, 3072, 30000),
            // ada-002, 3-small and anything unknown: 1536 dims, 8191 token window
            _ => ModelConfig::new(model, 1536, 30000),
        }
    }
}

/// Ollama model configurations.
pub mod ollama_models {
    use super::ModelConfig;

    pub const DEFAULT_MODEL: &str = "nomic-embed-text";

    pub fn get_config(model: &str) -> ModelConfig {
        match model {
            "mxbai-embed-large" => ModelConfig::new(model, 1024, 1500),
            "all-minilm" => ModelConfig::new(model, 384, 800),
            // nomic-embed-text and unknown models
            _ => ModelConfig::new(model, 768, 5000),
        }
    }
}

/// Hash model configurations.
pub mod hash_models {
    use super::ModelConfig;

    pub const DEFAULT_MODEL: &str = "hash-embed";

    /// `hash-embed-<n>` selects `n` dimensions; anything else gets 256.
    pub fn get_config(model: &str) -> ModelConfig {
        let dimensions = model
            .strip_prefix("hash-embed-")
            .and_then(|d| d.parse::<usize>().ok())
            .filter(|d| *d > 0)
            .unwrap_or(256);
        ModelConfig::new(model, dimensions, usize::MAX)
    }
}

/// Look up a model for the given provider.
#[must_use]
pub fn model_config(provider: EmbeddingProviderType, model: &str) -> ModelConfig {
    match provider {
        EmbeddingProviderType::Openai => openai_models::get_config(model),
        EmbeddingProviderType::Ollama => ollama_models::get_config(model),
        EmbeddingProviderType::Hash => hash_models::get_config(model),
    }
}

/// Default model id for a provider.
#[must_use]
pub fn default_model(provider: EmbeddingProviderType) -> &'static str {
    match provider {
        EmbeddingProviderType::Openai => openai_models::DEFAULT_MODEL,
        EmbeddingProviderType::Ollama => ollama_models::DEFAULT_MODEL,
        EmbeddingProviderType::Hash => hash_models::DEFAULT_MODEL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_dimensions() {
        assert_eq!(model_config(EmbeddingProviderType::Openai, "text-embedding-ada-002").dimensions, 1536);
        assert_eq!(model_config(EmbeddingProviderType::Openai, "text-embedding-3-large").dimensions, 3072);
        assert_eq!(model_config(EmbeddingProviderType::Ollama, "all-minilm").dimensions, 384);
        assert_eq!(model_config(EmbeddingProviderType::Hash, "hash-embed-64").dimensions, 64);
        assert_eq!(model_config(EmbeddingProviderType::Hash, "hash-embed").dimensions, 256);
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!("OpenAI".parse::<EmbeddingProviderType>(), Ok(EmbeddingProviderType::Openai));
        assert_eq!("offline".parse::<EmbeddingProviderType>(), Ok(EmbeddingProviderType::Hash));
        assert!("huggingface".parse::<EmbeddingProviderType>().is_err());
    }

    #[test]
    fn test_merge_prefers_overlay() {
        let base = EmbeddingSettings {
            model: Some("a".into()),
            chunk_size: Some(500),
            ..Default::default()
        };
        let overlay = EmbeddingSettings {
            model: Some("b".into()),
            ..Default::default()
        };
        let merged = base.merged_with(&overlay);
        assert_eq!(merged.model.as_deref(), Some("b"));
        assert_eq!(merged.chunk_size, Some(500));
    }

    #[test]
    fn test_redacted_masks_key() {
        let settings = EmbeddingSettings {
            api_key: Some("sk-abcdef1234".into()),
            ..Default::default()
        };
        assert_eq!(settings.redacted().api_key.as_deref(), Some("****1234"));
    }
}
