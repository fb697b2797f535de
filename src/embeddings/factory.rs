//! Embedding provider factory.
//!
//! Turns resolved settings into a ready [`EmbeddingClient`].

use crate::error::{Error, Result};

use super::client::EmbeddingClient;
use super::config::ResolvedSettings;
use super::hash::HashProvider;
use super::ollama::OllamaProvider;
use super::openai::OpenAiProvider;
use super::provider::{BoxedProvider, EmbeddingProvider};
use super::types::EmbeddingProviderType;

/// Available provider detection result.
#[derive(Debug, Clone)]
pub struct ProviderDetection {
    /// List of available provider names.
    pub available: Vec<String>,
    /// Recommended provider (first available).
    pub recommended: Option<String>,
}

/// Check the networked providers, falling back to the offline one.
pub async fn detect_available_providers(settings: &ResolvedSettings) -> ProviderDetection {
    let mut available = Vec::new();

    if let Some(key) = settings.api_key.as_deref() {
        if let Ok(openai) = OpenAiProvider::new(key, settings.endpoint.clone(), None) {
            if openai.is_available().await {
                available.push("openai".to_string());
            }
        }
    }

    if OllamaProvider::with_config(ollama_endpoint(settings), None).is_available().await {
        available.push("ollama".to_string());
    }

    available.push("hash".to_string());
    let recommended = available.first().cloned();

    ProviderDetection {
        available,
        recommended,
    }
}

/// The custom endpoint only applies to the provider it was configured for.
fn ollama_endpoint(settings: &ResolvedSettings) -> Option<String> {
    match settings.provider {
        EmbeddingProviderType::Ollama => settings.endpoint.clone(),
        _ => None,
    }
}

/// Create the configured provider.
///
/// # Errors
///
/// Returns `Config` when OpenAI is selected without an API key.
pub fn create_provider(settings: &ResolvedSettings) -> Result<BoxedProvider> {
    let model = Some(settings.model.clone());
    match settings.provider {
        EmbeddingProviderType::Openai => {
            let key = settings.api_key.as_deref().ok_or_else(|| {
                Error::Config("OpenAI provider selected but no API key is configured".into())
            })?;
            Ok(BoxedProvider::new(OpenAiProvider::new(key, settings.endpoint.clone(), model)?))
        }
        EmbeddingProviderType::Ollama => Ok(BoxedProvider::new(OllamaProvider::with_config(
            settings.endpoint.clone(),
            model,
        ))),
        EmbeddingProviderType::Hash => Ok(BoxedProvider::new(HashProvider::with_model(&settings.model))),
    }
}

/// Create the configured provider wrapped in a client with its timeout.
///
/// # Errors
///
/// Same as [`create_provider`].
pub fn create_client(settings: &ResolvedSettings) -> Result<EmbeddingClient> {
    Ok(EmbeddingClient::new(create_provider(settings)?).with_timeout(settings.timeout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::types::EmbeddingSettings;
    use std::time::Duration;

    #[test]
    fn test_openai_requires_key() {
        let settings = ResolvedSettings::from_settings(&EmbeddingSettings {
            provider: Some(EmbeddingProviderType::Openai),
            ..Default::default()
        });
        assert!(matches!(create_provider(&settings), Err(Error::Config(_))));
    }

    #[test]
    fn test_hash_client_carries_timeout() {
        let settings = ResolvedSettings::from_settings(&EmbeddingSettings {
            provider: Some(EmbeddingProviderType::Hash),
            model: Some("hash-embed-64".into()),
            timeout_secs: Some(3),
            ..Default::default()
        });
        let client = create_client(&settings).unwrap();
        assert_eq!(client.info().dimensions, 64);
        assert_eq!(client.timeout(), Duration::from_secs(3));
    }
}
