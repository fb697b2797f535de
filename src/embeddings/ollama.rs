//! Ollama embedding provider.
//!
//! Uses a local Ollama server for embedding generation.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

use super::provider::EmbeddingProvider;
use super::types::{ollama_models, ProviderInfo};

/// Default Ollama server address.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";

/// Ollama embedding provider.
pub struct OllamaProvider {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaProvider {
    /// Create a provider for the default local server and model.
    pub fn new() -> Self {
        Self::with_config(None, None)
    }

    /// Create a provider with a custom endpoint or default model.
    pub fn with_config(endpoint: Option<String>, model: Option<String>) -> Self {
        let endpoint = endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.unwrap_or_else(|| ollama_models::DEFAULT_MODEL.to_string()),
        }
    }

    async fn embed(&self, input: EmbedInput<'_>, model: &str) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.endpoint);
        let request = OllamaEmbedRequest { model, input };

        let response = self.client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("Ollama request failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited("Ollama rejected the request (429)".into()));
        }
        if !status.is_success() {
            let error = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!("Ollama embedding failed ({status}): {error}")));
        }

        let data: OllamaEmbedResponse = response.json().await
            .map_err(|e| Error::Upstream(format!("Failed to parse Ollama response: {e}")))?;

        Ok(data.embeddings)
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Ollama API response for listing models.
#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    models: Option<Vec<OllamaModel>>,
}

#[derive(Debug, Deserialize)]
struct OllamaModel {
    name: String,
}

/// Ollama API request for embedding.
#[derive(Debug, Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: EmbedInput<'a>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum EmbedInput<'a> {
    Single(&'a str),
    Batch(Vec<&'a str>),
}

/// Ollama API response for embedding.
#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl EmbeddingProvider for OllamaProvider {
    fn info(&self) -> ProviderInfo {
        let config = ollama_models::get_config(&self.model);
        ProviderInfo {
            name: "ollama".to_string(),
            model: self.model.clone(),
            dimensions: config.dimensions,
            max_chars: config.max_chars,
        }
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.endpoint);

        let response = match self.client
            .get(&url)
            .timeout(std::time::Duration::from_secs(2))
            .send()
            .await
        {
            Ok(r) => r,
            Err(_) => return false,
        };

        if !response.status().is_success() {
            return false;
        }

        let data: OllamaTagsResponse = match response.json().await {
            Ok(d) => d,
            Err(_) => return false,
        };

        // Tags carry a `:latest` style suffix
        data.models.is_some_and(|models| {
            models.iter().any(|m| {
                m.name == self.model || m.name.starts_with(&format!("{}:", self.model))
            })
        })
    }

    async fn generate_embedding(&self, text: &str, model: &str) -> Result<Vec<f32>> {
        self.embed(EmbedInput::Single(text), model)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Upstream("No embeddings returned from Ollama".into()))
    }

    async fn generate_embeddings(&self, texts: &[&str], model: &str) -> Result<Vec<Vec<f32>>> {
        let embeddings = self.embed(EmbedInput::Batch(texts.to_vec()), model).await?;
        if embeddings.len() != texts.len() {
            return Err(Error::Upstream(format!(
                "Ollama returned {} embeddings for {} inputs",
                embeddings.len(),
                texts.len()
            )));
        }
        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_provider_creation() {
        let provider = OllamaProvider::new();
        let info = provider.info();
        assert_eq!(info.name, "ollama");
        assert_eq!(info.model, "nomic-embed-text");
        assert_eq!(info.dimensions, 768);
    }

    #[test]
    fn test_ollama_provider_custom_config() {
        let provider = OllamaProvider::with_config(
            Some("http://custom:11434/".to_string()),
            Some("mxbai-embed-large".to_string()),
        );
        let info = provider.info();
        assert_eq!(info.model, "mxbai-embed-large");
        assert_eq!(info.dimensions, 1024);
        assert_eq!(provider.endpoint, "http://custom:11434");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_upstream_error() {
        let provider = OllamaProvider::with_config(Some("http://127.0.0.1:1".into()), None);
        assert!(!provider.is_available().await);
        let err = provider.generate_embedding("hi", "nomic-embed-text").await.unwrap_err();
        assert!(matches!(err, Error::Upstream(_)));
    }
}
