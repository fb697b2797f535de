//! OpenAI-compatible embedding provider.
//!
//! Talks to any endpoint implementing `POST {base}/embeddings` with bearer
//! authentication. No retries: a 429 surfaces as `RateLimited` and the
//! caller decides what to do.

use crate::error::{Error, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::provider::EmbeddingProvider;
use super::types::{openai_models, ProviderInfo};

/// Default API base URL.
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";

/// OpenAI embedding provider.
pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OpenAiProvider {
    /// Create a provider with the given API key.
    ///
    /// # Errors
    ///
    /// Returns `Config` when the key is blank or not a valid header value.
    pub fn new(api_key: &str, endpoint: Option<String>, model: Option<String>) -> Result<Self> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(Error::Config("missing OpenAI API key".into()));
        }

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| Error::Config("invalid OpenAI API key".into()))?;
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        let base_url = endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.unwrap_or_else(|| openai_models::DEFAULT_MODEL.to_string()),
        })
    }

    async fn embed(&self, inputs: &[&str], model: &str) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.base_url);
        let request = EmbeddingRequest { model, input: inputs };

        let response = self.client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("OpenAI request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::RateLimited(format!("OpenAI rate limit: {body}")));
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(Error::Upstream(format!(
                "OpenAI embeddings request failed ({status}): {body}"
            )));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("Failed to parse OpenAI response: {e}")))?;

        parsed.data.sort_by_key(|entry| entry.index);
        if parsed.data.len() != inputs.len() {
            return Err(Error::Upstream(format!(
                "OpenAI returned {} embeddings for {} inputs",
                parsed.data.len(),
                inputs.len()
            )));
        }

        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    #[serde(borrow)]
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl EmbeddingProvider for OpenAiProvider {
    fn info(&self) -> ProviderInfo {
        let config = openai_models::get_config(&self.model);
        ProviderInfo {
            name: "openai".to_string(),
            model: self.model.clone(),
            dimensions: config.dimensions,
            max_chars: config.max_chars,
        }
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/models", self.base_url);
        match self.client
            .get(&url)
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await
        {
            Ok(r) => r.status().is_success(),
            Err(_) => false,
        }
    }

    async fn generate_embedding(&self, text: &str, model: &str) -> Result<Vec<f32>> {
        self.embed(&[text], model)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Upstream("No embeddings returned from OpenAI".into()))
    }

    async fn generate_embeddings(&self, texts: &[&str], model: &str) -> Result<Vec<Vec<f32>>> {
        self.embed(texts, model).await
    }
}
