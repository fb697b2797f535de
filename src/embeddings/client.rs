//! Embedding client adapter.
//!
//! Thin layer over a [`BoxedProvider`] that enforces the call contract the
//! pipeline relies on: blank input is rejected locally and every provider
//! call is bounded by a timeout. No caching, no retries.

use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};
use super::config::DEFAULT_TIMEOUT_SECS;
use super::provider::{BoxedProvider, EmbeddingProvider};
use super::types::ProviderInfo;

/// Provider plus per-call timeout.
pub struct EmbeddingClient {
    provider: BoxedProvider,
    timeout: Duration,
}

impl EmbeddingClient {
    /// Wrap a provider with the default timeout.
    pub fn new(provider: BoxedProvider) -> Self {
        Self {
            provider,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Wrap a concrete provider.
    pub fn from_provider<P: EmbeddingProvider + 'static>(provider: P) -> Self {
        Self::new(BoxedProvider::new(provider))
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn info(&self) -> ProviderInfo {
        self.provider.info()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn is_available(&self) -> bool {
        self.provider.is_available().await
    }

    /// Embed one text with `model`.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for empty or whitespace-only text, `Upstream` on
    /// timeout or when the vector is empty or holds NaN or infinity,
    /// otherwise whatever the provider reports.
    pub async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("cannot embed empty text".into()));
        }

        debug!(model, chars = text.chars().count(), "requesting embedding");

        let vector = tokio::time::timeout(self.timeout, self.provider.generate_embedding(text, model))
            .await
            .map_err(|_| {
                Error::Upstream(format!(
                    "embedding request timed out after {}s",
                    self.timeout.as_secs_f32()
                ))
            })??;

        if vector.is_empty() {
            return Err(Error::Upstream("provider returned an empty vector".into()));
        }
        if let Some(pos) = vector.iter().position(|v| !v.is_finite()) {
            return Err(Error::Upstream(format!(
                "provider returned a non-finite value at dimension {pos}"
            )));
        }
        Ok(vector)
    }
}
