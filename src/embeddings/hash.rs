//! Offline hash embedding provider.
//!
//! Produces deterministic vectors by feature hashing words and character
//! trigrams with SHA-256. No network and no model weights: identical text
//! always maps to the identical unit vector, and texts that share
//! vocabulary get positive cosine similarity.
//!
//! Fault injection hooks make it the stand-in provider for pipeline tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use super::provider::EmbeddingProvider;
use super::types::{hash_models, ProviderInfo};

#[derive(Debug, Clone, Copy)]
enum Fault {
    Upstream(usize),
    RateLimited(usize),
}

/// Deterministic feature-hashing provider.
#[derive(Debug, Clone)]
pub struct HashProvider {
    model: String,
    calls: Arc<AtomicUsize>,
    fault: Option<Fault>,
    delay: Option<Duration>,
}

impl HashProvider {
    /// Create a provider for the default `hash-embed` model.
    #[must_use]
    pub fn new() -> Self {
        Self::with_model(hash_models::DEFAULT_MODEL)
    }

    #[must_use]
    pub fn with_model(model: &str) -> Self {
        Self {
            model: model.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
            fault: None,
            delay: None,
        }
    }

    /// Fail the `k`-th call (1-based) with `Upstream`.
    #[must_use]
    pub fn failing_on_call(mut self, k: usize) -> Self {
        self.fault = Some(Fault::Upstream(k));
        self
    }

    /// Fail the `k`-th call (1-based) with `RateLimited`.
    #[must_use]
    pub fn rate_limited_on_call(mut self, k: usize) -> Self {
        self.fault = Some(Fault::RateLimited(k));
        self
    }

    /// Sleep before answering each call.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Shared counter of calls made so far.
    #[must_use]
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    /// Embed without counting a call or applying faults.
    #[must_use]
    pub fn embed(text: &str, dimensions: usize) -> Vec<f32> {
        let dimensions = dimensions.max(1);
        let mut vector = vec![0.0f32; dimensions];
        let lowered = text.to_lowercase();

        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        for word in &words {
            accumulate(&mut vector, word.as_bytes(), 1.0);

            let chars: Vec<char> = word.chars().collect();
            if chars.len() > 3 {
                for gram in chars.windows(3) {
                    let gram: String = gram.iter().collect();
                    accumulate(&mut vector, gram.as_bytes(), 0.5);
                }
            }
        }

        // Punctuation-only input still gets a stable direction
        if words.is_empty() {
            accumulate(&mut vector, lowered.as_bytes(), 1.0);
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn accumulate(vector: &mut [f32], feature: &[u8], weight: f32) {
    let digest = Sha256::digest(feature);
    let mut bucket = [0u8; 8];
    bucket.copy_from_slice(&digest[..8]);
    let index = (u64::from_le_bytes(bucket) % vector.len() as u64) as usize;
    let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
    vector[index] += sign * weight;
}

impl EmbeddingProvider for HashProvider {
    fn info(&self) -> ProviderInfo {
        let config = hash_models::get_config(&self.model);
        ProviderInfo {
            name: "hash".to_string(),
            model: self.model.clone(),
            dimensions: config.dimensions,
            max_chars: config.max_chars,
        }
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn generate_embedding(&self, text: &str, model: &str) -> Result<Vec<f32>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.fault {
            Some(Fault::Upstream(k)) if k == call => {
                return Err(Error::Upstream(format!("injected failure on call {call}")));
            }
            Some(Fault::RateLimited(k)) if k == call => {
                return Err(Error::RateLimited(format!("injected rate limit on call {call}")));
            }
            _ => {}
        }

        Ok(Self::embed(text, hash_models::get_config(model).dimensions))
    }
}
