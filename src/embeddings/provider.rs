//! Embedding provider trait.
//!
//! Defines the interface that all embedding providers must implement.
//! Methods are async so HTTP providers can be awaited without blocking.

use std::future::Future;
use std::pin::Pin;

use crate::error::Result;
use super::types::ProviderInfo;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for embedding providers.
///
/// Implemented by the OpenAI, Ollama and hash providers. The model id is
/// passed per call so one provider instance can serve several models.
pub trait EmbeddingProvider: Send + Sync {
    /// Get provider metadata.
    fn info(&self) -> ProviderInfo;

    /// Check if the provider is reachable and the model usable.
    fn is_available(&self) -> impl Future<Output = bool> + Send;

    /// Generate embedding for a single text.
    fn generate_embedding(&self, text: &str, model: &str) -> impl Future<Output = Result<Vec<f32>>> + Send;

    /// Generate embeddings for multiple texts (batch).
    ///
    /// Default implementation calls `generate_embedding` for each text.
    fn generate_embeddings(&self, texts: &[&str], model: &str) -> impl Future<Output = Result<Vec<Vec<f32>>>> + Send {
        async move {
            let mut results = Vec::with_capacity(texts.len());
            for text in texts {
                results.push(self.generate_embedding(text, model).await?);
            }
            Ok(results)
        }
    }
}

/// Boxed provider for dynamic dispatch.
///
/// Since the trait has async methods with `impl Future`, we need this wrapper
/// for runtime polymorphism.
pub struct BoxedProvider {
    inner: Box<dyn EmbeddingProviderBoxed>,
}

/// Object-safe version of EmbeddingProvider for boxing.
pub trait EmbeddingProviderBoxed: Send + Sync {
    fn info(&self) -> ProviderInfo;
    fn is_available_boxed(&self) -> BoxFuture<'_, bool>;
    fn generate_embedding_boxed(&self, text: String, model: String) -> BoxFuture<'_, Result<Vec<f32>>>;
    fn generate_embeddings_boxed(&self, texts: Vec<String>, model: String) -> BoxFuture<'_, Result<Vec<Vec<f32>>>>;
}

impl BoxedProvider {
    /// Create a new boxed provider.
    pub fn new<P: EmbeddingProvider + 'static>(provider: P) -> Self {
        Self {
            inner: Box::new(BoxedProviderWrapper(provider)),
        }
    }

    /// Get provider metadata.
    pub fn info(&self) -> ProviderInfo {
        self.inner.info()
    }

    /// Check if the provider is available.
    pub async fn is_available(&self) -> bool {
        self.inner.is_available_boxed().await
    }

    /// Generate embedding for a single text.
    pub async fn generate_embedding(&self, text: &str, model: &str) -> Result<Vec<f32>> {
        self.inner
            .generate_embedding_boxed(text.to_string(), model.to_string())
            .await
    }

    /// Generate embeddings for multiple texts (batch).
    pub async fn generate_embeddings(&self, texts: &[&str], model: &str) -> Result<Vec<Vec<f32>>> {
        let owned = texts.iter().map(|s| (*s).to_string()).collect();
        self.inner
            .generate_embeddings_boxed(owned, model.to_string())
            .await
    }
}

/// Wrapper to implement EmbeddingProviderBoxed for any EmbeddingProvider.
struct BoxedProviderWrapper<P: EmbeddingProvider + 'static>(P);

impl<P: EmbeddingProvider + 'static> EmbeddingProviderBoxed for BoxedProviderWrapper<P> {
    fn info(&self) -> ProviderInfo {
        self.0.info()
    }

    fn is_available_boxed(&self) -> BoxFuture<'_, bool> {
        Box::pin(self.0.is_available())
    }

    // Owned arguments keep the returned future independent of the caller's
    // borrows.
    fn generate_embedding_boxed(&self, text: String, model: String) -> BoxFuture<'_, Result<Vec<f32>>> {
        Box::pin(async move { self.0.generate_embedding(&text, &model).await })
    }

    fn generate_embeddings_boxed(&self, texts: Vec<String>, model: String) -> BoxFuture<'_, Result<Vec<Vec<f32>>>> {
        Box::pin(async move {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            self.0.generate_embeddings(&refs, &model).await
        })
    }
}
