//! Text embedding.
//!
//! [`Embedder`] batches texts through a pluggable [`EmbeddingBackend`] and
//! guarantees one vector per input, in input order. Remote backends share
//! the caller's [`RateLimiter`] so embedding traffic respects the same
//! spacing policy as chat completions.

pub mod hash;
#[cfg(feature = "openai")]
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::{DEFAULT_EMBEDDING_BATCH_SIZE, EmbeddingProvider, RagConfig};
use crate::error::{ConfigError, EmbeddingError};
use crate::ratelimit::RateLimiter;

pub use hash::HashEmbedder;
#[cfg(feature = "openai")]
pub use openai::OpenAiEmbedder;

/// Backend that turns a batch of texts into vectors.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &'static str;

    /// Whether calls go to a remote, rate-limited service.
    fn is_remote(&self) -> bool {
        false
    }

    /// Embeds one batch. Must return exactly one vector per input, in order.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError`] on backend failure.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Batching, order-preserving embedder.
pub struct Embedder {
    backend: Box<dyn EmbeddingBackend>,
    batch_size: usize,
    limiter: Option<Arc<RateLimiter>>,
}

impl std::fmt::Debug for Embedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Embedder")
            .field("backend", &self.backend.name())
            .field("batch_size", &self.batch_size)
            .field("rate_limited", &self.limiter.is_some())
            .finish()
    }
}

impl Embedder {
    /// Wraps a backend. A zero batch size is treated as 1.
    #[must_use]
    pub fn new(backend: Box<dyn EmbeddingBackend>, batch_size: usize) -> Self {
        Self {
            backend,
            batch_size: batch_size.max(1),
            limiter: None,
        }
    }

    /// Routes every batch call through `limiter` before it is sent.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Backend name.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Texts per backend call.
    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Embeds `texts`, returning one vector per text in the same order.
    ///
    /// # Errors
    ///
    /// Fails the whole call if any batch fails or returns the wrong number
    /// of vectors. No partial results are returned.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());

        for (batch_index, batch) in texts.chunks(self.batch_size).enumerate() {
            if let Some(limiter) = &self.limiter {
                limiter.acquire().await;
            }

            let embedded = self.backend.embed_batch(batch).await?;
            if embedded.len() != batch.len() {
                return Err(EmbeddingError::CountMismatch {
                    expected: batch.len(),
                    actual: embedded.len(),
                });
            }

            debug!(
                backend = self.backend.name(),
                batch = batch_index,
                done = vectors.len() + embedded.len(),
                total = texts.len(),
                "embedded batch"
            );
            vectors.extend(embedded);
        }

        Ok(vectors)
    }

    /// Embeds a single query string.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError`] if the backend fails.
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed(&[query.to_string()]).await?;
        vectors.pop().ok_or(EmbeddingError::CountMismatch {
            expected: 1,
            actual: 0,
        })
    }
}

/// Creates the configured embedder.
///
/// Remote backends are wired to `limiter`; local ones ignore it.
///
/// # Errors
///
/// Returns [`ConfigError::UnsupportedProvider`] if the configured backend is
/// not compiled in.
pub fn create_embedder(
    config: &RagConfig,
    limiter: &Arc<RateLimiter>,
) -> Result<Embedder, ConfigError> {
    let backend: Box<dyn EmbeddingBackend> = match config.embedding_provider {
        EmbeddingProvider::Hash => Box::new(HashEmbedder::new(
            config
                .embedding_dimensions
                .unwrap_or(crate::config::DEFAULT_HASH_DIMENSIONS),
        )),
        #[cfg(feature = "openai")]
        EmbeddingProvider::OpenAi => Box::new(OpenAiEmbedder::new(config)),
        #[cfg(not(feature = "openai"))]
        EmbeddingProvider::OpenAi => {
            return Err(ConfigError::UnsupportedProvider {
                name: "openai".to_string(),
            });
        }
    };

    let embedder = Embedder::new(backend, config.embedding_batch_size);
    if embedder.backend.is_remote() {
        Ok(embedder.with_rate_limiter(Arc::clone(limiter)))
    } else {
        Ok(embedder)
    }
}

impl Default for Embedder {
    fn default() -> Self {
        Self::new(
            Box::new(HashEmbedder::default()),
            DEFAULT_EMBEDDING_BATCH_SIZE,
        )
    }
}
