//! Engine configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.
//! Validation happens in [`RagConfigBuilder::build`], so an invalid
//! configuration never reaches a component constructor.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default overlap between consecutive chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;
/// Default number of results for broad and scoped searches.
pub const DEFAULT_TOP_K: usize = 2;
/// Default number of results per company in `compare`.
pub const DEFAULT_COMPARE_K: usize = 1;
/// Default texts per embedding request.
pub const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 10;
/// Default minimum spacing between outbound model calls.
const DEFAULT_MIN_CALL_SPACING_SECS: u64 = 10;
/// Default base for exponential backoff after a rate-limit failure.
const DEFAULT_BASE_WAIT_SECS: u64 = 60;
/// Default number of retries after rate-limit failures.
const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default maximum tool-calling round-trips per attempt.
const DEFAULT_MAX_TOOL_ITERATIONS: usize = 10;
/// Default request timeout. Free-tier endpoints can be slow.
const DEFAULT_TIMEOUT_SECS: u64 = 90;
/// Default chat model.
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
/// Default embedding model.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
/// Default dimensionality for the local hash embedder.
pub const DEFAULT_HASH_DIMENSIONS: usize = 256;

/// Which embedding backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Remote `OpenAI`-compatible embeddings endpoint.
    OpenAi,
    /// Local deterministic feature hashing (offline, no API key).
    Hash,
}

impl EmbeddingProvider {
    /// Parses a provider name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnsupportedProvider`] for unknown names.
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "hash" | "local" => Ok(Self::Hash),
            other => Err(ConfigError::UnsupportedProvider {
                name: other.to_string(),
            }),
        }
    }

    /// Returns `true` for backends that call a remote, rate-limited service.
    #[must_use]
    pub const fn is_remote(self) -> bool {
        matches!(self, Self::OpenAi)
    }
}

/// Configuration for the retrieval and query engine.
#[derive(Debug, Clone)]
pub struct RagConfig {
    /// Chat provider name (e.g., "openai").
    pub provider: String,
    /// API key for remote providers. Empty when only local backends are used.
    pub api_key: String,
    /// Optional base URL override (for proxies or compatible APIs).
    pub base_url: Option<String>,
    /// Chat model identifier.
    pub chat_model: String,
    /// Embedding backend.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier (remote backends).
    pub embedding_model: String,
    /// Requested embedding dimensionality. `None` uses the model default
    /// (remote) or [`DEFAULT_HASH_DIMENSIONS`] (hash).
    pub embedding_dimensions: Option<usize>,
    /// Texts per embedding request.
    pub embedding_batch_size: usize,
    /// Chunk size in characters.
    pub chunk_size: usize,
    /// Chunk overlap in characters.
    pub chunk_overlap: usize,
    /// Results per broad or scoped search.
    pub top_k: usize,
    /// Results per company in `compare`.
    pub compare_k: usize,
    /// Minimum spacing between outbound model calls.
    pub min_call_spacing: Duration,
    /// Base wait for exponential backoff (`base_wait * 2^attempt`).
    pub base_wait: Duration,
    /// Retries after rate-limit failures.
    pub max_retries: u32,
    /// Maximum tool-calling round-trips per attempt.
    pub max_tool_iterations: usize,
    /// Request timeout.
    pub timeout: Duration,
    /// Sampling temperature.
    pub temperature: f32,
    /// Directory containing prompt template overrides.
    pub prompt_dir: Option<PathBuf>,
    /// Append keyword hints to questions before sending them.
    pub enhance_queries: bool,
}

impl RagConfig {
    /// Creates a new builder for `RagConfig`.
    #[must_use]
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a value is invalid or a required key is missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::builder().from_env().build()
    }
}

/// Builder for [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    chat_model: Option<String>,
    embedding_provider: Option<String>,
    embedding_model: Option<String>,
    embedding_dimensions: Option<usize>,
    embedding_batch_size: Option<usize>,
    chunk_size: Option<usize>,
    chunk_overlap: Option<usize>,
    top_k: Option<usize>,
    compare_k: Option<usize>,
    min_call_spacing: Option<Duration>,
    base_wait: Option<Duration>,
    max_retries: Option<u32>,
    max_tool_iterations: Option<usize>,
    timeout: Option<Duration>,
    temperature: Option<f32>,
    prompt_dir: Option<PathBuf>,
    enhance_queries: Option<bool>,
}

/// Reads and parses an environment variable, ignoring unparsable values.
fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl RagConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.provider.is_none() {
            self.provider = std::env::var("FINRAG_PROVIDER").ok();
        }
        if self.api_key.is_none() {
            self.api_key = std::env::var("FINRAG_API_KEY")
                .or_else(|_| std::env::var("OPENAI_API_KEY"))
                .ok();
        }
        if self.base_url.is_none() {
            self.base_url = std::env::var("FINRAG_BASE_URL")
                .or_else(|_| std::env::var("OPENAI_BASE_URL"))
                .ok();
        }
        if self.chat_model.is_none() {
            self.chat_model = std::env::var("FINRAG_CHAT_MODEL").ok();
        }
        if self.embedding_provider.is_none() {
            self.embedding_provider = std::env::var("FINRAG_EMBEDDING_PROVIDER").ok();
        }
        if self.embedding_model.is_none() {
            self.embedding_model = std::env::var("FINRAG_EMBEDDING_MODEL").ok();
        }
        if self.embedding_dimensions.is_none() {
            self.embedding_dimensions = env_parse("FINRAG_EMBEDDING_DIMENSIONS");
        }
        if self.embedding_batch_size.is_none() {
            self.embedding_batch_size = env_parse("FINRAG_EMBEDDING_BATCH_SIZE");
        }
        if self.chunk_size.is_none() {
            self.chunk_size = env_parse("FINRAG_CHUNK_SIZE");
        }
        if self.chunk_overlap.is_none() {
            self.chunk_overlap = env_parse("FINRAG_CHUNK_OVERLAP");
        }
        if self.top_k.is_none() {
            self.top_k = env_parse("FINRAG_TOP_K");
        }
        if self.min_call_spacing.is_none() {
            self.min_call_spacing =
                env_parse::<u64>("FINRAG_MIN_CALL_SPACING_SECS").map(Duration::from_secs);
        }
        if self.base_wait.is_none() {
            self.base_wait = env_parse::<u64>("FINRAG_BASE_WAIT_SECS").map(Duration::from_secs);
        }
        if self.max_retries.is_none() {
            self.max_retries = env_parse("FINRAG_MAX_RETRIES");
        }
        if self.prompt_dir.is_none() {
            self.prompt_dir = std::env::var("FINRAG_PROMPT_DIR").ok().map(PathBuf::from);
        }
        self
    }

    /// Sets the chat provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the chat model.
    #[must_use]
    pub fn chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = Some(model.into());
        self
    }

    /// Sets the embedding backend by name (`openai` or `hash`).
    #[must_use]
    pub fn embedding_provider(mut self, name: impl Into<String>) -> Self {
        self.embedding_provider = Some(name.into());
        self
    }

    /// Sets the embedding model.
    #[must_use]
    pub fn embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = Some(model.into());
        self
    }

    /// Sets the embedding dimensionality.
    #[must_use]
    pub const fn embedding_dimensions(mut self, n: usize) -> Self {
        self.embedding_dimensions = Some(n);
        self
    }

    /// Sets the embedding batch size.
    #[must_use]
    pub const fn embedding_batch_size(mut self, n: usize) -> Self {
        self.embedding_batch_size = Some(n);
        self
    }

    /// Sets the chunk size.
    #[must_use]
    pub const fn chunk_size(mut self, n: usize) -> Self {
        self.chunk_size = Some(n);
        self
    }

    /// Sets the chunk overlap.
    #[must_use]
    pub const fn chunk_overlap(mut self, n: usize) -> Self {
        self.chunk_overlap = Some(n);
        self
    }

    /// Sets the search top-k.
    #[must_use]
    pub const fn top_k(mut self, n: usize) -> Self {
        self.top_k = Some(n);
        self
    }

    /// Sets the per-company result count for `compare`.
    #[must_use]
    pub const fn compare_k(mut self, n: usize) -> Self {
        self.compare_k = Some(n);
        self
    }

    /// Sets the minimum spacing between model calls.
    #[must_use]
    pub const fn min_call_spacing(mut self, spacing: Duration) -> Self {
        self.min_call_spacing = Some(spacing);
        self
    }

    /// Sets the backoff base wait.
    #[must_use]
    pub const fn base_wait(mut self, wait: Duration) -> Self {
        self.base_wait = Some(wait);
        self
    }

    /// Sets the max retries.
    #[must_use]
    pub const fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Sets the maximum tool-calling loop iterations.
    #[must_use]
    pub const fn max_tool_iterations(mut self, n: usize) -> Self {
        self.max_tool_iterations = Some(n);
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub const fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    /// Sets the prompt template directory.
    #[must_use]
    pub fn prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = Some(dir.into());
        self
    }

    /// Enables or disables query enhancement.
    #[must_use]
    pub const fn enhance_queries(mut self, enabled: bool) -> Self {
        self.enhance_queries = Some(enabled);
        self
    }

    /// Builds and validates the [`RagConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOverlap`] if `chunk_overlap >= chunk_size`,
    /// [`ConfigError::InvalidValue`] for zero sizes or counts,
    /// [`ConfigError::UnsupportedProvider`] for unknown embedding backends, and
    /// [`ConfigError::ApiKeyMissing`] if a remote embedding backend has no key.
    pub fn build(self) -> Result<RagConfig, ConfigError> {
        let embedding_provider = self
            .embedding_provider
            .as_deref()
            .map_or(Ok(EmbeddingProvider::OpenAi), EmbeddingProvider::parse)?;

        let api_key = self.api_key.unwrap_or_default();
        if embedding_provider.is_remote() && api_key.trim().is_empty() {
            return Err(ConfigError::ApiKeyMissing);
        }

        let chunk_size = self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE);
        let chunk_overlap = self.chunk_overlap.unwrap_or(DEFAULT_CHUNK_OVERLAP);
        if chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "chunk_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if chunk_overlap >= chunk_size {
            return Err(ConfigError::InvalidOverlap {
                size: chunk_size,
                overlap: chunk_overlap,
            });
        }

        let positive = |field: &'static str, value: usize| {
            if value == 0 {
                Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be at least 1".to_string(),
                })
            } else {
                Ok(value)
            }
        };

        let embedding_batch_size = positive(
            "embedding_batch_size",
            self.embedding_batch_size
                .unwrap_or(DEFAULT_EMBEDDING_BATCH_SIZE),
        )?;
        let top_k = positive("top_k", self.top_k.unwrap_or(DEFAULT_TOP_K))?;
        let compare_k = positive("compare_k", self.compare_k.unwrap_or(DEFAULT_COMPARE_K))?;
        let max_tool_iterations = positive(
            "max_tool_iterations",
            self.max_tool_iterations
                .unwrap_or(DEFAULT_MAX_TOOL_ITERATIONS),
        )?;
        if let Some(dims) = self.embedding_dimensions {
            positive("embedding_dimensions", dims)?;
        }

        Ok(RagConfig {
            provider: self.provider.unwrap_or_else(|| "openai".to_string()),
            api_key,
            base_url: self.base_url,
            chat_model: self
                .chat_model
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            embedding_provider,
            embedding_model: self
                .embedding_model
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_dimensions: self.embedding_dimensions,
            embedding_batch_size,
            chunk_size,
            chunk_overlap,
            top_k,
            compare_k,
            min_call_spacing: self
                .min_call_spacing
                .unwrap_or(Duration::from_secs(DEFAULT_MIN_CALL_SPACING_SECS)),
            base_wait: self
                .base_wait
                .unwrap_or(Duration::from_secs(DEFAULT_BASE_WAIT_SECS)),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            max_tool_iterations,
            timeout: self
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            temperature: self.temperature.unwrap_or(0.0),
            prompt_dir: self.prompt_dir,
            enhance_queries: self.enhance_queries.unwrap_or(true),
        })
    }
}
