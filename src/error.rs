//! Error types for finrag.
//!
//! Each layer has its own error enum; [`Error`] wraps them for the CLI.
//! Retry classification for upstream model services lives on
//! [`AgentError::is_rate_limited`].

use std::time::Duration;

use thiserror::Error;

/// Result alias used by the CLI layer.
pub type Result<T> = std::result::Result<T, Error>;

/// Substrings (lowercase) that mark a backend failure as a rate-limit signal.
///
/// Matching is case-insensitive against the backend's error message.
pub const RATE_LIMIT_PATTERNS: &[&str] = &[
    "429",
    "resource exhausted",
    "resource_exhausted",
    "quota",
    "rate limit",
    "rate_limit",
    "too many requests",
];

/// Returns `true` if a backend message or status indicates throttling.
#[must_use]
pub fn is_rate_limit_signal(message: &str, status: Option<u16>) -> bool {
    if status == Some(429) {
        return true;
    }
    let lower = message.to_lowercase();
    RATE_LIMIT_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Top-level error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Vector index failure.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Embedding backend failure.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// Agent / query failure.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// CLI command failure.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors. Raised at construction time, never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Chunk overlap must be strictly smaller than chunk size.
    #[error("chunk overlap ({overlap}) must be less than chunk size ({size})")]
    InvalidOverlap {
        /// Configured chunk size.
        size: usize,
        /// Configured overlap.
        overlap: usize,
    },

    /// A field holds a value outside its accepted range.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// A remote provider was selected but no API key is available.
    #[error("API key not set (set FINRAG_API_KEY or OPENAI_API_KEY)")]
    ApiKeyMissing,

    /// Unknown provider name.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// The rejected provider name.
        name: String,
    },
}

/// Vector index errors.
#[derive(Error, Debug)]
pub enum IndexError {
    /// Vector length differs from the dimensionality the index was built with.
    #[error("dimension mismatch: index holds {expected}-d vectors, got {actual}-d")]
    DimensionMismatch {
        /// Established dimensionality.
        expected: usize,
        /// Offending vector length.
        actual: usize,
    },

    /// `add` called with different numbers of chunks and vectors.
    #[error("length mismatch: {chunks} chunks but {vectors} vectors")]
    LengthMismatch {
        /// Chunk count.
        chunks: usize,
        /// Vector count.
        vectors: usize,
    },

    /// `k` must be at least 1.
    #[error("top-k must be at least 1 (got {k})")]
    InvalidTopK {
        /// Requested k.
        k: usize,
    },

    /// Database has not been initialized.
    #[error("index not initialized. Run: finrag init")]
    NotInitialized,

    /// Stored row could not be decoded.
    #[error("corrupt index row {row_id}: {message}")]
    Corrupt {
        /// Row identifier.
        row_id: i64,
        /// What went wrong.
        message: String,
    },

    /// `SQLite` failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem failure around the database file.
    #[error("index I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Embedding failures.
#[derive(Error, Debug, Clone)]
pub enum EmbeddingError {
    /// Backend call failed for a reason other than throttling.
    #[error("embedding backend failed: {message}")]
    Backend {
        /// Backend's message.
        message: String,
    },

    /// Backend signalled throttling.
    #[error("embedding backend rate limited: {message}")]
    RateLimited {
        /// Backend's message.
        message: String,
    },

    /// Backend returned a different number of vectors than inputs.
    #[error("embedding backend returned {actual} vectors for {expected} inputs")]
    CountMismatch {
        /// Inputs sent.
        expected: usize,
        /// Vectors received.
        actual: usize,
    },
}

impl EmbeddingError {
    /// Builds an error from a backend message, classifying throttling.
    #[must_use]
    pub fn from_backend(message: String, status: Option<u16>) -> Self {
        if is_rate_limit_signal(&message, status) {
            Self::RateLimited { message }
        } else {
            Self::Backend { message }
        }
    }
}

/// Agent and query errors.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Model service signalled throttling (retryable).
    #[error("model service rate limited: {message}")]
    RateLimited {
        /// Backend's message, kept for diagnostics only.
        message: String,
    },

    /// Model service request failed.
    #[error("API request failed: {message}")]
    ApiRequest {
        /// Error message.
        message: String,
        /// HTTP status, if known.
        status: Option<u16>,
    },

    /// A retrieval tool failed internally.
    #[error("tool '{name}' failed: {message}")]
    ToolExecution {
        /// Tool name.
        name: String,
        /// Error detail.
        message: String,
    },

    /// The model kept requesting tools past the iteration limit.
    #[error("tool-calling loop exceeded {max_iterations} iterations")]
    ToolLoopExceeded {
        /// Configured limit.
        max_iterations: usize,
    },

    /// No assistant message with usable content was produced.
    #[error("model produced no usable answer ({messages} messages scanned)")]
    EmptyResponse {
        /// Number of messages in the scanned conversation.
        messages: usize,
    },

    /// Rate limiting persisted through every retry.
    #[error("rate limited after {attempts} attempts ({waited:?} spent in backoff)")]
    RetriesExhausted {
        /// Attempts made.
        attempts: u32,
        /// Total backoff wait.
        waited: Duration,
    },

    /// The index holds no documents.
    #[error("no documents indexed")]
    NoDocuments,

    /// The question was rejected before any model call.
    #[error("invalid query: {reason}")]
    InvalidQuery {
        /// Why.
        reason: String,
    },

    /// Embedding failed during retrieval.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// Index failed during retrieval.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AgentError {
    /// Builds an error from a model service failure, classifying throttling.
    #[must_use]
    pub fn from_api_failure(message: String, status: Option<u16>) -> Self {
        if is_rate_limit_signal(&message, status) {
            Self::RateLimited { message }
        } else {
            Self::ApiRequest { message, status }
        }
    }

    /// Returns `true` if this error should trigger backoff and retry.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Embedding(EmbeddingError::RateLimited { .. }) => true,
            Self::ApiRequest { message, status } => is_rate_limit_signal(message, *status),
            _ => false,
        }
    }

    /// Caller-facing explanation.
    ///
    /// Rate-limit outcomes never include the raw backend text.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::RetriesExhausted { attempts, waited } => format!(
                "The language model service is rate limiting requests. \
                 The query was tried {attempts} times with {}s of backoff and still \
                 could not complete. Try again later, or ask a narrower question that \
                 needs fewer lookups.",
                waited.as_secs()
            ),
            Self::RateLimited { .. } | Self::Embedding(EmbeddingError::RateLimited { .. }) => {
                "The language model service is rate limiting requests. Try again later."
                    .to_string()
            }
            Self::NoDocuments => "No documents are indexed yet. Ingest some filings \
                                  before asking questions."
                .to_string(),
            Self::EmptyResponse { .. } => "The query was processed but no answer was \
                                           produced. Try rephrasing with a company name or \
                                           ticker (e.g. AAPL) and a specific metric (e.g. \
                                           revenue, net income)."
                .to_string(),
            Self::InvalidQuery { reason } => format!("Please provide a valid query: {reason}."),
            other => format!("Error processing query: {other}"),
        }
    }
}

/// CLI command errors.
#[derive(Error, Debug)]
pub enum CommandError {
    /// Command execution failed.
    #[error("{0}")]
    ExecutionFailed(String),

    /// Input argument could not be parsed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Output could not be rendered.
    #[error("output format error: {0}")]
    OutputFormat(String),
}
