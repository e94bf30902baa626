//! # finrag
//!
//! Retrieval-augmented question answering over SEC 10-K filings.
//!
//! Filings are split into overlapping chunks, embedded, and stored in a
//! SQLite-backed vector index. Questions are answered by a tool-calling
//! language model that retrieves excerpts from the index, with every
//! outbound model call spaced by a shared rate limiter and rate-limited
//! attempts retried with exponential backoff.
//!
//! ## Pipeline
//!
//! ```text
//! Document → Chunker → Embedder → VectorIndex
//!                                     ↑
//! question → Orchestrator → LlmProvider ⇄ ToolSet
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use finrag::agent::{Orchestrator, ToolSet, create_provider};
//! use finrag::config::RagConfig;
//! use finrag::embedding::create_embedder;
//! use finrag::ratelimit::RateLimiter;
//! use finrag::storage::VectorIndex;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RagConfig::from_env()?;
//! let limiter = Arc::new(RateLimiter::new(config.min_call_spacing));
//! let index = Arc::new(VectorIndex::open_existing(".finrag/index.db".as_ref())?);
//! let embedder = Arc::new(create_embedder(&config, &limiter)?);
//! let provider = create_provider(&config)?;
//!
//! let orchestrator = Orchestrator::new(
//!     Arc::from(provider),
//!     ToolSet::new(index, embedder),
//!     &config,
//!     limiter,
//! )?;
//! let answer = orchestrator.query("What was Apple's revenue in fiscal 2022?").await?;
//! # let _ = answer;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod io;
pub mod ratelimit;
pub mod storage;

// Re-export commonly used types
pub use agent::{LlmProvider, Orchestrator, ToolSet};
pub use chunking::{Chunk, Chunker, Document};
pub use config::RagConfig;
pub use embedding::{Embedder, EmbeddingBackend};
pub use error::{AgentError, ConfigError, EmbeddingError, Error, IndexError, Result};
pub use ingest::{IngestReport, Ingestor};
pub use ratelimit::RateLimiter;
pub use storage::{MetadataFilter, SearchResult, VectorIndex};
