//! Question answering over indexed filings.
//!
//! A single analyst agent answers each question by calling retrieval tools
//! against the vector index until it can write a final answer.
//!
//! # Architecture
//!
//! ```text
//! question → Orchestrator
//!   ├── QueryEnhancer (keyword hints)
//!   ├── retry loop (RetryPolicy, backoff on rate limiting)
//!   │   └── agentic loop
//!   │       ├── RateLimiter::acquire → LlmProvider::chat
//!   │       └── ToolExecutor → ToolSet (search_all / search_scoped / compare)
//!   └── extract_answer (newest non-empty assistant message)
//! ```

pub mod agentic_loop;
pub mod client;
pub mod enhance;
pub mod executor;
pub mod message;
pub mod orchestrator;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod retry;
pub mod tool;
pub mod toolset;
pub mod traits;

// Re-export key types
pub use agentic_loop::{agentic_loop, extract_answer};
pub use client::create_provider;
pub use enhance::QueryEnhancer;
pub use executor::ToolExecutor;
pub use message::{ChatMessage, ChatRequest, ChatResponse, TokenUsage};
pub use orchestrator::Orchestrator;
pub use prompt::PromptSet;
pub use provider::LlmProvider;
pub use retry::{RetryPolicy, Transition};
pub use tool::{ToolCall, ToolDefinition, ToolRequest, ToolResult};
pub use toolset::ToolSet;
pub use traits::{Agent, AgentResponse, AnalystAgent, execute_with_tools};
