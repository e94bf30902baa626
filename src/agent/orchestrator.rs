//! Query orchestrator.
//!
//! Turns a natural-language question into an answer: validates it, checks
//! that the index holds documents, appends query hints, then runs the
//! analyst conversation under the shared rate limiter. Rate-limited
//! attempts are retried from a fresh conversation with exponential
//! backoff; every other failure ends the query.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info};

use super::enhance::QueryEnhancer;
use super::executor::ToolExecutor;
use super::prompt::PromptSet;
use super::provider::LlmProvider;
use super::retry::{RetryPolicy, Transition};
use super::toolset::ToolSet;
use super::traits::{AnalystAgent, execute_with_tools};
use crate::config::RagConfig;
use crate::error::{AgentError, ConfigError};
use crate::ratelimit::RateLimiter;

/// Longest accepted question, in bytes.
const MAX_QUESTION_LEN: usize = 10_000;

/// Answers questions against one index.
pub struct Orchestrator {
    provider: Arc<dyn LlmProvider>,
    agent: AnalystAgent,
    executor: ToolExecutor,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    enhancer: Option<QueryEnhancer>,
}

impl Orchestrator {
    /// Creates an orchestrator.
    ///
    /// Loads the system prompt from [`RagConfig::prompt_dir`], falling back
    /// to the compiled-in default. `limiter` should be the same instance the
    /// embedder uses when both draw on one quota.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the query enhancer cannot be built.
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: ToolSet,
        config: &RagConfig,
        limiter: Arc<RateLimiter>,
    ) -> Result<Self, ConfigError> {
        let prompts = PromptSet::load(config.prompt_dir.as_deref());
        let enhancer = if config.enhance_queries {
            Some(QueryEnhancer::new()?)
        } else {
            None
        };

        Ok(Self {
            provider,
            agent: AnalystAgent::new(config, prompts.system),
            executor: ToolExecutor::new(tools.with_limits(config.top_k, config.compare_k)),
            limiter,
            policy: RetryPolicy::from_config(config),
            enhancer,
        })
    }

    /// Answers `question`.
    ///
    /// # Errors
    ///
    /// - [`AgentError::InvalidQuery`] for a blank or oversized question
    /// - [`AgentError::NoDocuments`] when the index is empty (no model call
    ///   is made)
    /// - [`AgentError::RetriesExhausted`] when rate limiting outlasts every
    ///   retry
    /// - any other agent error, unchanged, on its first occurrence
    pub async fn query(&self, question: &str) -> Result<String, AgentError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AgentError::InvalidQuery {
                reason: "question is empty".to_string(),
            });
        }
        if question.len() > MAX_QUESTION_LEN {
            return Err(AgentError::InvalidQuery {
                reason: format!(
                    "question is {} bytes, max {MAX_QUESTION_LEN}",
                    question.len()
                ),
            });
        }
        if !self.executor.tools().has_documents() {
            return Err(AgentError::NoDocuments);
        }

        let prompt = self
            .enhancer
            .as_ref()
            .map_or_else(|| question.to_string(), |e| e.enhance(question));

        let start = Instant::now();
        let mut attempt = 0;
        let mut waited = Duration::ZERO;

        loop {
            info!(
                attempt = attempt + 1,
                max_attempts = self.policy.max_retries() + 1,
                "starting query attempt"
            );

            let outcome = execute_with_tools(
                &self.agent,
                &*self.provider,
                &prompt,
                &self.executor,
                &self.limiter,
            )
            .await;

            let err = match outcome {
                Ok(response) => {
                    info!(
                        attempts = attempt + 1,
                        total_tokens = response.usage.total_tokens,
                        messages = response.messages,
                        elapsed_ms = start.elapsed().as_millis(),
                        "query answered"
                    );
                    return Ok(response.content);
                }
                Err(e) => e,
            };

            match self.policy.next(attempt, err, waited) {
                Transition::Retry {
                    attempt: next,
                    wait,
                } => {
                    tokio::time::sleep(wait).await;
                    waited += wait;
                    attempt = next;
                }
                Transition::Fail(e) => {
                    error!(error = %e, attempts = attempt + 1, "query failed");
                    return Err(e);
                }
            }
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("provider", &self.provider.name())
            .field("agent", &self.agent)
            .field("policy", &self.policy)
            .field("enhance_queries", &self.enhancer.is_some())
            .finish_non_exhaustive()
    }
}
