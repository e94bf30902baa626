//! Agent trait definition.
//!
//! An agent fixes a role: model, system prompt, sampling settings and the
//! tools it may call. [`execute_with_tools`] runs one complete
//! conversation for an agent and extracts its answer.

use super::agentic_loop::{agentic_loop, extract_answer};
use super::executor::ToolExecutor;
use super::message::{ChatMessage, ChatRequest, TokenUsage};
use super::prompt::build_user_prompt;
use super::provider::LlmProvider;
use super::tool::{ToolDefinition, tool_definitions};
use crate::config::RagConfig;
use crate::error::AgentError;
use crate::ratelimit::RateLimiter;

/// Response from an agent execution.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    /// Extracted answer. Never blank.
    pub content: String,
    /// Token usage summed over the conversation.
    pub usage: TokenUsage,
    /// Messages in the finished conversation.
    pub messages: usize,
}

/// Trait implemented by agents.
///
/// Agents that support tool-calling override [`Agent::tools`] to return
/// their available tool definitions.
pub trait Agent: Send + Sync {
    /// Agent name for logging and identification.
    fn name(&self) -> &'static str;

    /// Model identifier to use for this agent.
    fn model(&self) -> &str;

    /// System prompt that defines the agent's role and behavior.
    fn system_prompt(&self) -> &str;

    /// Sampling temperature (0.0 = deterministic, higher = more creative).
    fn temperature(&self) -> f32 {
        0.0
    }

    /// Maximum tokens for the response.
    fn max_tokens(&self) -> u32 {
        2048
    }

    /// Tool definitions available to this agent.
    fn tools(&self) -> Vec<ToolDefinition> {
        Vec::new()
    }

    /// Maximum tool-calling loop iterations before aborting.
    fn max_tool_iterations(&self) -> usize {
        10
    }

    /// Builds a fresh conversation: system prompt plus one user message.
    fn build_request(&self, user_msg: &str) -> ChatRequest {
        ChatRequest {
            model: self.model().to_string(),
            messages: vec![
                ChatMessage::system(self.system_prompt()),
                ChatMessage::user(user_msg),
            ],
            temperature: Some(self.temperature()),
            max_tokens: Some(self.max_tokens()),
            tools: self.tools(),
        }
    }
}

/// Financial analyst agent answering questions from indexed filings.
#[derive(Debug, Clone)]
pub struct AnalystAgent {
    model: String,
    system_prompt: String,
    temperature: f32,
    max_tool_iterations: usize,
}

impl AnalystAgent {
    /// Creates an analyst from configuration and a loaded system prompt.
    #[must_use]
    pub fn new(config: &RagConfig, system_prompt: String) -> Self {
        Self {
            model: config.chat_model.clone(),
            system_prompt,
            temperature: config.temperature,
            max_tool_iterations: config.max_tool_iterations,
        }
    }
}

impl Agent for AnalystAgent {
    fn name(&self) -> &'static str {
        "analyst"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn temperature(&self) -> f32 {
        self.temperature
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        tool_definitions()
    }

    fn max_tool_iterations(&self) -> usize {
        self.max_tool_iterations
    }
}

/// Runs one conversation for `agent` and extracts its answer.
///
/// Every model call, including the first, goes through `limiter`.
///
/// # Errors
///
/// Returns [`AgentError`] on API failures, tool execution errors, when the
/// tool loop exceeds the agent's max iterations, or when no assistant
/// message carries an answer.
pub async fn execute_with_tools(
    agent: &dyn Agent,
    provider: &dyn LlmProvider,
    question: &str,
    executor: &ToolExecutor,
    limiter: &RateLimiter,
) -> Result<AgentResponse, AgentError> {
    let mut request = agent.build_request(&build_user_prompt(question));

    let usage = agentic_loop(
        provider,
        &mut request,
        executor,
        limiter,
        agent.max_tool_iterations(),
    )
    .await?;

    let content = extract_answer(&request.messages)?;
    Ok(AgentResponse {
        content,
        usage,
        messages: request.messages.len(),
    })
}
