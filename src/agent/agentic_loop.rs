//! Agentic tool-calling loop.
//!
//! Drives the LLM ↔ tool execution round-trip: throttles, sends the
//! conversation to the model, executes any tool calls in the response,
//! appends results, and repeats until the model stops requesting tools or
//! the iteration limit is reached.

use tracing::{debug, warn};

use super::executor::ToolExecutor;
use super::message::{ChatMessage, ChatRequest, TokenUsage};
use super::provider::LlmProvider;
use crate::error::AgentError;
use crate::ratelimit::RateLimiter;

/// Runs an agentic loop: throttle → model → tool calls → tool results → …
///
/// Every assistant response is appended to `request.messages`, including
/// the final one, so the caller extracts the answer from the conversation
/// with [`extract_answer`].
///
/// # Returns
///
/// Token usage summed over every model call in this loop.
///
/// # Errors
///
/// Returns [`AgentError::ToolLoopExceeded`] if the model still requests
/// tools on its `max_iterations`-th call; those final calls are not
/// executed. Propagates provider and tool errors.
pub async fn agentic_loop(
    provider: &dyn LlmProvider,
    request: &mut ChatRequest,
    executor: &ToolExecutor,
    limiter: &RateLimiter,
    max_iterations: usize,
) -> Result<TokenUsage, AgentError> {
    let mut usage = TokenUsage::default();

    for iteration in 0..max_iterations {
        limiter.acquire().await;
        let response = provider.chat(request).await?;
        usage.accumulate(response.usage);

        let done = response.tool_calls.is_empty();
        debug!(
            iteration,
            tool_count = response.tool_calls.len(),
            content_len = response.content.len(),
            finish_reason = response.finish_reason.as_deref().unwrap_or("unknown"),
            "model responded"
        );

        let tool_calls = response.tool_calls;
        request
            .messages
            .push(ChatMessage::assistant(response.content, tool_calls.clone()));

        if done {
            return Ok(usage);
        }
        if iteration + 1 == max_iterations {
            warn!(
                max_iterations,
                pending = tool_calls.len(),
                "tool budget spent, dropping requested calls"
            );
            break;
        }

        for call in &tool_calls {
            let result = executor.execute(call).await?;
            debug!(
                tool = call.name,
                call_id = call.id,
                is_error = result.is_error,
                "tool execution complete"
            );
            request
                .messages
                .push(ChatMessage::tool(&result.tool_call_id, result.content));
        }
    }

    Err(AgentError::ToolLoopExceeded { max_iterations })
}

/// Returns the newest assistant message with non-blank content.
///
/// Assistant messages that only carried tool calls, or whose content is
/// whitespace, are skipped.
///
/// # Errors
///
/// Returns [`AgentError::EmptyResponse`] if no such message exists. An
/// empty string is never returned as an answer.
pub fn extract_answer(messages: &[ChatMessage]) -> Result<String, AgentError> {
    for message in messages.iter().rev() {
        match message {
            ChatMessage::Assistant { content, .. } if !content.trim().is_empty() => {
                return Ok(content.clone());
            }
            ChatMessage::Assistant { .. }
            | ChatMessage::System { .. }
            | ChatMessage::User { .. }
            | ChatMessage::Tool { .. } => {}
        }
    }

    warn!(
        messages = messages.len(),
        "no assistant message with content"
    );
    Err(AgentError::EmptyResponse {
        messages: messages.len(),
    })
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::agent::message::ChatResponse;
    use crate::agent::tool::{ToolCall, tool_definitions};
    use crate::agent::toolset::ToolSet;
    use crate::embedding::{Embedder, EmbeddingBackend, HashEmbedder};
    use crate::error::EmbeddingError;
    use crate::storage::VectorIndex;

    /// Hash embeddings that count every batch sent.
    struct CountingBackend {
        inner: HashEmbedder,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EmbeddingBackend for CountingBackend {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.embed_batch(texts).await
        }
    }

    /// Mock provider that returns tool calls on the first N calls,
    /// then a final text response.
    struct MockToolProvider {
        call_count: AtomicUsize,
        tool_rounds: usize,
        final_text: &'static str,
    }

    impl MockToolProvider {
        fn new(tool_rounds: usize) -> Self {
            Self {
                call_count: AtomicUsize::new(0),
                tool_rounds,
                final_text: "Final answer based on tool results.",
            }
        }
    }

    #[async_trait]
    impl LlmProvider for MockToolProvider {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, AgentError> {
            let count = self.call_count.fetch_add(1, Ordering::SeqCst);

            if count < self.tool_rounds {
                Ok(ChatResponse {
                    content: String::new(),
                    usage: TokenUsage::default(),
                    tool_calls: vec![ToolCall {
                        id: format!("call_{count}"),
                        name: "search_financial_filings".to_string(),
                        arguments: r#"{"query":"revenue"}"#.to_string(),
                    }],
                    finish_reason: Some("tool_calls".to_string()),
                })
            } else {
                Ok(ChatResponse {
                    content: self.final_text.to_string(),
                    usage: TokenUsage {
                        prompt_tokens: 100,
                        completion_tokens: 20,
                        total_tokens: 120,
                    },
                    tool_calls: Vec::new(),
                    finish_reason: Some("stop".to_string()),
                })
            }
        }
    }

    fn executor() -> ToolExecutor {
        ToolExecutor::new(ToolSet::new(
            Arc::new(VectorIndex::in_memory().unwrap_or_else(|e| panic!("index: {e}"))),
            Arc::new(Embedder::default()),
        ))
    }

    fn request() -> ChatRequest {
        ChatRequest {
            model: "test".to_string(),
            messages: vec![
                ChatMessage::system("You are a test agent."),
                ChatMessage::user("What was revenue?"),
            ],
            temperature: Some(0.0),
            max_tokens: Some(1024),
            tools: tool_definitions(),
        }
    }

    #[tokio::test]
    async fn test_agentic_loop_single_tool_round() {
        let provider = MockToolProvider::new(1);
        let mut request = request();

        let usage = agentic_loop(
            &provider,
            &mut request,
            &executor(),
            &RateLimiter::unlimited(),
            10,
        )
        .await
        .unwrap_or_else(|e| panic!("agentic_loop failed: {e}"));

        assert_eq!(usage.total_tokens, 120);
        // system + user + assistant(tool_calls) + tool + assistant(final)
        assert_eq!(request.messages.len(), 5);
        assert_eq!(
            extract_answer(&request.messages).unwrap_or_else(|e| panic!("{e}")),
            "Final answer based on tool results."
        );
    }

    #[tokio::test]
    async fn test_agentic_loop_multiple_rounds() {
        let provider = MockToolProvider::new(3);
        let mut request = request();

        agentic_loop(
            &provider,
            &mut request,
            &executor(),
            &RateLimiter::unlimited(),
            10,
        )
        .await
        .unwrap_or_else(|e| panic!("agentic_loop failed: {e}"));

        // 2 initial + 3 rounds * 2 (assistant + tool) + final assistant
        assert_eq!(request.messages.len(), 9);
    }

    #[tokio::test]
    async fn test_agentic_loop_exceeds_max() {
        let provider = MockToolProvider::new(100);
        let mut request = request();

        let result = agentic_loop(
            &provider,
            &mut request,
            &executor(),
            &RateLimiter::unlimited(),
            2,
        )
        .await;
        assert!(
            matches!(result, Err(AgentError::ToolLoopExceeded { max_iterations: 2 })),
            "expected ToolLoopExceeded"
        );
        assert_eq!(provider.call_count.load(Ordering::SeqCst), 2);
        // system + user + assistant + tool + assistant; no tool result for the last call
        assert_eq!(request.messages.len(), 5);
        assert!(matches!(
            request.messages.last(),
            Some(ChatMessage::Assistant { .. })
        ));
    }

    #[tokio::test]
    async fn test_last_iteration_does_not_run_tools() {
        let index = Arc::new(VectorIndex::in_memory().unwrap_or_else(|e| panic!("index: {e}")));
        let seed = Embedder::new(Box::new(HashEmbedder::new(32)), 8);
        let text = "Apple total net sales were $394.3 billion.".to_string();
        let vectors = seed
            .embed(std::slice::from_ref(&text))
            .await
            .unwrap_or_else(|e| panic!("seed: {e}"));
        let chunk = crate::chunking::Chunk {
            chunk_id: 0,
            content: text,
            document_id: "aapl".to_string(),
            ticker: "AAPL".to_string(),
            filing_date: chrono::NaiveDate::from_ymd_opt(2022, 10, 28)
                .unwrap_or_else(|| panic!("date")),
            source_ref: String::new(),
            start: 0,
            end: 42,
        };
        index
            .add(&[chunk], &vectors)
            .unwrap_or_else(|e| panic!("add: {e}"));

        let calls = Arc::new(AtomicUsize::new(0));
        let backend = CountingBackend {
            inner: HashEmbedder::new(32),
            calls: Arc::clone(&calls),
        };
        let executor = ToolExecutor::new(ToolSet::new(
            index,
            Arc::new(Embedder::new(Box::new(backend), 8)),
        ));

        let provider = MockToolProvider::new(100);
        let mut request = request();
        let result = agentic_loop(
            &provider,
            &mut request,
            &executor,
            &RateLimiter::unlimited(),
            3,
        )
        .await;

        assert!(matches!(
            result,
            Err(AgentError::ToolLoopExceeded { max_iterations: 3 })
        ));
        assert_eq!(provider.call_count.load(Ordering::SeqCst), 3);
        // only the first two rounds reached retrieval
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_model_call_is_throttled() {
        let provider = MockToolProvider::new(2);
        let limiter = RateLimiter::new(Duration::from_secs(10));
        let mut request = request();

        let start = tokio::time::Instant::now();
        agentic_loop(&provider, &mut request, &executor(), &limiter, 10)
            .await
            .unwrap_or_else(|e| panic!("agentic_loop failed: {e}"));

        // three model calls: immediate, +10s, +10s
        assert!(start.elapsed() >= Duration::from_secs(20));
    }

    #[test]
    fn test_extract_skips_empty_trailing_assistant() {
        let messages = vec![
            ChatMessage::user("q"),
            ChatMessage::assistant("Apple's revenue was $394.3 billion.", Vec::new()),
            ChatMessage::tool("call_1", "context"),
            ChatMessage::assistant("   \n", Vec::new()),
        ];
        assert_eq!(
            extract_answer(&messages).unwrap_or_else(|e| panic!("{e}")),
            "Apple's revenue was $394.3 billion."
        );
    }

    #[test]
    fn test_extract_ignores_tool_and_user_content() {
        let messages = vec![
            ChatMessage::user("a question"),
            ChatMessage::assistant(
                "",
                vec![ToolCall {
                    id: "c".to_string(),
                    name: "search_financial_filings".to_string(),
                    arguments: "{}".to_string(),
                }],
            ),
            ChatMessage::tool("c", "tool output"),
        ];
        assert!(matches!(
            extract_answer(&messages),
            Err(AgentError::EmptyResponse { messages: 3 })
        ));
    }

    #[test]
    fn test_extract_empty_conversation() {
        assert!(matches!(
            extract_answer(&[]),
            Err(AgentError::EmptyResponse { messages: 0 })
        ));
    }
}
