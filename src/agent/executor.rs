//! Tool executor that dispatches model tool calls to [`ToolSet`].
//!
//! Malformed requests (unknown tool, bad JSON, blank fields) come back to
//! the model as error results so it can correct itself. Retrieval failures
//! end the attempt: throttling propagates unchanged so the orchestrator can
//! back off, anything else becomes [`AgentError::ToolExecution`].

use tracing::{debug, warn};

use super::tool::{ToolCall, ToolRequest, ToolResult};
use super::toolset::ToolSet;
use crate::error::AgentError;

/// Maximum raw byte length of tool argument JSON from the LLM.
const MAX_TOOL_ARGS_LEN: usize = 100_000;

/// Executes tool calls against a [`ToolSet`].
#[derive(Debug, Clone)]
pub struct ToolExecutor {
    tools: ToolSet,
}

impl ToolExecutor {
    /// Creates an executor over `tools`.
    #[must_use]
    pub const fn new(tools: ToolSet) -> Self {
        Self { tools }
    }

    /// Underlying tool set.
    #[must_use]
    pub const fn tools(&self) -> &ToolSet {
        &self.tools
    }

    /// Dispatches one tool call.
    ///
    /// # Errors
    ///
    /// Returns the retrieval failure if it is rate limiting, otherwise
    /// [`AgentError::ToolExecution`]. Invalid requests are not errors; they
    /// produce a [`ToolResult`] with `is_error` set.
    pub async fn execute(&self, call: &ToolCall) -> Result<ToolResult, AgentError> {
        if call.arguments.len() > MAX_TOOL_ARGS_LEN {
            return Ok(ToolResult::error(
                &call.id,
                format!(
                    "tool arguments too large ({} bytes, max {MAX_TOOL_ARGS_LEN})",
                    call.arguments.len()
                ),
            ));
        }

        let request = match ToolRequest::decode(call) {
            Ok(request) => request,
            Err(message) => {
                debug!(tool = %call.name, call_id = %call.id, error = %message, "rejected tool call");
                return Ok(ToolResult::error(&call.id, message));
            }
        };

        match self.tools.run(&request).await {
            Ok(content) => Ok(ToolResult::ok(&call.id, content)),
            Err(e) if e.is_rate_limited() => Err(e),
            Err(e) => {
                warn!(tool = request.name(), error = %e, "tool execution failed");
                Err(AgentError::ToolExecution {
                    name: request.name().to_string(),
                    message: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::embedding::{Embedder, EmbeddingBackend};
    use crate::error::EmbeddingError;
    use crate::storage::VectorIndex;

    struct FailingBackend {
        message: &'static str,
    }

    #[async_trait]
    impl EmbeddingBackend for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::from_backend(self.message.to_string(), None))
        }
    }

    fn executor_with(backend: Box<dyn EmbeddingBackend>) -> ToolExecutor {
        let index = VectorIndex::in_memory().unwrap_or_else(|_| unreachable!());
        let chunk = crate::chunking::Chunk {
            chunk_id: 0,
            content: "Revenue grew.".to_string(),
            document_id: "d".to_string(),
            ticker: "AAPL".to_string(),
            filing_date: chrono::NaiveDate::from_ymd_opt(2022, 1, 1)
                .unwrap_or_else(|| unreachable!()),
            source_ref: String::new(),
            start: 0,
            end: 13,
        };
        index
            .add(&[chunk], &[vec![1.0; 8]])
            .unwrap_or_else(|_| unreachable!());
        ToolExecutor::new(ToolSet::new(
            Arc::new(index),
            Arc::new(Embedder::new(backend, 4)),
        ))
    }

    fn call(name: &str, arguments: &str) -> ToolCall {
        ToolCall {
            id: "call_1".to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }

    #[tokio::test]
    async fn test_invalid_call_becomes_error_result() {
        let executor = executor_with(Box::new(crate::embedding::HashEmbedder::new(8)));
        let result = executor
            .execute(&call("delete_everything", "{}"))
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!(result.is_error);
        assert_eq!(result.tool_call_id, "call_1");
        assert!(result.content.contains("unknown tool"));
    }

    #[tokio::test]
    async fn test_oversized_arguments_rejected() {
        let executor = executor_with(Box::new(crate::embedding::HashEmbedder::new(8)));
        let huge = format!(r#"{{"query":"{}"}}"#, "a".repeat(MAX_TOOL_ARGS_LEN));
        let result = executor
            .execute(&call("search_financial_filings", &huge))
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn test_successful_call() {
        let executor = executor_with(Box::new(crate::embedding::HashEmbedder::new(8)));
        let result = executor
            .execute(&call("search_financial_filings", r#"{"query":"revenue"}"#))
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!(!result.is_error);
        assert!(result.content.contains("[Source 1] ticker: AAPL"));
    }

    #[tokio::test]
    async fn test_rate_limited_retrieval_propagates() {
        let executor = executor_with(Box::new(FailingBackend {
            message: "429 Too Many Requests",
        }));
        let result = executor
            .execute(&call("search_financial_filings", r#"{"query":"revenue"}"#))
            .await;
        assert!(matches!(result, Err(ref e) if e.is_rate_limited()));
    }

    #[tokio::test]
    async fn test_other_retrieval_failure_is_tool_error() {
        let executor = executor_with(Box::new(FailingBackend {
            message: "connection refused",
        }));
        let result = executor
            .execute(&call("search_ticker_specific", r#"{"ticker":"AAPL","query":"x"}"#))
            .await;
        assert!(matches!(
            result,
            Err(AgentError::ToolExecution { ref name, .. }) if name == "search_ticker_specific"
        ));
    }
}
