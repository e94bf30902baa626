//! `OpenAI`-compatible chat provider.
//!
//! Request and response types come from `async-openai`; the call itself is
//! a single reqwest POST so the HTTP status is known before the body is
//! decoded. Any `OpenAI`-compatible API (`OpenAI`, Azure, Gemini, local
//! proxies) works via the base URL override in [`RagConfig`].

use std::time::Duration;

use async_openai::config::{Config, OpenAIConfig};
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessage,
    ChatCompletionRequestAssistantMessageContent, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessage, ChatCompletionRequestSystemMessageContent,
    ChatCompletionRequestToolMessage, ChatCompletionRequestToolMessageContent,
    ChatCompletionRequestUserMessage, ChatCompletionRequestUserMessageContent, ChatCompletionTool,
    ChatCompletionToolType, CreateChatCompletionRequest, CreateChatCompletionResponse,
    FunctionCall, FunctionObject,
};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::agent::message::{ChatMessage, ChatRequest, ChatResponse, TokenUsage};
use crate::agent::provider::LlmProvider;
use crate::agent::tool::ToolCall;
use crate::config::RagConfig;
use crate::error::AgentError;

/// Longest slice of a raw error body kept in a failure message.
const MAX_ERROR_BODY: usize = 512;

/// Builds the endpoint configuration (key and optional base URL) for `config`.
#[must_use]
pub fn api_config(config: &RagConfig) -> OpenAIConfig {
    let api_config = OpenAIConfig::new().with_api_key(&config.api_key);
    match config.base_url {
        Some(ref base_url) => api_config.with_api_base(base_url),
        None => api_config,
    }
}

/// A failed call: the backend's message and the HTTP status, when known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiFailure {
    /// Error text extracted from the response, or the transport error.
    pub message: String,
    /// HTTP status of the response, if one arrived.
    pub status: Option<u16>,
}

/// Sends one JSON POST to `path` and decodes a successful response body.
///
/// Exactly one request is made. The status is read before the body is
/// decoded, so a 429 is reported as such whatever shape its body takes.
pub async fn post_json<B, R>(
    http: &reqwest::Client,
    config: &OpenAIConfig,
    path: &str,
    body: &B,
) -> Result<R, ApiFailure>
where
    B: Serialize + Sync,
    R: DeserializeOwned,
{
    let response = http
        .post(config.url(path))
        .query(&config.query())
        .headers(config.headers())
        .json(body)
        .send()
        .await
        .map_err(|e| ApiFailure {
            message: e.to_string(),
            status: e.status().map(|s| s.as_u16()),
        })?;

    let status = response.status();
    let bytes = response.bytes().await.map_err(|e| ApiFailure {
        message: e.to_string(),
        status: Some(status.as_u16()),
    })?;

    if !status.is_success() {
        return Err(ApiFailure {
            message: error_message(&bytes),
            status: Some(status.as_u16()),
        });
    }

    serde_json::from_slice(&bytes).map_err(|e| ApiFailure {
        message: format!("failed to decode api response: {e}"),
        status: Some(status.as_u16()),
    })
}

/// Pulls a readable message out of an error body.
///
/// Understands `{"error": {"message": ..}}`, the same wrapped in an array,
/// and `{"detail": ..}`; anything else is returned raw and truncated.
fn error_message(body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        let found = ["/error/message", "/0/error/message", "/detail", "/message"]
            .iter()
            .find_map(|ptr| value.pointer(ptr).and_then(serde_json::Value::as_str));
        if let Some(message) = found {
            return message.to_string();
        }
    }
    String::from_utf8_lossy(body)
        .chars()
        .take(MAX_ERROR_BODY)
        .collect()
}

/// `OpenAI`-compatible LLM provider.
pub struct OpenAiProvider {
    http: reqwest::Client,
    config: OpenAIConfig,
    timeout: Duration,
}

impl OpenAiProvider {
    /// Creates a new provider from configuration.
    #[must_use]
    pub fn new(config: &RagConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config: api_config(config),
            timeout: config.timeout,
        }
    }

    /// Converts our message type to the `OpenAI` SDK type.
    fn convert_message(msg: &ChatMessage) -> ChatCompletionRequestMessage {
        match msg {
            ChatMessage::System { content } => {
                ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                    content: ChatCompletionRequestSystemMessageContent::Text(content.clone()),
                    name: None,
                })
            }
            ChatMessage::User { content } => {
                ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                    content: ChatCompletionRequestUserMessageContent::Text(content.clone()),
                    name: None,
                })
            }
            ChatMessage::Assistant {
                content,
                tool_calls,
            } => {
                let tool_calls = if tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        tool_calls
                            .iter()
                            .map(|tc| ChatCompletionMessageToolCall {
                                id: tc.id.clone(),
                                r#type: ChatCompletionToolType::Function,
                                function: FunctionCall {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                };

                let content = if content.is_empty() {
                    None
                } else {
                    Some(ChatCompletionRequestAssistantMessageContent::Text(
                        content.clone(),
                    ))
                };

                #[allow(deprecated)]
                ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                    content,
                    name: None,
                    tool_calls,
                    refusal: None,
                    audio: None,
                    function_call: None,
                })
            }
            ChatMessage::Tool {
                tool_call_id,
                content,
            } => ChatCompletionRequestMessage::Tool(ChatCompletionRequestToolMessage {
                content: ChatCompletionRequestToolMessageContent::Text(content.clone()),
                tool_call_id: tool_call_id.clone(),
            }),
        }
    }

    /// Builds an `OpenAI` chat completion request from our generic request.
    fn build_request(request: &ChatRequest) -> CreateChatCompletionRequest {
        let messages: Vec<_> = request.messages.iter().map(Self::convert_message).collect();

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(|td| ChatCompletionTool {
                        r#type: ChatCompletionToolType::Function,
                        function: FunctionObject {
                            name: td.name.clone(),
                            description: Some(td.description.clone()),
                            parameters: Some(td.parameters.clone()),
                            strict: None,
                        },
                    })
                    .collect(),
            )
        };

        CreateChatCompletionRequest {
            model: request.model.clone(),
            messages,
            temperature: request.temperature,
            max_completion_tokens: request.max_tokens,
            tools,
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("api_base", &self.config.api_base())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        let openai_request = Self::build_request(request);

        let call = post_json::<_, CreateChatCompletionResponse>(
            &self.http,
            &self.config,
            "/chat/completions",
            &openai_request,
        );

        let response = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(response)) => response,
            Ok(Err(failure)) => {
                warn!(status = ?failure.status, error = %failure.message, "chat completion failed");
                return Err(AgentError::from_api_failure(
                    failure.message,
                    failure.status,
                ));
            }
            Err(_) => {
                return Err(AgentError::ApiRequest {
                    message: format!("request timed out after {}s", self.timeout.as_secs()),
                    status: None,
                });
            }
        };

        let choice = response.choices.first();

        let content = choice
            .and_then(|c| c.message.content.as_ref())
            .cloned()
            .unwrap_or_default();

        let tool_calls = choice
            .and_then(|c| c.message.tool_calls.as_ref())
            .map(|tcs| {
                tcs.iter()
                    .map(|tc| ToolCall {
                        id: tc.id.clone(),
                        name: tc.function.name.clone(),
                        arguments: tc.function.arguments.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let finish_reason = choice.and_then(|c| {
            c.finish_reason
                .as_ref()
                .map(|fr| format!("{fr:?}").to_lowercase())
        });

        let usage = response
            .usage
            .map_or_else(TokenUsage::default, |u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            });

        Ok(ChatResponse {
            content,
            usage,
            tool_calls,
            finish_reason,
        })
    }
}


/// One-shot HTTP server for exercising the request path against canned
/// responses.
#[cfg(test)]
pub(crate) async fn serve_once(status: &'static str, body: &'static str) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap_or_else(|_| unreachable!());
    let addr = listener.local_addr().unwrap_or_else(|_| unreachable!());

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut received = Vec::new();
        let mut buf = [0_u8; 4096];
        while !request_complete(&received) {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => received.extend_from_slice(&buf[..n]),
            }
        }
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
    });

    format!("http://{addr}/v1")
}

/// Headers received and as many body bytes as `Content-Length` announced.
#[cfg(test)]
fn request_complete(received: &[u8]) -> bool {
    let Some(split) = received.windows(4).position(|w| w == b"\r\n\r\n") else {
        return false;
    };
    let head = String::from_utf8_lossy(&received[..split]);
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    received.len() >= split + 4 + content_length
}
