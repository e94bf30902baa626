//! `OpenAI` embeddings backend.

use async_openai::config::OpenAIConfig;
use async_openai::types::{CreateEmbeddingRequestArgs, CreateEmbeddingResponse};
use async_trait::async_trait;
use tracing::warn;

use super::EmbeddingBackend;
use crate::agent::providers::openai::{api_config, post_json};
use crate::config::RagConfig;
use crate::error::EmbeddingError;

/// Embeddings via any `OpenAI`-compatible `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    http: reqwest::Client,
    config: OpenAIConfig,
    model: String,
    dimensions: Option<u32>,
}

impl OpenAiEmbedder {
    /// Creates a backend from configuration.
    #[must_use]
    pub fn new(config: &RagConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config: api_config(config),
            model: config.embedding_model.clone(),
            dimensions: config
                .embedding_dimensions
                .and_then(|d| u32::try_from(d).ok()),
        }
    }
}

impl std::fmt::Debug for OpenAiEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("model", &self.model)
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAiEmbedder {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn is_remote(&self) -> bool {
        true
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut args = CreateEmbeddingRequestArgs::default();
        args.model(&self.model).input(texts.to_vec());
        if let Some(dimensions) = self.dimensions {
            args.dimensions(dimensions);
        }
        let request = args.build().map_err(|e| EmbeddingError::Backend {
            message: e.to_string(),
        })?;

        let response: CreateEmbeddingResponse =
            post_json(&self.http, &self.config, "/embeddings", &request)
                .await
                .map_err(|failure| {
                    warn!(status = ?failure.status, error = %failure.message, "embedding request failed");
                    EmbeddingError::from_backend(failure.message, failure.status)
                })?;

        let mut data = response.data;
        data.sort_by_key(|d| d.index);

        if data.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                actual: data.len(),
            });
        }

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::providers::openai::serve_once;

    fn embedder_at(base_url: &str) -> OpenAiEmbedder {
        OpenAiEmbedder {
            http: reqwest::Client::builder()
                .no_proxy()
                .build()
                .unwrap_or_else(|_| unreachable!()),
            config: OpenAIConfig::new()
                .with_api_key("sk-test")
                .with_api_base(base_url),
            model: "text-embedding-3-small".to_string(),
            dimensions: None,
        }
    }

    #[tokio::test]
    async fn test_429_with_plain_body_is_rate_limited() {
        let base = serve_once("429 Too Many Requests", "quota exceeded, try later").await;
        let err = embedder_at(&base)
            .embed_batch(&["net sales".to_string()])
            .await
            .err();

        assert!(matches!(err, Some(EmbeddingError::RateLimited { .. })));
    }

    #[tokio::test]
    async fn test_success_orders_by_index() {
        let base = serve_once(
            "200 OK",
            r#"{"object": "list", "model": "text-embedding-3-small",
                "data": [
                    {"object": "embedding", "index": 1, "embedding": [0.0, 1.0]},
                    {"object": "embedding", "index": 0, "embedding": [1.0, 0.0]}
                ],
                "usage": {"prompt_tokens": 4, "total_tokens": 4}}"#,
        )
        .await;
        let vectors = embedder_at(&base)
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }
}
