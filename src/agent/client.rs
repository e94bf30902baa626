//! Provider registry and factory.
//!
//! Maps provider names to concrete [`LlmProvider`] implementations.

use crate::agent::provider::LlmProvider;
use crate::config::RagConfig;
use crate::error::ConfigError;

/// Creates an [`LlmProvider`] based on the configured provider name.
///
/// # Supported Providers
///
/// - `"openai"` (default): `OpenAI`-compatible APIs via `async-openai`
///
/// # Errors
///
/// Returns [`ConfigError::ApiKeyMissing`] if no API key is configured and
/// [`ConfigError::UnsupportedProvider`] for unknown provider names or when
/// the provider's feature is disabled.
pub fn create_provider(config: &RagConfig) -> Result<Box<dyn LlmProvider>, ConfigError> {
    match config.provider.as_str() {
        #[cfg(feature = "openai")]
        "openai" => {
            if config.api_key.trim().is_empty() {
                return Err(ConfigError::ApiKeyMissing);
            }
            Ok(Box::new(crate::agent::providers::OpenAiProvider::new(
                config,
            )))
        }
        other => Err(ConfigError::UnsupportedProvider {
            name: other.to_string(),
        }),
    }
}
