//! Model access: the [`ModelClient`] seam and provider resolution.
//!
//! The extractor and the matcher only need "messages in, text out". That
//! contract is the [`ModelClient`] trait; [`ProviderClient`] implements it on
//! top of any `edgequake_llm` provider, and tests implement it with a
//! scripted fake so the pipeline runs without network access.
//!
//! No retry happens at this layer: a failed call surfaces as an error
//! (extractor) or degrades to an empty match set (matcher), and retrying is
//! left to the caller.

use crate::config::PipelineConfig;
use crate::error::ContractFillError;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Text and token usage of one model call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReply {
    pub content: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Something that can answer a chat request.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Model identifier; part of every cache key.
    fn label(&self) -> &str;

    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<ModelReply, ContractFillError>;
}

/// [`ModelClient`] backed by an `edgequake_llm` provider.
pub struct ProviderClient {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl ProviderClient {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }
}

#[async_trait]
impl ModelClient for ProviderClient {
    fn label(&self) -> &str {
        &self.label
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<ModelReply, ContractFillError> {
        let start = Instant::now();
        let response = self
            .provider
            .chat(messages, Some(options))
            .await
            .map_err(|e| ContractFillError::LlmApiError {
                message: e.to_string(),
            })?;

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            self.label,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        Ok(ModelReply {
            content: response.content,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
        })
    }
}

/// Build `CompletionOptions` from the pipeline config.
pub fn build_options(config: &PipelineConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Resolve the model client, from most-specific to least-specific:
///
/// 1. **Pre-built provider** (`config.provider`)
/// 2. **Named provider + model** (`config.provider_name`)
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`)
/// 4. **OpenAI key present** (`OPENAI_API_KEY`)
/// 5. **Full auto-detection** (`ProviderFactory::from_env`)
pub fn resolve_client(config: &PipelineConfig) -> Result<Arc<dyn ModelClient>, ContractFillError> {
    let label = config.model_label().to_string();

    if let Some(ref provider) = config.provider {
        return Ok(Arc::new(ProviderClient::new(Arc::clone(provider), label)));
    }

    if let Some(ref name) = config.provider_name {
        return create_client(name, &label);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_client(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            return create_client("openai", &label);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ContractFillError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, GEMINI_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    let label = config.model.clone().unwrap_or_else(|| "auto".to_string());
    Ok(Arc::new(ProviderClient::new(llm_provider, label)))
}

fn create_client(provider_name: &str, model: &str) -> Result<Arc<dyn ModelClient>, ContractFillError> {
    let provider = ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ContractFillError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })?;
    Ok(Arc::new(ProviderClient::new(provider, model)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_from_config() {
        let config = PipelineConfig::builder()
            .temperature(0.0)
            .max_tokens(2048)
            .build()
            .unwrap();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.0));
        assert_eq!(opts.max_tokens, Some(2048));
    }

    #[test]
    fn build_options_defaults() {
        let opts = build_options(&PipelineConfig::default());
        assert_eq!(opts.temperature, Some(0.1));
        assert_eq!(opts.max_tokens, Some(4096));
    }
}
