//! Configuration types for the contract-filling pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. The same config drives extraction and
//! matching.

use crate::error::ContractFillError;
use crate::prompts::DEFAULT_FALLBACK_MESSAGE;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Model used when a provider is named without a model.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// Configuration for entity extraction and placeholder matching.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_contract_fill::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .model("gpt-4.1-mini")
///     .cache_ttl_secs(300)
///     .build()
///     .unwrap();
/// assert_eq!(config.cache_ttl_secs, 300);
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// LLM model identifier, e.g. "gpt-4.1-mini", "gemini-2.0-flash".
    /// If None, uses [`DEFAULT_MODEL`] or the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "gemini").
    /// If None along with `provider`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for both model calls. Default: 0.1.
    ///
    /// Extraction must copy values exactly as written in the source, and the
    /// matcher should give the same answer for the same input twice.
    pub temperature: f32,

    /// Maximum tokens the model may generate per call. Default: 4096.
    ///
    /// A contract annex can yield well over a hundred entities; too small a
    /// budget truncates the JSON and the extraction fails to parse.
    pub max_tokens: usize,

    /// How long an extraction result is reused for identical documents,
    /// in seconds. Default: 600. `0` disables the cache.
    pub cache_ttl_secs: u64,

    /// Maximum number of cached extraction results. Default: 256.
    pub cache_capacity: u64,

    /// Largest accepted decoded document, in bytes. Default: 20 MiB.
    pub max_document_bytes: usize,

    /// Download timeout for URL documents in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Custom extraction instruction. If None, uses the built-in default.
    pub extraction_prompt: Option<String>,

    /// Reasoning text returned when matching degrades to manual entry.
    pub fallback_message: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            cache_ttl_secs: 600,
            cache_capacity: 256,
            max_document_bytes: 20 * 1024 * 1024,
            download_timeout_secs: 120,
            extraction_prompt: None,
            fallback_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("cache_ttl_secs", &self.cache_ttl_secs)
            .field("cache_capacity", &self.cache_capacity)
            .field("max_document_bytes", &self.max_document_bytes)
            .field("extraction_prompt", &self.extraction_prompt.is_some())
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// The extraction cache window, or `None` when caching is disabled.
    pub fn cache_ttl(&self) -> Option<Duration> {
        (self.cache_ttl_secs > 0).then(|| Duration::from_secs(self.cache_ttl_secs))
    }

    /// Model label used in cache keys and logs.
    pub fn model_label(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn cache_ttl_secs(mut self, secs: u64) -> Self {
        self.config.cache_ttl_secs = secs;
        self
    }

    pub fn cache_capacity(mut self, n: u64) -> Self {
        self.config.cache_capacity = n;
        self
    }

    pub fn max_document_bytes(mut self, n: usize) -> Self {
        self.config.max_document_bytes = n;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn extraction_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.extraction_prompt = Some(prompt.into());
        self
    }

    pub fn fallback_message(mut self, message: impl Into<String>) -> Self {
        self.config.fallback_message = message.into();
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, ContractFillError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(ContractFillError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.max_document_bytes == 0 {
            return Err(ContractFillError::InvalidConfig(
                "max_document_bytes must be ≥ 1".into(),
            ));
        }
        if c.cache_ttl_secs > 0 && c.cache_capacity == 0 {
            return Err(ContractFillError::InvalidConfig(
                "cache_capacity must be ≥ 1 when caching is enabled (set cache_ttl_secs to 0 to disable)".into(),
            ));
        }
        if c.fallback_message.trim().is_empty() {
            return Err(ContractFillError::InvalidConfig(
                "fallback_message must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = PipelineConfig::default();
        assert_eq!(c.temperature, 0.1);
        assert_eq!(c.max_tokens, 4096);
        assert_eq!(c.cache_ttl(), Some(Duration::from_secs(600)));
        assert_eq!(c.model_label(), DEFAULT_MODEL);
    }

    #[test]
    fn zero_ttl_disables_cache() {
        let c = PipelineConfig::builder().cache_ttl_secs(0).build().unwrap();
        assert_eq!(c.cache_ttl(), None);
    }

    #[test]
    fn temperature_is_clamped() {
        let c = PipelineConfig::builder().temperature(7.5).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn rejects_zero_capacity_with_ttl() {
        let err = PipelineConfig::builder()
            .cache_capacity(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, ContractFillError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_blank_fallback_message() {
        assert!(PipelineConfig::builder()
            .fallback_message("   ")
            .build()
            .is_err());
    }

    #[test]
    fn debug_hides_provider() {
        let s = format!("{:?}", PipelineConfig::default());
        assert!(s.contains("PipelineConfig"));
        assert!(!s.contains("fallback_message"));
    }
}
