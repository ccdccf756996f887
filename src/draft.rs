//! Pipeline entry point: documents + template → filled contract draft.
//!
//! [`ContractPipeline`] owns the three things every stage shares: the model
//! client, the configuration and the extraction cache. Each stage is also
//! callable on its own: extract on upload, match when a template is chosen,
//! fill after a human reviewed the matches.

use crate::cache::{content_hash, ResponseCache};
use crate::config::PipelineConfig;
use crate::error::ContractFillError;
use crate::output::{DraftOutput, EntityMap, ExtractionOutput, MatchResult};
use crate::pipeline::document::Document;
use crate::pipeline::extract::{extract_entities, extraction_instruction};
use crate::pipeline::fill::{fill_template, find_placeholders, unresolved_placeholders};
use crate::pipeline::llm::{resolve_client, ModelClient};
use crate::pipeline::matcher;
use futures::future::try_join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Entity extraction, placeholder matching and template filling over one
/// model client.
///
/// # Example
/// ```rust,no_run
/// use edgequake_contract_fill::{ContractPipeline, Document, PipelineConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
/// let pipeline = ContractPipeline::new(PipelineConfig::default())?;
/// let docs = vec![Document::from_path("plano_de_trabalho.pdf").await?];
/// let template = std::fs::read_to_string("acordo_de_cooperacao.md")?;
/// let draft = pipeline.draft(&template, &docs).await?;
/// println!("{}", draft.markdown);
/// eprintln!("still blank: {:?}", draft.unresolved);
/// # Ok(())
/// # }
/// ```
pub struct ContractPipeline {
    client: Arc<dyn ModelClient>,
    config: PipelineConfig,
    cache: ResponseCache<ExtractionOutput>,
}

impl ContractPipeline {
    /// Resolve the model provider from `config` (see
    /// [`crate::pipeline::llm::resolve_client`]) and create a cache sized by
    /// the config.
    pub fn new(config: PipelineConfig) -> Result<Self, ContractFillError> {
        let client = resolve_client(&config)?;
        Ok(Self::with_client(client, config))
    }

    /// Use an already-built model client.
    pub fn with_client(client: Arc<dyn ModelClient>, config: PipelineConfig) -> Self {
        let cache = ResponseCache::from_config(&config);
        Self {
            client,
            config,
            cache,
        }
    }

    /// Replace the extraction cache, e.g. to share one between pipelines.
    pub fn with_cache(mut self, cache: ResponseCache<ExtractionOutput>) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cache(&self) -> &ResponseCache<ExtractionOutput> {
        &self.cache
    }

    /// Load documents given as data URIs, URLs or local paths, concurrently.
    pub async fn load_documents<S: AsRef<str>>(
        &self,
        inputs: &[S],
    ) -> Result<Vec<Document>, ContractFillError> {
        let timeout = self.config.download_timeout_secs;
        try_join_all(
            inputs
                .iter()
                .map(|input| Document::resolve(input.as_ref(), timeout)),
        )
        .await
    }

    /// Extract entities from `documents`.
    ///
    /// Identical requests within the cache window are answered from the
    /// cache; concurrent identical requests share one model call.
    pub async fn extract(
        &self,
        documents: &[Document],
    ) -> Result<ExtractionOutput, ContractFillError> {
        if documents.is_empty() {
            return Err(ContractFillError::NoDocuments);
        }
        let key = extraction_cache_key(
            self.client.label(),
            extraction_instruction(&self.config),
            documents,
        );
        self.cache
            .get_or_try_insert_with(
                key,
                extract_entities(self.client.as_ref(), documents, &self.config),
            )
            .await
    }

    /// Match `placeholders` to `entities`. Never fails.
    ///
    /// `descriptions` are the per-key field descriptions from
    /// [`crate::output::EntitySchema::descriptions`], when available.
    pub async fn match_placeholders(
        &self,
        placeholders: &[String],
        entities: &EntityMap,
        descriptions: Option<&BTreeMap<String, String>>,
    ) -> MatchResult {
        let empty = BTreeMap::new();
        matcher::match_placeholders(
            self.client.as_ref(),
            placeholders,
            entities,
            descriptions.unwrap_or(&empty),
            &self.config,
        )
        .await
    }

    /// Run all three stages.
    ///
    /// Only extraction can fail. When the model cannot help with matching,
    /// only exact-name matches are filled and every other placeholder stays
    /// visible in the returned Markdown.
    pub async fn draft(
        &self,
        template: &str,
        documents: &[Document],
    ) -> Result<DraftOutput, ContractFillError> {
        let start = Instant::now();

        let extraction = self.extract(documents).await?;
        let placeholders = find_placeholders(template);
        info!("Template has {} placeholder(s)", placeholders.len());

        let descriptions = extraction.schema.descriptions();
        let matches = self
            .match_placeholders(&placeholders, &extraction.entities, Some(&descriptions))
            .await;

        let values = matches.resolved_values(&extraction.entities);
        let markdown = fill_template(template, &values);
        let unresolved = unresolved_placeholders(template, &values);

        info!(
            "Draft ready: {}/{} placeholders filled in {}ms",
            placeholders.len() - unresolved.len(),
            placeholders.len(),
            start.elapsed().as_millis()
        );

        Ok(DraftOutput {
            markdown,
            extraction,
            matches,
            unresolved,
        })
    }
}

/// Cache key for an extraction request: model, instruction and every
/// document's data URI, in order.
pub fn extraction_cache_key(model: &str, instruction: &str, documents: &[Document]) -> String {
    let uris: Vec<String> = documents.iter().map(Document::to_data_uri).collect();
    content_hash(
        [model, instruction]
            .into_iter()
            .chain(uris.iter().map(String::as_str)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document::from_bytes("text/plain", text.as_bytes(), None).unwrap()
    }

    #[test]
    fn cache_key_depends_on_every_input() {
        let a = extraction_cache_key("m", "p", &[doc("x")]);
        assert_eq!(a, extraction_cache_key("m", "p", &[doc("x")]));
        assert_ne!(a, extraction_cache_key("m2", "p", &[doc("x")]));
        assert_ne!(a, extraction_cache_key("m", "p2", &[doc("x")]));
        assert_ne!(a, extraction_cache_key("m", "p", &[doc("y")]));
        assert_ne!(a, extraction_cache_key("m", "p", &[doc("x"), doc("x")]));
    }

    #[test]
    fn cache_key_depends_on_document_order() {
        assert_ne!(
            extraction_cache_key("m", "p", &[doc("a"), doc("b")]),
            extraction_cache_key("m", "p", &[doc("b"), doc("a")])
        );
    }
}
