//! # edgequake-contract-fill
//!
//! Draft contracts from source documents using Large Language Models.
//!
//! A contract template is Markdown with blanks written as `{{KEY}}` or
//! `<KEY>`. The source documents (work plans, budgets, ID scans, in PDF,
//! DOCX, XLSX, CSV or plain text) hold the values. This crate asks a model
//! to pull a flat entity map out of the documents, pairs each blank with an
//! entity, and substitutes the values. Blanks nobody could match stay in the
//! draft as written so a reviewer sees what is missing.
//!
//! ## Pipeline Overview
//!
//! ```text
//! documents + template
//!  │
//!  ├─ 1. Load     data URI / path / URL → base64 Document
//!  ├─ 2. Extract  one LLM call → {entities, schema}   (cached, single-flight)
//!  ├─ 3. Match    exact canonical keys, then one LLM call for the rest
//!  ├─ 4. Fill     literal substitution, unmatched blanks kept verbatim
//!  └─ 5. Output   Markdown draft + matches + unresolved blanks
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_contract_fill::{ContractPipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let pipeline = ContractPipeline::new(PipelineConfig::default())?;
//!     let docs = pipeline
//!         .load_documents(&["plano_de_trabalho.pdf", "orcamento.xlsx"])
//!         .await?;
//!     let template = std::fs::read_to_string("acordo.md")?;
//!     let draft = pipeline.draft(&template, &docs).await?;
//!     println!("{}", draft.markdown);
//!     Ok(())
//! }
//! ```
//!
//! The stages are also usable separately: [`ContractPipeline::extract`],
//! [`ContractPipeline::match_placeholders`], [`find_placeholders`] and
//! [`fill_template`].
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `contract-fill` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-contract-fill = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cache;
pub mod config;
pub mod draft;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cache::{content_hash, CacheStats, ResponseCache};
pub use config::{PipelineConfig, PipelineConfigBuilder, DEFAULT_MODEL};
pub use draft::{extraction_cache_key, ContractPipeline};
pub use error::ContractFillError;
pub use output::{
    Confidence, DraftOutput, EntityMap, EntitySchema, ExtractionOutput, MatchResult, MatchSource,
    PlaceholderMatch, SchemaProperty,
};
pub use pipeline::document::Document;
pub use pipeline::extract::{extract_entities, parse_extraction};
pub use pipeline::fill::{fill_template, find_placeholders, unresolved_placeholders};
pub use pipeline::keys::sanitize_key;
pub use pipeline::llm::{resolve_client, ModelClient, ModelReply, ProviderClient};
pub use pipeline::matcher::{exact_matches, match_placeholders, suggest_matches};
pub use prompts::escape_for_prompt;
