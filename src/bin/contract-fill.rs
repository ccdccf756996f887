//! CLI binary for edgequake-contract-fill.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `PipelineConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_contract_fill::{
    fill_template, find_placeholders, parse_extraction, unresolved_placeholders, ContractPipeline,
    Document, DraftOutput, ExtractionOutput, MatchResult, PipelineConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── Spinner ──────────────────────────────────────────────────────────────────

/// Spinner shown while a model call is in flight. `None` when progress is off.
fn spinner(enabled: bool, prefix: &'static str, message: &str) -> Option<ProgressBar> {
    if !enabled {
        return None;
    }
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_prefix(prefix);
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(80));
    Some(bar)
}

fn finish(bar: Option<ProgressBar>) {
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract entities from a work plan and a budget sheet
  contract-fill extract plano.pdf orcamento.xlsx --json > entities.json

  # List the blanks of a template (no API key needed)
  contract-fill placeholders acordo.md

  # Match template blanks against previously extracted entities
  contract-fill match --template acordo.md --entities entities.json

  # Fill a template from reviewed values (no API key needed)
  contract-fill fill --template acordo.md --values values.json -o acordo_final.md

  # Whole pipeline in one go
  contract-fill draft --template acordo.md plano.pdf orcamento.xlsx -o minuta.md

  # Documents can also be URLs or data URIs
  contract-fill extract https://example.org/plano.pdf

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
"#;

/// Extract entities from documents and fill contract templates using LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "contract-fill",
    version,
    about = "Extract entities from documents and fill contract templates using LLMs",
    long_about = "Extract structured entities from source documents (PDF, DOCX, XLSX, CSV, text) \
with a Large Language Model, match them to the {{KEY}} / <KEY> blanks of a Markdown contract \
template, and produce a filled draft. Supports OpenAI, Anthropic, Google Gemini, Azure OpenAI, \
and any OpenAI-compatible endpoint (Ollama, vLLM, LiteLLM, etc.).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// LLM model ID (e.g. gpt-4.1-mini, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        global = true,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, gemini, azure, ollama, or any OpenAI-compatible URL."
    )]
    provider: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, global = true, env = "CONTRACT_FILL_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max LLM output tokens per call.
    #[arg(long, global = true, env = "CONTRACT_FILL_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Largest accepted document, in bytes.
    #[arg(long, global = true, env = "CONTRACT_FILL_MAX_DOCUMENT_BYTES", default_value_t = 20 * 1024 * 1024)]
    max_document_bytes: usize,

    /// HTTP download timeout in seconds.
    #[arg(long, global = true, env = "CONTRACT_FILL_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Path to a text file replacing the built-in extraction instruction.
    #[arg(long, global = true, env = "CONTRACT_FILL_EXTRACTION_PROMPT")]
    extraction_prompt: Option<PathBuf>,

    /// Disable the spinner.
    #[arg(long, global = true, env = "CONTRACT_FILL_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "CONTRACT_FILL_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and results.
    #[arg(short, long, global = true, env = "CONTRACT_FILL_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract entities from one or more documents.
    Extract {
        /// Local paths, HTTP/HTTPS URLs or data URIs.
        #[arg(required = true)]
        documents: Vec<String>,

        /// Print the full extraction (entities + schema) as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List the placeholders of a template.
    Placeholders {
        /// Markdown template file.
        template: PathBuf,

        /// Print as a JSON array.
        #[arg(long)]
        json: bool,
    },

    /// Match template placeholders to extracted entities.
    Match {
        /// Markdown template file.
        #[arg(short, long)]
        template: PathBuf,

        /// JSON file: an `extract --json` result or a flat {"KEY": "value"} map.
        #[arg(short, long)]
        entities: PathBuf,
    },

    /// Fill a template from a {"PLACEHOLDER": "value"} JSON file.
    Fill {
        /// Markdown template file.
        #[arg(short, long)]
        template: PathBuf,

        /// JSON file with the values to substitute.
        #[arg(long)]
        values: PathBuf,

        /// Write the filled Markdown to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Extract, match and fill in one run.
    Draft {
        /// Markdown template file.
        #[arg(short, long)]
        template: PathBuf,

        /// Local paths, HTTP/HTTPS URLs or data URIs.
        #[arg(required = true)]
        documents: Vec<String>,

        /// Write the result to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Emit the full draft (Markdown, entities, matches) as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let g = &cli.global;

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO-level library logs would tear through the spinner line.
    let show_progress = !g.quiet && !g.no_progress;
    let filter = if g.verbose {
        "debug"
    } else if g.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let show_progress = show_progress && !g.verbose;

    match &cli.command {
        Command::Placeholders { template, json } => {
            let template = read_text(template).await?;
            let names = find_placeholders(&template);
            if *json {
                print_json(&names)?;
            } else {
                for name in &names {
                    println!("{name}");
                }
            }
        }

        Command::Fill {
            template,
            values,
            output,
        } => {
            let template = read_text(template).await?;
            let values: BTreeMap<String, String> = serde_json::from_str(&read_text(values).await?)
                .context("Values file must be a JSON object of strings")?;
            let markdown = fill_template(&template, &values);
            write_output(&markdown, output.as_deref()).await?;
            if !g.quiet {
                report_unresolved(&unresolved_placeholders(&template, &values));
            }
        }

        Command::Extract { documents, json } => {
            let pipeline = build_pipeline(g).await?;
            let docs = load(&pipeline, documents, show_progress).await?;

            let bar = spinner(show_progress, "Extracting", &describe(&docs));
            let result = pipeline.extract(&docs).await;
            finish(bar);
            let extraction = result.context("Extraction failed")?;

            if *json {
                print_json(&extraction)?;
            } else {
                print_entities(&extraction);
            }
        }

        Command::Match { template, entities } => {
            let template = read_text(template).await?;
            let extraction = read_extraction(entities).await?;
            let pipeline = build_pipeline(g).await?;

            let bar = spinner(show_progress, "Matching", "asking the model…");
            let descriptions = extraction.schema.descriptions();
            let result = pipeline
                .match_placeholders(
                    &find_placeholders(&template),
                    &extraction.entities,
                    Some(&descriptions),
                )
                .await;
            finish(bar);

            print_json(&result)?;
        }

        Command::Draft {
            template,
            documents,
            output,
            json,
        } => {
            let template = read_text(template).await?;
            let pipeline = build_pipeline(g).await?;
            let docs = load(&pipeline, documents, show_progress).await?;

            let bar = spinner(show_progress, "Drafting", &describe(&docs));
            let result = pipeline.draft(&template, &docs).await;
            finish(bar);
            let draft = result.context("Drafting failed")?;

            write_output(&draft_text(&draft, *json)?, output.as_deref()).await?;
            if !g.quiet {
                report_draft(&draft, output.as_deref());
            }
        }
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig` and resolve the provider.
async fn build_pipeline(g: &GlobalArgs) -> Result<ContractPipeline> {
    let mut builder = PipelineConfig::builder()
        .temperature(g.temperature)
        .max_tokens(g.max_tokens)
        .max_document_bytes(g.max_document_bytes)
        .download_timeout_secs(g.download_timeout);

    if let Some(ref model) = g.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = g.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref path) = g.extraction_prompt {
        builder = builder.extraction_prompt(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read extraction prompt from {:?}", path))?,
        );
    }

    let config = builder.build().context("Invalid configuration")?;
    ContractPipeline::new(config).context("Failed to set up the LLM provider")
}

async fn load(
    pipeline: &ContractPipeline,
    inputs: &[String],
    show_progress: bool,
) -> Result<Vec<Document>> {
    let bar = spinner(show_progress, "Loading", &format!("{} document(s)", inputs.len()));
    let result = pipeline.load_documents(inputs).await;
    finish(bar);
    result.context("Failed to load documents")
}

fn describe(docs: &[Document]) -> String {
    docs.iter()
        .map(Document::display_name)
        .collect::<Vec<_>>()
        .join(", ")
}

async fn read_text(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))
}

/// Accept either a full extraction (`{"entities": …, "schema": …}`) or a flat
/// entity map.
async fn read_extraction(path: &Path) -> Result<ExtractionOutput> {
    let raw = read_text(path).await?;
    let value: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("{:?} is not valid JSON", path))?;
    let wrapped = if value.get("entities").is_some() {
        value
    } else {
        serde_json::json!({ "entities": value })
    };
    parse_extraction(&wrapped.to_string()).context("Entities file has no usable entities")
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialise output")?;
    println!("{json}");
    Ok(())
}

fn print_entities(extraction: &ExtractionOutput) {
    let width = extraction
        .entities
        .keys()
        .map(|k| k.len())
        .max()
        .unwrap_or(0);
    for (key, value) in &extraction.entities {
        println!("{}  {}", bold(&format!("{key:<width$}")), value);
    }
}

/// What `draft` emits: the filled Markdown, or the whole draft as JSON.
fn draft_text(draft: &DraftOutput, json: bool) -> Result<String> {
    if json {
        serde_json::to_string_pretty(draft).context("Failed to serialise output")
    } else {
        Ok(draft.markdown.clone())
    }
}

async fn write_output(text: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => tokio::fs::write(path, text)
            .await
            .with_context(|| format!("Failed to write {:?}", path)),
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(text.as_bytes())
                .context("Failed to write to stdout")?;
            if !text.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
            Ok(())
        }
    }
}

fn report_unresolved(unresolved: &[String]) {
    if unresolved.is_empty() {
        eprintln!("{} all placeholders filled", green("✔"));
    } else {
        eprintln!(
            "{} {} placeholder(s) left blank: {}",
            yellow("⚠"),
            unresolved.len(),
            unresolved.join(", ")
        );
    }
}

fn report_draft(draft: &DraftOutput, output: Option<&Path>) {
    let MatchResult { reasoning, matches } = &draft.matches;
    eprintln!(
        "{}  {} entities  {} matched  →  {}",
        if draft.unresolved.is_empty() {
            green("✔")
        } else {
            yellow("⚠")
        },
        draft.extraction.entities.len(),
        matches.len(),
        bold(
            &output
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "stdout".to_string())
        ),
    );
    for m in matches {
        eprintln!(
            "   {} → {}  {}",
            m.placeholder,
            m.entity_key,
            dim(&format!("{} ({:?})", m.confidence, m.source))
        );
    }
    if !reasoning.is_empty() {
        eprintln!("   {}", dim(reasoning));
    }
    report_unresolved(&draft.unresolved);
}
