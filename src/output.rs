//! Data model shared by the pipeline stages.
//!
//! None of these values has an identity beyond one request. Durable storage
//! of projects and filled contracts belongs to the host application.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Extracted facts: canonical entity key → value as written in the source.
pub type EntityMap = BTreeMap<String, String>;

/// Description of one extracted field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaProperty {
    /// JSON type reported by the model; values are always strings in
    /// [`EntityMap`], so this is informational.
    #[serde(rename = "type", default = "default_property_type")]
    pub kind: String,
    pub description: String,
}

fn default_property_type() -> String {
    "string".to_string()
}

/// JSON-schema style description of an [`EntityMap`], same key space.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySchema {
    pub properties: BTreeMap<String, SchemaProperty>,
}

impl EntitySchema {
    /// Flatten into `key → description`, the shape the matcher consumes.
    pub fn descriptions(&self) -> BTreeMap<String, String> {
        self.properties
            .iter()
            .map(|(k, p)| (k.clone(), p.description.clone()))
            .collect()
    }
}

/// Result of the entity extraction stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionOutput {
    pub entities: EntityMap,
    pub schema: EntitySchema,
}

/// Confidence band of a placeholder → entity match.
///
/// Ordered so that `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(self) -> &'static str {
        match self {
            Confidence::Low => "LOW",
            Confidence::Medium => "MEDIUM",
            Confidence::High => "HIGH",
        }
    }

    /// Whether a match with this confidence may be shown to the caller.
    pub fn is_surfaced(self) -> bool {
        self >= Confidence::Medium
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Confidence {
    type Err = String;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HIGH" => Ok(Confidence::High),
            "MEDIUM" => Ok(Confidence::Medium),
            "LOW" => Ok(Confidence::Low),
            other => Err(format!("unknown confidence level '{other}'")),
        }
    }
}

/// How a match was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    /// Canonical forms were identical; no model call involved.
    Exact,
    /// Suggested by the model.
    Model,
}

/// One placeholder resolved to one entity key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceholderMatch {
    /// Placeholder name as found in the template.
    pub placeholder: String,
    /// Key into the [`EntityMap`].
    pub entity_key: String,
    pub confidence: Confidence,
    pub source: MatchSource,
}

/// Output of the placeholder matcher.
///
/// Always valid-shaped: a failed model call yields [`MatchResult::degraded`]
/// rather than an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub reasoning: String,
    pub matches: Vec<PlaceholderMatch>,
}

impl MatchResult {
    /// The manual-entry fallback: an explanatory message and no matches.
    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            reasoning: message.into(),
            matches: Vec::new(),
        }
    }

    /// Look up the match for `placeholder` (exact name).
    pub fn get(&self, placeholder: &str) -> Option<&PlaceholderMatch> {
        self.matches.iter().find(|m| m.placeholder == placeholder)
    }

    /// Turn the match set into the `placeholder → value` map the template
    /// filler consumes. Matches whose entity key is absent from `entities`
    /// are skipped.
    pub fn resolved_values(&self, entities: &EntityMap) -> BTreeMap<String, String> {
        self.matches
            .iter()
            .filter_map(|m| {
                entities
                    .get(&m.entity_key)
                    .map(|value| (m.placeholder.clone(), value.clone()))
            })
            .collect()
    }
}

/// Result of a full documents + template run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftOutput {
    /// Template text with every resolved placeholder substituted.
    pub markdown: String,
    pub extraction: ExtractionOutput,
    pub matches: MatchResult,
    /// Placeholders that remain as literal tokens in `markdown`.
    pub unresolved: Vec<String>,
}
