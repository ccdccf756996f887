//! Placeholder matching: template blanks → entity keys.
//!
//! ## Two phases
//!
//! * **Phase A, exact** ([`exact_matches`]): placeholder and entity key have
//!   the same canonical form. Free, deterministic, confidence `HIGH`.
//! * **Phase B, model** ([`suggest_matches`]): only the placeholders Phase A
//!   left open are sent to the model, together with the *full* entity map and
//!   the field descriptions, so it can reason about partial-word overlaps and
//!   synonyms.
//!
//! ## Failure policy
//!
//! Matching never fails. A model error, an unparsable reply, a `null` reply
//! or a reply missing `reasoning`/`matches` all make [`suggest_matches`]
//! return [`MatchResult::degraded`]: the configured fallback message and no
//! matches. [`match_placeholders`] then returns that message together with
//! the Phase A matches, so only the blanks that needed the model fall back
//! to manual entry.
//!
//! The model is asked for MEDIUM-or-better matches only; the reply is
//! filtered again here, along with entity keys that do not exist and
//! placeholders that were not asked about.

use crate::config::PipelineConfig;
use crate::output::{Confidence, EntityMap, MatchResult, MatchSource, PlaceholderMatch};
use crate::pipeline::keys::canonical_key;
use crate::pipeline::llm::{build_options, ModelClient};
use crate::pipeline::response::parse_json_object;
use crate::prompts::{matching_prompt, unescape_from_prompt};
use edgequake_llm::ChatMessage;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

/// Reasoning when every placeholder was matched exactly.
pub const EXACT_ONLY_REASONING: &str =
    "Todos os campos foram associados por correspondência exata de nomes.";

/// Reasoning when there is nothing to match against.
pub const NO_ENTITIES_REASONING: &str =
    "Nenhuma entidade foi extraída dos documentos; preencha os campos manualmente.";

/// Phase A: match placeholders whose canonical form equals an entity key's.
///
/// Returns the matches and the placeholders still open, both in input
/// order. Duplicate placeholders (same canonical form) and placeholders with
/// no canonical content are skipped.
pub fn exact_matches(
    placeholders: &[String],
    entities: &EntityMap,
) -> (Vec<PlaceholderMatch>, Vec<String>) {
    let mut by_canonical: HashMap<String, &String> = HashMap::with_capacity(entities.len());
    for key in entities.keys() {
        by_canonical.entry(canonical_key(key)).or_insert(key);
    }

    let mut seen = HashSet::new();
    let mut matched = Vec::new();
    let mut open = Vec::new();

    for placeholder in placeholders {
        let canon = canonical_key(placeholder);
        if canon.is_empty() || !seen.insert(canon.clone()) {
            continue;
        }
        match by_canonical.get(&canon) {
            Some(entity_key) => matched.push(PlaceholderMatch {
                placeholder: placeholder.clone(),
                entity_key: (*entity_key).clone(),
                confidence: Confidence::High,
                source: MatchSource::Exact,
            }),
            None => open.push(placeholder.clone()),
        }
    }

    (matched, open)
}

/// Phase B: ask the model to match `open` placeholders against `entities`.
///
/// Never fails; see the module docs for the degraded result.
pub async fn suggest_matches(
    client: &dyn ModelClient,
    open: &[String],
    entities: &EntityMap,
    descriptions: &BTreeMap<String, String>,
    config: &PipelineConfig,
) -> MatchResult {
    let prompt = matching_prompt(open, entities, descriptions);
    let messages = vec![ChatMessage::user(prompt)];

    let reply = match client.chat(&messages, &build_options(config)).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!("Placeholder matching failed, falling back to manual entry: {}", e);
            return MatchResult::degraded(&config.fallback_message);
        }
    };
    debug!(
        "Matching reply: {} chars, {} input / {} output tokens",
        reply.content.len(),
        reply.input_tokens,
        reply.output_tokens
    );

    match interpret_reply(&reply.content, open, entities) {
        Some(result) => result,
        None => MatchResult::degraded(&config.fallback_message),
    }
}

/// Both phases. Exact matches are kept even when Phase B degrades.
pub async fn match_placeholders(
    client: &dyn ModelClient,
    placeholders: &[String],
    entities: &EntityMap,
    descriptions: &BTreeMap<String, String>,
    config: &PipelineConfig,
) -> MatchResult {
    let (exact, open) = exact_matches(placeholders, entities);
    info!(
        "Phase A matched {} placeholder(s), {} left for the model",
        exact.len(),
        open.len()
    );

    if open.is_empty() {
        return MatchResult {
            reasoning: EXACT_ONLY_REASONING.to_string(),
            matches: exact,
        };
    }
    if entities.is_empty() {
        return MatchResult {
            reasoning: NO_ENTITIES_REASONING.to_string(),
            matches: exact,
        };
    }

    let suggested = suggest_matches(client, &open, entities, descriptions, config).await;
    info!("Phase B matched {} placeholder(s)", suggested.matches.len());

    let order: HashMap<&str, usize> = placeholders
        .iter()
        .enumerate()
        .map(|(i, p)| (p.as_str(), i))
        .collect();
    let mut matches = exact;
    matches.extend(suggested.matches);
    matches.sort_by_key(|m| order.get(m.placeholder.as_str()).copied().unwrap_or(usize::MAX));

    MatchResult {
        reasoning: suggested.reasoning,
        matches,
    }
}

/// Validate a Phase B reply. `None` means the reply is unusable as a whole.
fn interpret_reply(raw: &str, open: &[String], entities: &EntityMap) -> Option<MatchResult> {
    let value = match parse_json_object(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!("Unusable matching reply: {}", e);
            return None;
        }
    };

    let Some(reasoning) = value.get("reasoning").and_then(Value::as_str) else {
        warn!("Matching reply has no 'reasoning'");
        return None;
    };
    let Some(items) = value.get("matches").and_then(Value::as_array) else {
        warn!("Matching reply has no 'matches' array");
        return None;
    };

    let open_by_canonical: HashMap<String, &String> =
        open.iter().map(|p| (canonical_key(p), p)).collect();
    let entity_by_canonical: HashMap<String, &String> =
        entities.keys().map(|k| (canonical_key(k), k)).collect();

    let mut best: BTreeMap<&String, PlaceholderMatch> = BTreeMap::new();
    for item in items {
        let Some(candidate) = validate_item(item, &open_by_canonical, entities, &entity_by_canonical)
        else {
            continue;
        };
        let placeholder = open_by_canonical[&canonical_key(&candidate.placeholder)];
        let replace = best
            .get(placeholder)
            .is_none_or(|existing| candidate.confidence > existing.confidence);
        if replace {
            best.insert(placeholder, candidate);
        }
    }

    let order: HashMap<&String, usize> = open.iter().enumerate().map(|(i, p)| (p, i)).collect();
    let mut matches: Vec<PlaceholderMatch> = best.into_values().collect();
    matches.sort_by_key(|m| {
        order
            .get(&m.placeholder)
            .copied()
            .unwrap_or(usize::MAX)
    });

    Some(MatchResult {
        reasoning: reasoning.trim().to_string(),
        matches,
    })
}

fn validate_item(
    item: &Value,
    open_by_canonical: &HashMap<String, &String>,
    entities: &EntityMap,
    entity_by_canonical: &HashMap<String, &String>,
) -> Option<PlaceholderMatch> {
    let placeholder = item.get("placeholder").and_then(Value::as_str)?;
    let entity_key = item
        .get("entityKey")
        .or_else(|| item.get("entity_key"))
        .and_then(Value::as_str)?;
    let confidence = item.get("confidence").and_then(Value::as_str)?;

    let confidence: Confidence = match confidence.parse() {
        Ok(c) => c,
        Err(e) => {
            debug!("Dropping match {} → {}: {}", placeholder, entity_key, e);
            return None;
        }
    };
    if !confidence.is_surfaced() {
        debug!("Dropping {} match {} → {}", confidence, placeholder, entity_key);
        return None;
    }

    let placeholder = unescape_from_prompt(placeholder);
    let Some(original) = open_by_canonical.get(&canonical_key(&placeholder)) else {
        debug!("Dropping match for unknown placeholder {:?}", placeholder);
        return None;
    };

    let entity_key = unescape_from_prompt(entity_key);
    let resolved_key = if entities.contains_key(&entity_key) {
        entity_key
    } else if let Some(key) = entity_by_canonical.get(&canonical_key(&entity_key)) {
        (*key).clone()
    } else {
        debug!("Dropping match to unknown entity {:?}", entity_key);
        return None;
    };

    Some(PlaceholderMatch {
        placeholder: (*original).clone(),
        entity_key: resolved_key,
        confidence,
        source: MatchSource::Model,
    })
}
