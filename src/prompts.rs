//! Model instructions for entity extraction and placeholder matching.
//!
//! Every prompt lives here so wording changes touch exactly one file and unit
//! tests can inspect the rendered text without calling a model.
//!
//! ## Prompt embedding boundary
//!
//! The matching instruction is a template with `{{slot}}` markers filled by
//! [`render_template`]. Placeholder names, entity keys, entity values and
//! field descriptions are user-controlled text; each one passes through
//! [`escape_for_prompt`] before it is embedded, so a value such as
//! `"{{entities}}"` or `"<CPF>"` reaches the model as inert data instead of
//! being read as a slot or a placeholder token.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

/// Default instruction for extracting entities from source documents.
///
/// Used when [`crate::config::PipelineConfig::extraction_prompt`] is `None`.
pub const DEFAULT_EXTRACTION_PROMPT: &str = r#"You are a data-extraction assistant for a university innovation office that drafts cooperation contracts.

The attached documents (PDF, DOCX, spreadsheets, plain text) are the source material for a contract. Extract every piece of business data a contract could need.

Rules:

1. NOISE
   - Ignore HTML tags, styling, markup and formatting artefacts
   - Ignore page numbers, headers and footers repeated on every page

2. WHAT TO EXTRACT
   - Parties, names, roles, CPF/CNPJ and other identifiers, addresses
   - Project titles, objects, goals, deliverables
   - Dates, deadlines, durations, values, sums, percentages, bank data
   - Copy every value exactly as it appears in the source

3. KEY NAMING
   - Keys are UPPERCASE words joined by underscores, e.g. NOME_DO_PROJETO, VALOR_TOTAL
   - Never put braces, angle brackets or slashes in a key
   - Use the vocabulary of the source documents (Portuguese when the source is Portuguese)

4. OUTPUT FORMAT
   - Output ONLY one JSON object, no Markdown fences, no commentary
   - Shape:
     {"entities": {"KEY": "value", ...},
      "schema": {"properties": {"KEY": {"type": "string", "description": "what this field represents"}, ...}}}
   - Every key in "entities" must appear in "schema.properties" with a non-empty "description""#;

/// Instruction template for matching template placeholders to entities.
///
/// Slots: `{{placeholders}}`, `{{entities}}`, `{{descriptions}}`.
pub const MATCHING_PROMPT_TEMPLATE: &str = r#"You match blanks of a contract template to data extracted from source documents.

PLACEHOLDERS STILL WITHOUT A VALUE:
{{placeholders}}

ALL EXTRACTED ENTITIES (KEY: value):
{{entities}}

FIELD DESCRIPTIONS (KEY: description):
{{descriptions}}

Policy:

1. An imperfect match is better than no match.
2. Priority order: exact name > partial word overlap > synonym > surrounding context.
3. Known synonyms:
   - NOME DO PROJETO ≈ OBJETO ≈ TITULO_DO_PROJETO
   - REITOR / COORDENADOR ≈ AUTORIDADE_COMPETENTE
   - CONTRATANTE ≈ CONCEDENTE ≈ PARCEIRO
   - CNPJ ≈ INSCRICAO ≈ REGISTRO_DA_EMPRESA
   - VALOR ≈ VALOR_TOTAL ≈ MONTANTE ≈ ORCAMENTO
   - VIGENCIA ≈ PRAZO ≈ DURACAO
   - DATA_DE_INICIO ≈ INICIO_DA_VIGENCIA
4. Confidence:
   - HIGH: 3 or more overlapping words
   - MEDIUM: 2 overlapping words, or a clear synonym
   - LOW: 1 overlapping word plus a contextual justification
5. Only report matches with confidence MEDIUM or HIGH.
6. Each placeholder gets at most one entity. Use placeholder names and entity keys exactly as listed.

Output ONLY one JSON object, no Markdown fences:
{"reasoning": "short explanation of the whole match set, in Brazilian Portuguese",
 "matches": [{"placeholder": "NAME", "entityKey": "KEY", "confidence": "HIGH"}]}"#;

/// Reasoning text of a degraded match result (manual-entry fallback).
pub const DEFAULT_FALLBACK_MESSAGE: &str =
    "Não foi possível obter sugestões automáticas da IA. Preencha os campos manualmente.";

/// Escape user-controlled text before embedding it in a prompt template.
///
/// Character set, applied in one pass:
///
/// | Input | Output |
/// |-------|--------|
/// | `&` | `&amp;` |
/// | `<` | `&lt;` |
/// | `>` | `&gt;` |
/// | `{` | `&#123;` |
/// | `}` | `&#125;` |
///
/// `&` is part of the set so the escaping is reversible with
/// [`unescape_from_prompt`].
pub fn escape_for_prompt(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 8);
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '{' => out.push_str("&#123;"),
            '}' => out.push_str("&#125;"),
            c => out.push(c),
        }
    }
    out
}

static RE_ESCAPED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(amp|lt|gt|#123|#125);").unwrap());

/// Inverse of [`escape_for_prompt`], for names the model echoes back.
pub fn unescape_from_prompt(input: &str) -> String {
    RE_ESCAPED
        .replace_all(input, |caps: &regex::Captures<'_>| match &caps[1] {
            "amp" => "&",
            "lt" => "<",
            "gt" => ">",
            "#123" => "{",
            _ => "}",
        })
        .into_owned()
}

static RE_SLOT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([a-z_]+)\}\}").unwrap());

/// Fill `{{slot}}` markers in `template` from `slots`, in a single pass.
///
/// Slot values are inserted verbatim; callers escape user text first.
/// Unknown slots are left as they are.
pub fn render_template(template: &str, slots: &[(&str, &str)]) -> String {
    RE_SLOT
        .replace_all(template, |caps: &regex::Captures<'_>| {
            slots
                .iter()
                .find(|(name, _)| *name == &caps[1])
                .map(|(_, value)| (*value).to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Build the Phase B matching instruction.
pub fn matching_prompt(
    placeholders: &[String],
    entities: &BTreeMap<String, String>,
    descriptions: &BTreeMap<String, String>,
) -> String {
    let placeholder_lines = bullet_list(placeholders.iter().map(|p| escape_for_prompt(p)));
    let entity_lines = bullet_list(
        entities
            .iter()
            .map(|(k, v)| format!("{}: {}", escape_for_prompt(k), escape_for_prompt(v))),
    );
    let description_lines = bullet_list(
        descriptions
            .iter()
            .map(|(k, d)| format!("{}: {}", escape_for_prompt(k), escape_for_prompt(d))),
    );

    render_template(
        MATCHING_PROMPT_TEMPLATE,
        &[
            ("placeholders", placeholder_lines.as_str()),
            ("entities", entity_lines.as_str()),
            ("descriptions", description_lines.as_str()),
        ],
    )
}

fn bullet_list(items: impl Iterator<Item = String>) -> String {
    let lines: Vec<String> = items.map(|line| format!("- {line}")).collect();
    if lines.is_empty() {
        "(none)".to_string()
    } else {
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_documented_set() {
        assert_eq!(
            escape_for_prompt("a & b <c> {{d}}"),
            "a &amp; b &lt;c&gt; &#123;&#123;d&#125;&#125;"
        );
    }

    #[test]
    fn escape_leaves_plain_text() {
        assert_eq!(escape_for_prompt("São Paulo, R$ 10.000,00"), "São Paulo, R$ 10.000,00");
    }

    #[test]
    fn escape_keeps_typed_entities_literal() {
        // "&lt;" typed by a user must survive as literal text
        assert_eq!(escape_for_prompt("&lt;"), "&amp;lt;");
        assert_eq!(unescape_from_prompt(&escape_for_prompt("&lt;")), "&lt;");
    }

    #[test]
    fn unescape_reverses_escape() {
        let raw = "<NOME> & {{CPF}}";
        assert_eq!(unescape_from_prompt(&escape_for_prompt(raw)), raw);
    }

    #[test]
    fn render_fills_known_slots_only() {
        let out = render_template("{{a}} and {{b}}", &[("a", "x")]);
        assert_eq!(out, "x and {{b}}");
    }

    #[test]
    fn injected_slot_is_not_expanded() {
        let mut entities = BTreeMap::new();
        entities.insert("OBJETO".to_string(), "{{placeholders}}".to_string());
        let prompt = matching_prompt(&["NOME".to_string()], &entities, &BTreeMap::new());
        assert!(prompt.contains("- OBJETO: &#123;&#123;placeholders&#125;&#125;"));
        assert!(prompt.contains("WITHOUT A VALUE:\n- NOME\n"));
    }

    #[test]
    fn matching_prompt_has_synonyms_and_bands() {
        let prompt = matching_prompt(&[], &BTreeMap::new(), &BTreeMap::new());
        assert!(prompt.contains("AUTORIDADE_COMPETENTE"));
        assert!(prompt.contains("HIGH: 3 or more"));
        assert!(prompt.contains("(none)"));
        assert!(!prompt.contains("{{entities}}"));
    }

    #[test]
    fn extraction_prompt_requests_schema_descriptions() {
        assert!(DEFAULT_EXTRACTION_PROMPT.contains("\"schema\""));
        assert!(DEFAULT_EXTRACTION_PROMPT.contains("description"));
    }
}
