//! Canonical key form for entity keys and placeholder names.
//!
//! Entity keys come back from the model and placeholder names come out of
//! templates; both are compared in one canonical form: uppercase ASCII
//! letters, digits and single underscores, e.g. `NOME_DO_PROJETO`.
//!
//! Sanitizing model-produced keys is mandatory. The template filler uses
//! `{{KEY}}` and `<KEY>` as substitution syntax, and a key that still carried
//! braces or angle brackets would corrupt the substitution pass.

use once_cell::sync::Lazy;
use regex::Regex;

/// Characters removed outright (they do not separate words).
const STRIPPED: [char; 5] = ['<', '>', '{', '}', '/'];

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static RE_NON_CANONICAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Z0-9_]").unwrap());
static RE_UNDERSCORES: Lazy<Regex> = Lazy::new(|| Regex::new(r"_{2,}").unwrap());

/// Sanitize a raw key into canonical form.
///
/// Steps, in order:
/// 1. remove `<`, `>`, `{`, `}` and `/`
/// 2. trim
/// 3. fold Latin accents (`Ç` → `C`, `ã` → `a`, …) and uppercase
/// 4. collapse whitespace runs to one underscore
/// 5. replace anything outside `[A-Z0-9_]` with an underscore, collapse
///    repeated underscores and trim them from both ends
///
/// Returns `None` when nothing is left; such keys are dropped by callers.
/// Already-canonical keys are returned unchanged.
pub fn sanitize_key(raw: &str) -> Option<String> {
    let stripped: String = raw.chars().filter(|c| !STRIPPED.contains(c)).collect();
    let upper: String = stripped
        .trim()
        .chars()
        .map(fold_accent)
        .flat_map(char::to_uppercase)
        .collect();
    let underscored = RE_WHITESPACE.replace_all(&upper, "_");
    let ascii = RE_NON_CANONICAL.replace_all(&underscored, "_");
    let collapsed = RE_UNDERSCORES.replace_all(&ascii, "_");
    let key = collapsed.trim_matches('_');

    if key.is_empty() {
        None
    } else {
        Some(key.to_string())
    }
}

/// Canonical form used for comparisons; empty when the name has no content.
pub fn canonical_key(name: &str) -> String {
    sanitize_key(name).unwrap_or_default()
}

/// Whether `key` is already in canonical form.
pub fn is_canonical(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('_')
        && !key.ends_with('_')
        && !key.contains("__")
        && key
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
        'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'ç' => 'c',
        'Ç' => 'C',
        'ñ' => 'n',
        'Ñ' => 'N',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_key_is_unchanged() {
        assert_eq!(sanitize_key("VALOR_TOTAL").as_deref(), Some("VALOR_TOTAL"));
    }

    #[test]
    fn strips_template_delimiters() {
        assert_eq!(sanitize_key("{{CPF}}").as_deref(), Some("CPF"));
        assert_eq!(sanitize_key("<NOME>").as_deref(), Some("NOME"));
        assert_eq!(sanitize_key("CPF/CNPJ").as_deref(), Some("CPFCNPJ"));
    }

    #[test]
    fn spaces_become_underscores() {
        assert_eq!(
            sanitize_key("  nome do   projeto ").as_deref(),
            Some("NOME_DO_PROJETO")
        );
        assert_eq!(sanitize_key("data\tde\ninício").as_deref(), Some("DATA_DE_INICIO"));
    }

    #[test]
    fn folds_portuguese_accents() {
        assert_eq!(
            sanitize_key("Razão Social").as_deref(),
            Some("RAZAO_SOCIAL")
        );
        assert_eq!(sanitize_key("INSCRIÇÃO").as_deref(), Some("INSCRICAO"));
    }

    #[test]
    fn punctuation_separates_words() {
        assert_eq!(sanitize_key("valor-total (R$)").as_deref(), Some("VALOR_TOTAL_R"));
        assert_eq!(sanitize_key("__A__B__").as_deref(), Some("A_B"));
    }

    #[test]
    fn empty_after_sanitizing_is_dropped() {
        assert_eq!(sanitize_key(""), None);
        assert_eq!(sanitize_key("{{ }}"), None);
        assert_eq!(sanitize_key("</>"), None);
        assert_eq!(sanitize_key("---"), None);
        assert_eq!(canonical_key("{}"), "");
    }

    #[test]
    fn output_is_always_canonical() {
        let samples = [
            "Nome do Coordenador",
            "e-mail / contato",
            "{{VALOR}}<br>",
            "prazo: 12 meses",
            "ÁREA TÉCNICA",
            "日付",
            "a\u{00A0}b",
        ];
        for raw in samples {
            if let Some(key) = sanitize_key(raw) {
                assert!(is_canonical(&key), "{raw:?} -> {key:?}");
            }
        }
    }

    #[test]
    fn sanitizing_is_idempotent() {
        for raw in ["nome do projeto", "CPF/CNPJ", "Razão Social", "x__y"] {
            let once = canonical_key(raw);
            assert_eq!(canonical_key(&once), once);
        }
    }

    #[test]
    fn is_canonical_rejects_lowercase_and_edges() {
        assert!(is_canonical("NOME_1"));
        assert!(!is_canonical("nome"));
        assert!(!is_canonical("_NOME"));
        assert!(!is_canonical("A__B"));
        assert!(!is_canonical(""));
    }
}
