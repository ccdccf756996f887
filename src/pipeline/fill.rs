//! Placeholder scanning and template filling.
//!
//! Templates are Markdown with blanks written as `{{KEY}}` or `<KEY>`.
//! Both syntaxes accept the same names: anything without `<`, `>`, `{`, `}`
//! or a line break, so `<CPF/CNPJ>` and `{{NOME DO(A) COORDENADOR(A)}}` are
//! both blanks. Lookup is by canonical key ([`canonical_key`]), so `{{nome}}`,
//! `<NOME>` and `{{ Nome }}` all resolve to the same value.
//!
//! Angle brackets are shared with inline HTML. A `<...>` token is a blank
//! only when it reads like a key: its first letter is uppercase and it holds
//! no attribute syntax (`=`, quotes) and no leading or trailing `/`. So
//! `<strong>`, `<br/>` and `</u>` are left alone.
//!
//! A blank with no value is left in the output exactly as written. A
//! reviewer sees `<CPF>` in the draft and knows the field is missing; a
//! silently emptied clause would go unnoticed.

use crate::pipeline::keys::canonical_key;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::{BTreeMap, HashMap, HashSet};

static RE_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([^<>{}\n]+?)\s*\}\}|<([^<>{}\s/][^<>{}\n]*?)\s*>").unwrap()
});

/// Name of the placeholder in `caps`, or `None` for an angle-bracket token
/// that is markup rather than a blank.
fn token_name<'t>(caps: &Captures<'t>) -> Option<&'t str> {
    if let Some(braced) = caps.get(1) {
        return Some(braced.as_str());
    }
    caps.get(2)
        .map(|m| m.as_str())
        .filter(|name| looks_like_key(name))
}

fn looks_like_key(name: &str) -> bool {
    let name = name.trim();
    if name.starts_with('/') || name.ends_with('/') {
        return false;
    }
    if name.contains(['=', '"', '\'']) {
        return false;
    }
    name.chars()
        .find(|c| c.is_alphabetic())
        .is_some_and(char::is_uppercase)
}

/// Distinct placeholder names in first-occurrence order.
///
/// Names are returned as written (trimmed); two spellings with the same
/// canonical form count once.
pub fn find_placeholders(template: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    RE_PLACEHOLDER
        .captures_iter(template)
        .filter_map(|caps| token_name(&caps).map(|name| name.trim().to_string()))
        .filter(|name| {
            let canon = canonical_key(name);
            !canon.is_empty() && seen.insert(canon)
        })
        .collect()
}

/// Substitute `values` into `template`.
///
/// `values` maps placeholder (or entity) names to text; keys are compared in
/// canonical form. Substitution is literal: a value containing `$1` or `{{X}}`
/// is inserted as-is and never re-scanned. Unknown placeholders stay
/// untouched.
pub fn fill_template(template: &str, values: &BTreeMap<String, String>) -> String {
    let lookup = canonical_lookup(values);
    RE_PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            match token_name(caps).and_then(|name| lookup.get(&canonical_key(name))) {
                Some(value) => (*value).to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Placeholders of `template` that `values` cannot resolve.
pub fn unresolved_placeholders(template: &str, values: &BTreeMap<String, String>) -> Vec<String> {
    let lookup = canonical_lookup(values);
    find_placeholders(template)
        .into_iter()
        .filter(|name| !lookup.contains_key(&canonical_key(name)))
        .collect()
}

fn canonical_lookup(values: &BTreeMap<String, String>) -> HashMap<String, &str> {
    let mut lookup = HashMap::with_capacity(values.len());
    for (key, value) in values {
        let canon = canonical_key(key);
        if !canon.is_empty() {
            lookup.entry(canon).or_insert(value.as_str());
        }
    }
    lookup
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn fills_both_syntaxes() {
        let out = fill_template(
            "Olá {{NOME}}, seu CPF é <CPF>",
            &values(&[("NOME", "João"), ("CPF", "123")]),
        );
        assert_eq!(out, "Olá João, seu CPF é 123");
    }

    #[test]
    fn unmatched_placeholder_stays_verbatim() {
        let out = fill_template("Olá {{NOME}}, seu CPF é <CPF>", &values(&[("NOME", "João")]));
        assert_eq!(out, "Olá João, seu CPF é <CPF>");
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let out = fill_template("{{nome}} / <Nome> / {{ NOME }}", &values(&[("Nome", "Ana")]));
        assert_eq!(out, "Ana / Ana / Ana");
        let out = fill_template("<Nome> <nome>", &values(&[("NOME", "Ana")]));
        assert_eq!(out, "Ana <nome>");
    }

    #[test]
    fn multi_word_placeholders() {
        let out = fill_template(
            "Projeto: <NOME DO PROJETO>",
            &values(&[("NOME_DO_PROJETO", "Lab 4.0")]),
        );
        assert_eq!(out, "Projeto: Lab 4.0");
    }

    #[test]
    fn values_are_inserted_literally() {
        let out = fill_template(
            "{{VALOR}} e {{OUTRO}}",
            &values(&[("VALOR", "R$ 1.000 ($1) {{OUTRO}}"), ("OUTRO", "x")]),
        );
        assert_eq!(out, "R$ 1.000 ($1) {{OUTRO}} e x");
    }

    #[test]
    fn regex_metacharacters_in_names() {
        let out = fill_template("{{A.B (x)*}}", &values(&[("A.B (x)*", "ok")]));
        assert_eq!(out, "ok");
    }

    #[test]
    fn html_closing_tags_are_not_placeholders() {
        assert_eq!(find_placeholders("<p>{{A}}</p><br/>"), vec!["A"]);
        let out = fill_template("<p>{{A}}</p>", &values(&[("A", "1")]));
        assert_eq!(out, "<p>1</p>");
    }

    #[test]
    fn inline_html_is_left_alone() {
        let t = "<strong>Cláusula</strong> <u>{{NOME}}</u><br> <a href=\"x\">ver</a> <BR/>";
        assert_eq!(find_placeholders(t), vec!["NOME"]);
        let out = fill_template(
            t,
            &values(&[("NOME", "Ana"), ("STRONG", "x"), ("U", "y"), ("BR", "z")]),
        );
        assert_eq!(
            out,
            "<strong>Cláusula</strong> <u>Ana</u><br> <a href=\"x\">ver</a> <BR/>"
        );
    }

    #[test]
    fn both_syntaxes_accept_the_same_names() {
        let t = "{{CPF/CNPJ}} | <CPF/CNPJ> | <NOME DO(A) COORDENADOR(A)> | <VALOR (R$)>";
        assert_eq!(
            find_placeholders(t),
            vec!["CPF/CNPJ", "NOME DO(A) COORDENADOR(A)", "VALOR (R$)"]
        );
        let out = fill_template(
            t,
            &values(&[
                ("CPF/CNPJ", "1"),
                ("NOME DO(A) COORDENADOR(A)", "Maria"),
                ("VALOR (R$)", "10"),
            ]),
        );
        assert_eq!(out, "1 | 1 | Maria | 10");
        assert!(unresolved_placeholders(t, &values(&[("CPF/CNPJ", "1")]))
            .contains(&"NOME DO(A) COORDENADOR(A)".to_string()));
    }

    #[test]
    fn comparison_signs_are_not_placeholders() {
        let t = "Se a < b e c > d, ou 3 <4 e 5> 2.";
        assert!(find_placeholders(t).is_empty());
    }

    #[test]
    fn find_placeholders_dedups_by_canonical_form() {
        let found = find_placeholders("{{NOME}} <CPF> {{nome}} <Data de Início> {{ }} {{CPF}}");
        assert_eq!(found, vec!["NOME", "CPF", "Data de Início"]);
    }

    #[test]
    fn unresolved_lists_missing_fields() {
        let missing = unresolved_placeholders(
            "{{NOME}} <CPF> <ENDERECO>",
            &values(&[("nome", "Ana")]),
        );
        assert_eq!(missing, vec!["CPF", "ENDERECO"]);
    }

    #[test]
    fn template_without_placeholders_is_unchanged() {
        let t = "Cláusula 1ª — sem campos. 3 > 2 e 1 < 2.";
        assert_eq!(fill_template(t, &values(&[("A", "b")])), t);
        assert!(find_placeholders(t).is_empty());
    }
}
