//! Post-processing: turn raw model output into a JSON value.
//!
//! Even when asked for "ONLY one JSON object", models sometimes wrap the
//! answer in ` ```json ` fences, prepend a sentence ("Here are the
//! entities:"), or leak a BOM or zero-width space. These cheap deterministic
//! rules recover the object without a second, billed model call.
//!
//! Rules (applied in order):
//! 1. Strip invisible Unicode (BOM, zero-width spaces, soft hyphen)
//! 2. Strip outer Markdown code fences
//! 3. Cut everything before the first `{` and after its matching `}`

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// Why a model reply could not be turned into a JSON object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseError {
    /// The reply was empty or whitespace only.
    #[error("model returned an empty response")]
    Empty,
    /// No JSON object could be located in the reply.
    #[error("model response contains no JSON object")]
    NoJsonObject,
    /// An object-like span was found but did not parse.
    #[error("model response is not valid JSON: {0}")]
    Malformed(String),
}

/// Parse the first JSON object in a model reply.
///
/// A JSON `null` reply counts as [`ResponseError::NoJsonObject`].
pub fn parse_json_object(raw: &str) -> Result<Value, ResponseError> {
    let s = remove_invisible_chars(raw);
    let s = strip_code_fences(&s);
    let s = s.trim();
    if s.is_empty() {
        return Err(ResponseError::Empty);
    }

    let span = outer_object_span(s).ok_or(ResponseError::NoJsonObject)?;
    let value: Value =
        serde_json::from_str(span).map_err(|e| ResponseError::Malformed(e.to_string()))?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(ResponseError::NoJsonObject)
    }
}

// ── Rule 1: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 2: Strip outer code fences ─────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*\s*\n(.*?)\n?```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 3: Locate the outermost object ─────────────────────────────────────

/// Return the slice from the first `{` to its matching `}`, honouring JSON
/// string literals so braces inside values do not unbalance the scan.
fn outer_object_span(input: &str) -> Option<&str> {
    let start = input.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in input[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&input[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_object() {
        let v = parse_json_object(r#"{"entities": {"CPF": "123"}}"#).unwrap();
        assert_eq!(v["entities"]["CPF"], "123");
    }

    #[test]
    fn fenced_object() {
        let v = parse_json_object("```json\n{\"a\": 1}\n```").unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn fence_without_language() {
        let v = parse_json_object("```\n{\"a\": 1}\n```\n").unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn prose_around_object() {
        let v = parse_json_object("Here you go:\n{\"a\": {\"b\": 2}}\nHope it helps!").unwrap();
        assert_eq!(v["a"]["b"], 2);
    }

    #[test]
    fn braces_inside_strings() {
        let v = parse_json_object(r#"{"reasoning": "use {{NOME}} and \"}\"", "matches": []}"#)
            .unwrap();
        assert_eq!(v["matches"], serde_json::json!([]));
    }

    #[test]
    fn bom_is_ignored() {
        assert!(parse_json_object("\u{FEFF}{\"a\": 1}").is_ok());
    }

    #[test]
    fn empty_and_null_replies() {
        assert_eq!(parse_json_object("  \n"), Err(ResponseError::Empty));
        assert_eq!(parse_json_object("null"), Err(ResponseError::NoJsonObject));
        assert_eq!(
            parse_json_object("I could not read the files."),
            Err(ResponseError::NoJsonObject)
        );
    }

    #[test]
    fn truncated_object() {
        assert_eq!(
            parse_json_object(r#"{"entities": {"CPF": "12"#),
            Err(ResponseError::NoJsonObject)
        );
    }

    #[test]
    fn malformed_object() {
        assert!(matches!(
            parse_json_object("{'a': 1}"),
            Err(ResponseError::Malformed(_))
        ));
    }

    #[test]
    fn errors_render_and_chain() {
        assert_eq!(
            ResponseError::NoJsonObject.to_string(),
            "model response contains no JSON object"
        );
        let err: Box<dyn std::error::Error> =
            Box::new(ResponseError::Malformed("expected value".into()));
        assert_eq!(err.to_string(), "model response is not valid JSON: expected value");
    }
}
