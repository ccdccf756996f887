//! Entity extraction: source documents → [`ExtractionOutput`].
//!
//! One model call per request. The documents travel with the instruction:
//! textual ones (plain text, CSV, HTML, JSON) inline in the user message,
//! everything else (PDF, DOCX, XLSX, images) as base64 attachments.
//!
//! Failures are loud. If the reply holds no usable JSON the call returns
//! [`ContractFillError::ExtractionFailed`] and the caller decides whether to
//! retry.

use crate::config::PipelineConfig;
use crate::error::ContractFillError;
use crate::output::{EntityMap, EntitySchema, ExtractionOutput, SchemaProperty};
use crate::pipeline::document::Document;
use crate::pipeline::keys::sanitize_key;
use crate::pipeline::llm::{build_options, ModelClient};
use crate::pipeline::response::parse_json_object;
use crate::prompts::DEFAULT_EXTRACTION_PROMPT;
use edgequake_llm::{ChatMessage, ImageData};
use serde_json::{Map, Value};
use std::collections::btree_map::Entry;
use tracing::{debug, info, warn};

/// Extract entities from `documents` with one model call.
pub async fn extract_entities(
    client: &dyn ModelClient,
    documents: &[Document],
    config: &PipelineConfig,
) -> Result<ExtractionOutput, ContractFillError> {
    if documents.is_empty() {
        return Err(ContractFillError::NoDocuments);
    }
    for doc in documents {
        doc.check_size(config.max_document_bytes)?;
    }

    info!(
        "Extracting entities from {} document(s) with {}",
        documents.len(),
        client.label()
    );

    let messages = build_messages(documents, extraction_instruction(config));
    let reply = client.chat(&messages, &build_options(config)).await?;
    debug!(
        "Extraction reply: {} chars, {} input / {} output tokens",
        reply.content.len(),
        reply.input_tokens,
        reply.output_tokens
    );

    let output = parse_extraction(&reply.content)?;
    info!("Extracted {} entities", output.entities.len());
    Ok(output)
}

/// The instruction actually sent: the configured override or the default.
pub fn extraction_instruction(config: &PipelineConfig) -> &str {
    config
        .extraction_prompt
        .as_deref()
        .unwrap_or(DEFAULT_EXTRACTION_PROMPT)
}

/// Message layout:
/// 1. **System message**: the extraction instruction
/// 2. **User message**: document index, inline text documents, and the
///    binary documents as attachments
fn build_messages(documents: &[Document], instruction: &str) -> Vec<ChatMessage> {
    let mut text = String::from("Source documents:\n");
    let mut attachments = Vec::new();

    for (i, doc) in documents.iter().enumerate() {
        text.push_str(&format!(
            "{}. {} ({})\n",
            i + 1,
            doc.display_name(),
            doc.mime_type()
        ));
    }

    for (i, doc) in documents.iter().enumerate() {
        match doc.text() {
            Some(body) => {
                text.push_str(&format!(
                    "\n=== Document {}: {} ===\n{}\n=== End of document {} ===\n",
                    i + 1,
                    doc.display_name(),
                    body,
                    i + 1
                ));
            }
            None => attachments.push(ImageData::new(
                doc.base64_data().to_string(),
                doc.mime_type(),
            )),
        }
    }

    let user = if attachments.is_empty() {
        ChatMessage::user(text)
    } else {
        ChatMessage::user_with_images(text, attachments)
    };

    vec![ChatMessage::system(instruction), user]
}

/// Parse and sanitize an extraction reply.
///
/// Every key in `entities` and `schema.properties` goes through
/// [`sanitize_key`]; keys that sanitize to nothing are dropped, and when two
/// raw keys collapse to the same canonical key the first one wins. The schema
/// is kept parallel to the entity map: every entity gets a property (falling
/// back to its raw key as description) and properties without a value are
/// dropped.
pub fn parse_extraction(raw: &str) -> Result<ExtractionOutput, ContractFillError> {
    let value = parse_json_object(raw).map_err(|e| ContractFillError::ExtractionFailed {
        detail: e.to_string(),
    })?;

    let raw_entities = value
        .get("entities")
        .and_then(Value::as_object)
        .ok_or_else(|| ContractFillError::ExtractionFailed {
            detail: "response has no 'entities' object".to_string(),
        })?;

    let mut entities = EntityMap::new();
    let mut raw_names = EntityMap::new();
    for (raw_key, raw_value) in raw_entities {
        let Some(key) = sanitize_key(raw_key) else {
            warn!("Dropping entity with empty key after sanitizing: {:?}", raw_key);
            continue;
        };
        let Some(text) = value_to_text(raw_value) else {
            debug!("Skipping null entity {}", key);
            continue;
        };
        match entities.entry(key) {
            Entry::Vacant(slot) => {
                raw_names.insert(slot.key().clone(), raw_key.clone());
                slot.insert(text);
            }
            Entry::Occupied(slot) => {
                warn!(
                    "Entity key {:?} collides with an earlier key as {}; keeping the first",
                    raw_key,
                    slot.key()
                );
            }
        }
    }

    let empty = Map::new();
    let raw_properties = value
        .get("schema")
        .and_then(|s| s.get("properties"))
        .and_then(Value::as_object)
        .unwrap_or_else(|| {
            warn!("Extraction reply has no schema.properties; using fallback descriptions");
            &empty
        });

    let mut schema = EntitySchema::default();
    for (raw_key, raw_property) in raw_properties {
        let Some(key) = sanitize_key(raw_key) else {
            continue;
        };
        if !entities.contains_key(&key) || schema.properties.contains_key(&key) {
            continue;
        }
        if let Some(property) = parse_property(raw_property) {
            schema.properties.insert(key, property);
        }
    }
    for (key, raw_name) in &raw_names {
        schema
            .properties
            .entry(key.clone())
            .or_insert_with(|| SchemaProperty {
                kind: "string".to_string(),
                description: raw_name.trim().to_string(),
            });
    }

    if entities.is_empty() {
        warn!("Extraction reply parsed but contains no entities");
    }

    Ok(ExtractionOutput { entities, schema })
}

fn parse_property(raw: &Value) -> Option<SchemaProperty> {
    let description = raw
        .get("description")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|d| !d.is_empty())?;
    let kind = raw
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("string");
    Some(SchemaProperty {
        kind: kind.to_string(),
        description: description.to_string(),
    })
}

/// Render an entity value as the literal text the filler will insert.
fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()),
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(value_to_text)
                .collect::<Vec<_>>()
                .join(", "),
        ),
        Value::Object(_) => Some(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::keys::is_canonical;
    use edgequake_llm::ChatRole;

    #[test]
    fn text_documents_inline_binary_documents_attached() {
        let docs = vec![
            Document::from_bytes(
                "text/plain",
                "Coordenadora: Maria Silva".as_bytes(),
                Some("plano.txt".into()),
            )
            .unwrap(),
            Document::from_bytes(
                "application/pdf",
                b"%PDF-1.4 orcamento",
                Some("orcamento.pdf".into()),
            )
            .unwrap(),
        ];

        let messages = build_messages(&docs, "Extraia os dados.");

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::System);
        assert_eq!(messages[0].content, "Extraia os dados.");
        assert_eq!(messages[1].role, ChatRole::User);

        let user = &messages[1].content;
        assert!(user.contains("1. plano.txt (text/plain)"));
        assert!(user.contains("2. orcamento.pdf (application/pdf)"));
        assert!(user.contains("=== Document 1: plano.txt ===\nCoordenadora: Maria Silva\n"));
        assert!(!user.contains(docs[1].base64_data()));

        let attachments = messages[1].images.as_ref().unwrap();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].mime_type, "application/pdf");
        assert_eq!(attachments[0].data, docs[1].base64_data());
    }

    #[test]
    fn text_only_request_has_no_attachments() {
        let docs = vec![Document::from_bytes("text/csv", b"CPF,123", None).unwrap()];
        let messages = build_messages(&docs, "x");
        assert!(messages[1].images.is_none());
        assert!(messages[1].content.contains("CPF,123"));
    }

    #[test]
    fn sanitizes_entity_and_schema_keys() {
        let raw = r#"{
            "entities": {"{{NOME}}": "Maria Silva", "valor total": "R$ 10.000,00"},
            "schema": {"properties": {
                "{{NOME}}": {"type": "string", "description": "Nome da coordenadora"},
                "valor total": {"type": "string", "description": "Valor global"}
            }}
        }"#;
        let out = parse_extraction(raw).unwrap();
        assert_eq!(out.entities["NOME"], "Maria Silva");
        assert_eq!(out.entities["VALOR_TOTAL"], "R$ 10.000,00");
        assert_eq!(out.schema.properties["NOME"].description, "Nome da coordenadora");
        assert!(out.entities.keys().all(|k| is_canonical(k)));
        assert_eq!(
            out.entities.keys().collect::<Vec<_>>(),
            out.schema.properties.keys().collect::<Vec<_>>()
        );
    }

    #[test]
    fn empty_keys_are_dropped_not_blank() {
        let raw = r#"{"entities": {"{{}}": "x", "< / >": "y", "CPF": "123"},
                      "schema": {"properties": {"{{}}": {"description": "?"}}}}"#;
        let out = parse_extraction(raw).unwrap();
        assert_eq!(out.entities.len(), 1);
        assert!(!out.entities.contains_key(""));
        assert!(!out.schema.properties.contains_key(""));
    }

    #[test]
    fn first_colliding_key_wins() {
        let raw = r#"{"entities": {"NOME": "primeiro", "{{NOME}}": "segundo"}}"#;
        let out = parse_extraction(raw).unwrap();
        // "NOME" is seen before "{{NOME}}"
        assert_eq!(out.entities["NOME"], "primeiro");
    }

    #[test]
    fn missing_schema_gets_fallback_descriptions() {
        let out = parse_extraction(r#"{"entities": {"data de inicio": "01/02/2025"}}"#).unwrap();
        assert_eq!(out.schema.properties["DATA_DE_INICIO"].description, "data de inicio");
    }

    #[test]
    fn property_without_description_falls_back() {
        let raw = r#"{"entities": {"CNPJ": "00.000.000/0001-00"},
                      "schema": {"properties": {"CNPJ": {"type": "string"}}}}"#;
        let out = parse_extraction(raw).unwrap();
        assert_eq!(out.schema.properties["CNPJ"].description, "CNPJ");
    }

    #[test]
    fn schema_only_keys_are_dropped() {
        let raw = r#"{"entities": {"CPF": "1"},
                      "schema": {"properties": {"CPF": {"description": "CPF"}, "RG": {"description": "RG"}}}}"#;
        let out = parse_extraction(raw).unwrap();
        assert!(!out.schema.properties.contains_key("RG"));
    }

    #[test]
    fn non_string_values_are_rendered() {
        let raw = r#"{"entities": {"PRAZO": 12, "BOLSISTAS": ["Ana", "Rui"], "ATIVO": true, "VAZIO": null}}"#;
        let out = parse_extraction(raw).unwrap();
        assert_eq!(out.entities["PRAZO"], "12");
        assert_eq!(out.entities["BOLSISTAS"], "Ana, Rui");
        assert_eq!(out.entities["ATIVO"], "true");
        assert!(!out.entities.contains_key("VAZIO"));
    }

    #[test]
    fn unparsable_reply_fails_loudly() {
        for raw in ["", "null", "Desculpe, não consegui ler os arquivos.", r#"{"foo": 1}"#] {
            let err = parse_extraction(raw).unwrap_err();
            assert!(
                matches!(err, ContractFillError::ExtractionFailed { .. }),
                "{raw:?} gave {err:?}"
            );
            assert!(err.to_string().starts_with("AI failed to generate"));
        }
    }

    #[test]
    fn fenced_reply_is_accepted() {
        let out = parse_extraction("```json\n{\"entities\": {\"CPF\": \"123\"}}\n```").unwrap();
        assert_eq!(out.entities["CPF"], "123");
    }

    #[test]
    fn instruction_override() {
        let config = PipelineConfig::builder()
            .extraction_prompt("Extract only names.")
            .build()
            .unwrap();
        assert_eq!(extraction_instruction(&config), "Extract only names.");
        assert_eq!(
            extraction_instruction(&PipelineConfig::default()),
            DEFAULT_EXTRACTION_PROMPT
        );
    }
}
