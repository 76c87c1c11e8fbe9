//! Metadata parsing and validation: turn the analysis service's free-form
//! reply into a [`MedicalMetadata`] record that honours the fixed field
//! contract.
//!
//! The service is *asked* for a bare JSON object but does not always comply:
//! replies arrive wrapped in markdown fences, preceded by commentary, or
//! truncated mid-object. Parsing therefore runs in tiers:
//!
//! 1. Parse the whole (fence-stripped) reply as a JSON object.
//! 2. Extract the outermost `{...}` span and parse that.
//! 3. Scan for individual `"field": value` fragments of recognized keys.
//!
//! Tier 1 yields [`ParseOutcome::Parsed`]; tiers 2–3 yield
//! [`ParseOutcome::Recovered`] with notes describing what was salvaged;
//! nothing at all yields [`ParseOutcome::Unparseable`]. The caller decides
//! whether a recovered record is acceptable — the parser never errors.

use crate::output::{FieldValue, MedicalMetadata};
use crate::prompts::{is_recognized_field, required_fields, ABSENT_MARKER, REQUIRED_LIST_FIELDS};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

/// Outermost brace span: first `{` to last `}` across lines.
static JSON_SPAN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{[\s\S]*\}").unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

/// The result of interpreting a service reply. Tagged so callers can tell
/// a clean parse from a salvage operation.
#[derive(Debug)]
pub enum ParseOutcome {
    /// The reply was a well-formed JSON object. `notes` report validation
    /// actions (dropped unrecognized fields), so a cleanly parsed reply
    /// that leaked a patient identifier still leaves a diagnostic trace.
    Parsed {
        metadata: MedicalMetadata,
        notes: Vec<String>,
    },
    /// A record was salvaged from a malformed reply; `notes` describe how.
    Recovered {
        metadata: MedicalMetadata,
        notes: Vec<String>,
    },
    /// Nothing recognizable could be extracted.
    Unparseable { detail: String },
}

/// Parse and validate a raw service reply.
pub fn parse_response(content: &str) -> ParseOutcome {
    let stripped = strip_fences(content);

    // Tier 1: the whole reply is the object.
    if let Ok(Value::Object(raw)) = serde_json::from_str::<Value>(stripped) {
        let (metadata, notes) = validate(raw);
        debug!("Reply parsed cleanly ({} fields dropped)", notes.len());
        return ParseOutcome::Parsed { metadata, notes };
    }

    // Tier 2: the object is embedded in surrounding prose.
    if let Some(span) = JSON_SPAN.find(stripped) {
        if let Ok(Value::Object(raw)) = serde_json::from_str::<Value>(span.as_str()) {
            let (metadata, mut notes) = validate(raw);
            notes.insert(
                0,
                "reply contained commentary around the JSON object".to_string(),
            );
            return ParseOutcome::Recovered { metadata, notes };
        }
    }

    // Tier 3: salvage individual fields from a broken reply.
    let (salvaged, count) = scan_fragments(stripped);
    if count > 0 {
        return ParseOutcome::Recovered {
            metadata: salvaged,
            notes: vec![format!(
                "reply was not valid JSON; salvaged {count} field(s) by fragment scan"
            )],
        };
    }

    ParseOutcome::Unparseable {
        detail: format!(
            "no JSON object or recognizable fields in {} chars of reply",
            content.len()
        ),
    }
}

/// Remove a markdown code fence if the reply is wrapped in one.
fn strip_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the opening fence line.
    match body.split_once('\n') {
        Some((first, tail)) if first.len() <= 10 => tail.trim(),
        _ => body.trim(),
    }
}

/// Validate a raw JSON object against the field contract.
///
/// Every required field appears in the result; unrecognized keys (including
/// any patient identifiers the model emitted despite instructions) are
/// dropped and reported.
pub fn validate(raw: Map<String, Value>) -> (MedicalMetadata, Vec<String>) {
    let mut metadata = MedicalMetadata::all_absent();
    let mut notes = Vec::new();

    for (key, value) in raw {
        if !is_recognized_field(&key) {
            notes.push(format!("dropped unrecognized field '{key}'"));
            continue;
        }
        let is_list = REQUIRED_LIST_FIELDS.contains(&key.as_str());
        metadata.fields.insert(key, coerce(value, is_list));
    }

    (metadata, notes)
}

/// Coerce a JSON value into the shape the contract expects for the field.
fn coerce(value: Value, is_list: bool) -> FieldValue {
    match value {
        Value::Null => empty(is_list),
        Value::String(s) if s.trim() == ABSENT_MARKER || s.trim().is_empty() => empty(is_list),
        Value::Array(items) => FieldValue::Items(items),
        Value::String(s) if is_list => FieldValue::Items(vec![Value::String(s)]),
        Value::String(s) => FieldValue::Text(s),
        other if is_list => FieldValue::Items(vec![other]),
        other => FieldValue::Text(other.to_string()),
    }
}

fn empty(is_list: bool) -> FieldValue {
    if is_list {
        FieldValue::Items(Vec::new())
    } else {
        FieldValue::Absent
    }
}

/// Last-resort salvage: pick out `"field": value` fragments for recognized
/// keys from a reply that is not valid JSON (truncated output, stray
/// trailing commas).
fn scan_fragments(content: &str) -> (MedicalMetadata, usize) {
    let mut metadata = MedicalMetadata::all_absent();
    let mut count = 0;

    for field in required_fields() {
        let is_list = REQUIRED_LIST_FIELDS.contains(&field);
        let pattern = if is_list {
            format!(r#""{}"\s*:\s*(\[[^\]]*\])"#, regex::escape(field))
        } else {
            format!(r#""{}"\s*:\s*"((?:[^"\\]|\\.)*)""#, regex::escape(field))
        };
        let Ok(re) = Regex::new(&pattern) else {
            continue;
        };
        let Some(caps) = re.captures(content) else {
            continue;
        };
        let Some(m) = caps.get(1) else {
            continue;
        };

        let value = if is_list {
            match serde_json::from_str::<Value>(m.as_str()) {
                Ok(Value::Array(items)) => FieldValue::Items(items),
                _ => continue,
            }
        } else {
            match serde_json::from_str::<Value>(&format!("\"{}\"", m.as_str())) {
                Ok(Value::String(s)) if s.trim() == ABSENT_MARKER => FieldValue::Absent,
                Ok(Value::String(s)) => FieldValue::Text(s),
                _ => continue,
            }
        };

        if !value.is_absent() {
            count += 1;
        }
        metadata.fields.insert(field.to_string(), value);
    }

    (metadata, count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn well_formed_reply() -> String {
        serde_json::json!({
            "document_type": "discharge summary",
            "document_date": "2024-03-15",
            "department": "Cardiology",
            "chief_complaint": "chest pain",
            "follow_up": "N/A",
            "analysis_confidence": "high",
            "diagnoses": ["NSTEMI"],
            "medications": ["aspirin 81mg"],
            "procedures": [],
            "lab_results": ["troponin 0.8 ng/mL"],
            "allergies": [],
            "key_findings": ["elevated troponin"],
            "recommendations": ["cardiology follow-up"]
        })
        .to_string()
    }

    #[test]
    fn clean_json_parses_as_parsed() {
        let outcome = parse_response(&well_formed_reply());
        let ParseOutcome::Parsed { metadata, notes } = outcome else {
            panic!("expected Parsed, got {outcome:?}");
        };
        assert_eq!(
            metadata.get("department"),
            Some(&FieldValue::Text("Cardiology".into()))
        );
        assert!(metadata.get("follow_up").unwrap().is_absent());
        assert!(notes.is_empty());
    }

    #[test]
    fn fenced_json_still_parses_cleanly() {
        let reply = format!("```json\n{}\n```", well_formed_reply());
        assert!(matches!(parse_response(&reply), ParseOutcome::Parsed { .. }));
    }

    #[test]
    fn commentary_around_object_is_recovered() {
        let reply = format!(
            "Sure! Here is the extracted metadata:\n\n{}\n\nLet me know if you need more.",
            well_formed_reply()
        );
        let ParseOutcome::Recovered { metadata, notes } = parse_response(&reply) else {
            panic!("expected Recovered");
        };
        assert_eq!(
            metadata.get("document_type"),
            Some(&FieldValue::Text("discharge summary".into()))
        );
        assert!(!notes.is_empty());
    }

    #[test]
    fn truncated_reply_salvages_fragments() {
        // Simulates output cut off mid-object: not valid JSON.
        let reply = r#"{"document_type": "lab report", "department": "Hematology", "diagnoses": ["anemia"], "medicat"#;
        let ParseOutcome::Recovered { metadata, .. } = parse_response(reply) else {
            panic!("expected Recovered");
        };
        assert_eq!(
            metadata.get("department"),
            Some(&FieldValue::Text("Hematology".into()))
        );
        assert_eq!(
            metadata.get("diagnoses"),
            Some(&FieldValue::Items(vec![serde_json::json!("anemia")]))
        );
        // Unmentioned fields remain absent.
        assert!(metadata.get("chief_complaint").unwrap().is_absent());
    }

    #[test]
    fn garbage_is_unparseable() {
        let outcome = parse_response("I could not analyze this document, sorry.");
        assert!(matches!(outcome, ParseOutcome::Unparseable { .. }));
    }

    #[test]
    fn missing_required_fields_default_to_absent() {
        let outcome = parse_response(r#"{"department": "ER"}"#);
        let ParseOutcome::Parsed { metadata, .. } = outcome else {
            panic!("expected Parsed");
        };
        assert_eq!(metadata.present_fields(), 1);
        for field in required_fields().filter(|f| *f != "department") {
            assert!(metadata.get(field).unwrap().is_absent(), "{field}");
        }
    }

    #[test]
    fn unrecognized_and_identifier_fields_are_dropped() {
        let reply = r#"{
            "department": "Oncology",
            "patient_name": "Jane Doe",
            "social_security_number": "000-00-0000",
            "mood": "optimistic"
        }"#;
        let ParseOutcome::Parsed { metadata, notes } = parse_response(reply) else {
            panic!("expected Parsed");
        };
        assert!(metadata.get("patient_name").is_none());
        assert!(metadata.get("social_security_number").is_none());
        assert!(metadata.get("mood").is_none());
        assert_eq!(metadata.present_fields(), 1);
        // Each dropped field leaves a diagnostic note even on a clean parse.
        assert_eq!(notes.len(), 3);
        assert!(notes.iter().any(|n| n.contains("patient_name")));
    }

    #[test]
    fn absent_marker_and_null_normalise_to_absent() {
        let reply = r#"{"follow_up": "N/A", "document_date": null, "allergies": "N/A"}"#;
        let ParseOutcome::Parsed { metadata, .. } = parse_response(reply) else {
            panic!("expected Parsed");
        };
        assert_eq!(metadata.get("follow_up"), Some(&FieldValue::Absent));
        assert_eq!(metadata.get("document_date"), Some(&FieldValue::Absent));
        assert_eq!(metadata.get("allergies"), Some(&FieldValue::Items(vec![])));
    }

    #[test]
    fn scalar_on_list_field_is_wrapped() {
        let reply = r#"{"diagnoses": "hypertension"}"#;
        let ParseOutcome::Parsed { metadata, .. } = parse_response(reply) else {
            panic!("expected Parsed");
        };
        assert_eq!(
            metadata.get("diagnoses"),
            Some(&FieldValue::Items(vec![serde_json::json!("hypertension")]))
        );
    }
}
