//! The instruction template and field contract for the analysis service.
//!
//! Centralising the contract here serves two purposes:
//!
//! 1. **Single source of truth** — the required field set, the absent marker,
//!    and the instruction text that describes them to the model live in one
//!    place. The parser validates against exactly the same lists the
//!    instruction advertises, so the two cannot drift apart silently.
//!
//! 2. **Testability** — unit tests can inspect the instruction and the field
//!    lists directly without calling a real analysis service.
//!
//! Patient-identifying fields (name, date of birth, address, contact and
//! insurance details) are deliberately NOT part of the contract. The
//! instruction tells the model to omit them, and the validator drops any that
//! slip through, so identifying data never reaches the presentation layer.
//!
//! Callers can override the instruction via
//! [`crate::config::AnalyzerConfig::instruction`]; the constants here are used
//! when no override is provided. An override changes only the prose sent to
//! the model — the validated field set stays fixed.

/// Marker the contract uses for a field the document does not contain.
///
/// The model is instructed to emit this literal; the validator also
/// substitutes it for any required key missing from the response.
pub const ABSENT_MARKER: &str = "N/A";

/// Required single-valued fields, in the order they appear in the record.
pub const REQUIRED_SCALAR_FIELDS: &[&str] = &[
    "document_type",
    "document_date",
    "department",
    "chief_complaint",
    "follow_up",
    "analysis_confidence",
];

/// Required list-valued fields (each entry free-form per the service).
pub const REQUIRED_LIST_FIELDS: &[&str] = &[
    "diagnoses",
    "medications",
    "procedures",
    "lab_results",
    "allergies",
    "key_findings",
    "recommendations",
];

/// Every required field key, scalars first.
pub fn required_fields() -> impl Iterator<Item = &'static str> {
    REQUIRED_SCALAR_FIELDS
        .iter()
        .chain(REQUIRED_LIST_FIELDS.iter())
        .copied()
}

/// True if `name` is part of the fixed field contract.
pub fn is_recognized_field(name: &str) -> bool {
    REQUIRED_SCALAR_FIELDS.contains(&name) || REQUIRED_LIST_FIELDS.contains(&name)
}

/// Default instruction sent alongside the document text.
///
/// Describes the exact output schema: one flat JSON object, every required
/// key present, `"N/A"` for anything the document does not contain, and no
/// patient-identifying data.
pub const DEFAULT_INSTRUCTION: &str = r#"You are a medical document analyst. Analyze the medical document below and extract its metadata as a single JSON object.

Follow these rules precisely:

1. OUTPUT SCHEMA
   Return exactly one flat JSON object with these keys and no others:
   - "document_type": string (e.g. "discharge summary", "lab report")
   - "document_date": string (primary date of the document, as written)
   - "department": string
   - "chief_complaint": string
   - "follow_up": string (follow-up instructions, if any)
   - "analysis_confidence": "high", "medium", or "low"
   - "diagnoses": array of strings
   - "medications": array of strings (name plus dosage where stated)
   - "procedures": array of strings
   - "lab_results": array of strings (test name, value, and unit)
   - "allergies": array of strings
   - "key_findings": array of strings
   - "recommendations": array of strings

2. MISSING INFORMATION
   - If a value is not present in the document, use the string "N/A"
     for scalar fields and an empty array [] for list fields
   - Never invent values; extract only what the document states

3. PRIVACY
   - Do NOT include patient names, dates of birth, addresses, phone
     numbers, insurance details, or any other patient identifiers

4. OUTPUT FORMAT
   - Output ONLY the JSON object
   - Do NOT wrap it in markdown fences
   - Do NOT add commentary before or after the object"#;

/// Assemble the full user message: instruction, then the document text.
///
/// The coordinator never calls this with empty text — a document with no
/// recoverable text short-circuits to an all-absent record instead of
/// asking the service about nothing.
pub fn build_user_message(instruction: &str, document_text: &str) -> String {
    format!(
        "{instruction}\n\nMedical document:\n\"\"\"\n{document_text}\n\"\"\""
    )
}
