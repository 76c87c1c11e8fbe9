//! Output types: per-page extraction results, the assembled document, the
//! validated metadata record, and the presentation-facing analysis result.
//!
//! Everything here is immutable once produced and serialisable, so the
//! presentation layer can render, cache, or ship a result without reaching
//! back into the pipeline.

use crate::prompts::{required_fields, ABSENT_MARKER, REQUIRED_LIST_FIELDS};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// How a page's text was recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Text parsed natively from the page's content stream.
    Direct,
    /// Text recognized from a rasterized image of the page.
    Ocr,
}

/// The extraction outcome for a single page. Created once during assembly,
/// never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageText {
    /// 0-based page index; ordering is significant.
    pub index: usize,
    /// Extracted text, possibly empty.
    pub text: String,
    /// Which extraction path produced `text`.
    pub method: ExtractionMethod,
    /// Whether direct extraction met the usability threshold.
    /// Always `false` for pages that went through OCR.
    pub usable: bool,
}

/// The assembled text of a whole document.
///
/// `text` is the join of all page texts in index-ascending order, separated
/// by page-boundary markers — a page that contributed nothing still occupies
/// its slot, so downstream consumers can reason about page structure.
///
/// Invariant: `pages_used_ocr.len() <= pages.len()`, and every index in
/// `pages_used_ocr` names a page whose [`PageText::method`] is
/// [`ExtractionMethod::Ocr`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentText {
    /// Concatenated page texts with boundary markers.
    pub text: String,
    /// Per-page extraction results, index ascending.
    pub pages: Vec<PageText>,
    /// 0-based indices of the pages that required OCR.
    pub pages_used_ocr: BTreeSet<usize>,
}

impl DocumentText {
    /// A zero-page document. Not an error — callers handle it gracefully
    /// and the analysis still runs (and reports every field absent).
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            pages: Vec::new(),
            pages_used_ocr: BTreeSet::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// True when at least one page contributed non-whitespace text.
    ///
    /// The assembled `text` is not a reliable signal on its own: it carries
    /// page-boundary markers even for pages whose extraction produced
    /// nothing, so a fully failed document still has non-empty `text`.
    /// For a hand-assembled document without per-page records, falls back
    /// to checking `text` directly.
    pub fn has_recoverable_text(&self) -> bool {
        if self.pages.is_empty() {
            !self.text.trim().is_empty()
        } else {
            self.pages.iter().any(|p| !p.text.trim().is_empty())
        }
    }
}

/// Raw reply from the analysis service, plus status metadata.
/// Immutable once received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResponse {
    /// The assistant message content — free-form or semi-structured text
    /// expected (but not guaranteed) to approximate the requested schema.
    pub content: String,
    /// HTTP status of the successful call.
    pub status: u16,
    /// Total attempts made, including retries (1 = first try succeeded).
    pub attempts: u32,
}

/// A single metadata field value.
///
/// `Absent` is an explicit marker, not a missing key: every required field
/// appears in [`MedicalMetadata`] whether or not the document contained it.
/// Serialised untagged, so a record renders as plain JSON
/// (`"department": "Cardiology"`, `"diagnoses": [...]`, `"follow_up": null`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// A single extracted value.
    Text(String),
    /// A list-valued field (diagnoses, medications, ...).
    Items(Vec<serde_json::Value>),
    /// The document does not contain this field. Serialises as `null`.
    Absent,
}

impl FieldValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, FieldValue::Absent)
            || matches!(self, FieldValue::Text(t) if t == ABSENT_MARKER)
            || matches!(self, FieldValue::Items(v) if v.is_empty())
    }
}

/// The validated metadata record: a mapping from every field in the fixed
/// contract (see [`crate::prompts`]) to its value.
///
/// Invariant: every required field key is present; absent values carry
/// [`FieldValue::Absent`] rather than being omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicalMetadata {
    pub fields: BTreeMap<String, FieldValue>,
}

impl MedicalMetadata {
    /// A record with every required field explicitly absent.
    ///
    /// The starting point for validation, and the terminal value for an
    /// empty document the service had nothing to say about.
    pub fn all_absent() -> Self {
        let mut fields = BTreeMap::new();
        for name in required_fields() {
            let value = if REQUIRED_LIST_FIELDS.contains(&name) {
                FieldValue::Items(Vec::new())
            } else {
                FieldValue::Absent
            };
            fields.insert(name.to_string(), value);
        }
        Self { fields }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Number of fields with a real (non-absent) value.
    pub fn present_fields(&self) -> usize {
        self.fields.values().filter(|v| !v.is_absent()).count()
    }

    /// Fraction of the contract the document populated, 0.0–1.0.
    pub fn completeness(&self) -> f64 {
        if self.fields.is_empty() {
            return 0.0;
        }
        self.present_fields() as f64 / self.fields.len() as f64
    }
}

/// Processing diagnostics for one pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisStats {
    /// Pages in the source document.
    pub total_pages: usize,
    /// 0-based indices of pages that fell back to OCR.
    pub pages_used_ocr: BTreeSet<usize>,
    /// Page-level warnings, in the order they were recorded.
    pub warnings: Vec<String>,
    /// Attempts the analysis client made (including retries).
    pub request_attempts: u32,
    /// True when the response only parsed via best-effort recovery.
    pub recovered: bool,
    /// Wall-clock time spent extracting text (direct + OCR).
    pub extract_duration_ms: u64,
    /// Wall-clock time spent on the analysis service call (incl. retries).
    pub analysis_duration_ms: u64,
    /// Total pipeline wall-clock time.
    pub total_duration_ms: u64,
}

/// The terminal, presentation-facing artifact of one `analyze` call.
/// Produced once, immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// The assembled document text and per-page extraction record.
    pub document: DocumentText,
    /// The validated metadata record.
    pub metadata: MedicalMetadata,
    /// Diagnostics: OCR pages, warnings, timings.
    pub stats: AnalysisStats,
}
