//! # medmeta
//!
//! Extract validated structured metadata from medical PDF documents.
//!
//! The pipeline reads each page's native text layer, falls back to OCR for
//! scanned or image-only pages, sends the assembled document to an LLM
//! analysis service, and validates the reply against a fixed metadata
//! contract (document type, date, department, diagnoses, medications, ...).
//!
//! ```text
//! path / URL / bytes
//!        │
//!        ▼
//!  input resolution ──► per-page direct text ──► OCR fallback (tesseract)
//!                                │                      │
//!                                └──────┬───────────────┘
//!                                       ▼
//!                              document assembly
//!                                       │
//!                                       ▼
//!                        analysis service (with retries)
//!                                       │
//!                                       ▼
//!                       parse + validate ──► AnalysisResult
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use medmeta::{analyze, AnalyzerConfig};
//!
//! # async fn run() -> Result<(), medmeta::AnalyzeError> {
//! let config = AnalyzerConfig::builder()
//!     .api_key(std::env::var("OPENROUTER_API_KEY").unwrap_or_default())
//!     .build()?;
//!
//! let result = analyze("discharge_summary.pdf", &config).await?;
//! for (field, value) in &result.metadata.fields {
//!     println!("{field}: {value:?}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Page-level extraction problems never abort an analysis — they are
//! reported in [`AnalysisStats::warnings`] and the affected pages simply
//! contribute less text. Fatal conditions (unreadable input, rejected
//! credential, uninterpretable reply) surface as [`AnalyzeError`].

pub mod analyze;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

pub use analyze::{analyze, analyze_document, analyze_from_bytes, analyze_sync, analyze_to_file};
pub use config::{AnalyzerConfig, AnalyzerConfigBuilder, RetryPolicy};
pub use error::{AnalyzeError, ExtractionWarning};
pub use output::{
    AnalysisResponse, AnalysisResult, AnalysisStats, DocumentText, ExtractionMethod, FieldValue,
    MedicalMetadata, PageText,
};
pub use pipeline::client::{AnalysisTransport, TransportFailure};
pub use pipeline::ocr::{OcrEngine, TesseractCli};
pub use pipeline::parse::ParseOutcome;
pub use progress::{AnalysisProgressCallback, NoopProgressCallback, ProgressCallback};
