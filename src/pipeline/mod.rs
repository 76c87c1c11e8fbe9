//! The extraction-and-analysis pipeline, decomposed into stages:
//!
//! ```text
//! input:    path/URL → validated local PDF file
//! render:   PDF → per-page direct text + rasterized images (pdfium)
//! ocr:      rasterized page image → recognized text (tesseract)
//! assemble: per-page results → ordered DocumentText with OCR fallback
//! client:   document text → raw analysis-service response (with retries)
//! parse:    raw response → validated MedicalMetadata
//! ```
//!
//! Each stage is independently testable; the coordinator in
//! [`crate::analyze`] wires them together.

pub mod assemble;
pub mod client;
pub mod input;
pub mod ocr;
pub mod parse;
pub mod render;
