//! Error types for the medmeta library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`AnalyzeError`] — **Fatal**: the analysis cannot produce a result at
//!   all (bad input file, credential rejected, response not interpretable).
//!   Returned as `Err(AnalyzeError)` from the top-level `analyze*` functions.
//!
//! * [`ExtractionWarning`] — **Non-fatal**: a single page's text recovery
//!   degraded or failed (direct parse error, rasterization glitch, OCR engine
//!   failure). Recorded in [`crate::output::AnalysisStats::warnings`] so
//!   callers can inspect partial extraction rather than losing the whole
//!   document to one bad page.
//!
//! The separation enforces the propagation policy: page-level issues never
//! abort the pipeline, while document-level transport, auth, and parse
//! failures terminate it with a typed, human-readable cause.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the medmeta library.
///
/// Page-level degradation uses [`ExtractionWarning`] and is stored in
/// [`crate::output::AnalysisStats`] rather than propagated here.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be opened at all.
    ///
    /// Per-page parse failures are NOT this error — they degrade to
    /// [`ExtractionWarning::DirectFailed`] and extraction continues.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    // ── Analysis service errors ───────────────────────────────────────────
    /// Network, timeout, or server-side failure calling the analysis
    /// service, after the retry policy was exhausted.
    #[error("Analysis service unreachable after {attempts} attempt(s): {detail}")]
    Transport { attempts: u32, detail: String },

    /// Credential rejected by the analysis service (401/403).
    /// Never retried — a second attempt with the same key cannot succeed.
    #[error("Analysis service rejected the API credential: {detail}\nCheck OPENROUTER_API_KEY.")]
    Auth { detail: String },

    /// The service responded, but its payload could not be interpreted as
    /// structured metadata even with best-effort recovery.
    ///
    /// Deliberately distinct from [`AnalyzeError::Transport`]: the document
    /// was read but not understood, versus the service being unreachable.
    #[error("Analysis response could not be parsed as metadata: {detail}")]
    Parse { detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy, or install\n\
a pdfium build from bblanchon/pdfium-binaries."
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AnalyzeError {
    /// True when this error came from the analysis service boundary
    /// (as opposed to input handling or response interpretation).
    pub fn is_transport(&self) -> bool {
        matches!(self, AnalyzeError::Transport { .. } | AnalyzeError::Auth { .. })
    }
}

/// A non-fatal, page-level extraction problem.
///
/// Stored in [`crate::output::AnalysisStats::warnings`]. The pipeline always
/// continues past these; the affected page simply contributes less (or no)
/// text to the assembled document.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ExtractionWarning {
    /// Direct text extraction raised for this page; OCR was attempted instead.
    #[error("Page {page}: direct text extraction failed: {detail}")]
    DirectFailed { page: usize, detail: String },

    /// Rasterization failed, so OCR could not run; page contributes no text.
    #[error("Page {page}: rasterization failed: {detail}")]
    RasterFailed { page: usize, detail: String },

    /// The OCR engine failed or returned nothing usable for this page.
    #[error("Page {page}: OCR failed: {detail}")]
    OcrFailed { page: usize, detail: String },
}

impl ExtractionWarning {
    /// 0-based index of the affected page.
    pub fn page(&self) -> usize {
        match self {
            ExtractionWarning::DirectFailed { page, .. }
            | ExtractionWarning::RasterFailed { page, .. }
            | ExtractionWarning::OcrFailed { page, .. } => *page,
        }
    }
}
