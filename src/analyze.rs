//! Pipeline coordinator: the top-level `analyze*` entry points.
//!
//! Wires the stages together — input resolution, extraction with OCR
//! fallback, the analysis-service call, parsing and validation — and
//! assembles the [`AnalysisResult`] with timings and warnings.

use crate::config::AnalyzerConfig;
use crate::error::{AnalyzeError, ExtractionWarning};
use crate::output::{AnalysisResult, AnalysisStats, DocumentText, MedicalMetadata};
use crate::pipeline::{assemble, client::AnalysisClient, input, ocr, parse};
use crate::prompts::{build_user_message, DEFAULT_INSTRUCTION};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Analyze a medical PDF given a local path or an HTTP(S) URL.
///
/// This is the main entry point. Returns the assembled document text, the
/// validated metadata record, and processing diagnostics.
///
/// # Example
/// ```rust,no_run
/// use medmeta::{analyze, AnalyzerConfig};
///
/// # async fn run() -> Result<(), medmeta::AnalyzeError> {
/// let config = AnalyzerConfig::builder().api_key("sk-or-...").build()?;
/// let result = analyze("discharge_summary.pdf", &config).await?;
/// println!("{}", serde_json::to_string_pretty(&result.metadata).unwrap());
/// # Ok(())
/// # }
/// ```
pub async fn analyze(input: &str, config: &AnalyzerConfig) -> Result<AnalysisResult, AnalyzeError> {
    let total_start = Instant::now();

    let resolved = input::resolve_input(input, config.download_timeout_secs).await?;
    extract_and_analyze(resolved, config, total_start).await
}

/// Analyze a PDF already held in memory.
pub async fn analyze_from_bytes(
    bytes: &[u8],
    config: &AnalyzerConfig,
) -> Result<AnalysisResult, AnalyzeError> {
    let total_start = Instant::now();

    let resolved = input::resolve_bytes(bytes)?;
    extract_and_analyze(resolved, config, total_start).await
}

/// Analyze pre-assembled document text, skipping PDF extraction.
///
/// Useful when the text was produced elsewhere, and the seam integration
/// tests use to exercise the analysis stages without a PDF on disk.
pub async fn analyze_document(
    document: DocumentText,
    config: &AnalyzerConfig,
) -> Result<AnalysisResult, AnalyzeError> {
    run_analysis(document, Vec::new(), 0, Instant::now(), config).await
}

/// Analyze a PDF and write the full result as pretty JSON to `output_path`.
pub async fn analyze_to_file(
    input: &str,
    output_path: &std::path::Path,
    config: &AnalyzerConfig,
) -> Result<AnalysisResult, AnalyzeError> {
    let result = analyze(input, config).await?;

    let json = serde_json::to_string_pretty(&result)
        .map_err(|e| AnalyzeError::Internal(format!("Result serialisation failed: {e}")))?;
    tokio::fs::write(output_path, json)
        .await
        .map_err(|source| AnalyzeError::OutputWriteFailed {
            path: output_path.to_path_buf(),
            source,
        })?;

    Ok(result)
}

/// Blocking wrapper around [`analyze`] for non-async callers.
pub fn analyze_sync(input: &str, config: &AnalyzerConfig) -> Result<AnalysisResult, AnalyzeError> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| AnalyzeError::Internal(format!("Failed to create runtime: {e}")))?;
    runtime.block_on(analyze(input, config))
}

async fn extract_and_analyze(
    resolved: input::ResolvedInput,
    config: &AnalyzerConfig,
    total_start: Instant,
) -> Result<AnalysisResult, AnalyzeError> {
    let engine: Arc<dyn ocr::OcrEngine> = match &config.ocr_engine {
        Some(e) => Arc::clone(e),
        None => Arc::new(ocr::TesseractCli::default()),
    };

    let extract_start = Instant::now();
    let assembled = assemble::assemble_document(resolved.path(), config, &engine).await?;
    let extract_ms = extract_start.elapsed().as_millis() as u64;

    info!(
        "Extraction finished: {} pages ({} via OCR) in {}ms",
        assembled.document.page_count(),
        assembled.document.pages_used_ocr.len(),
        extract_ms
    );

    run_analysis(
        assembled.document,
        assembled.warnings,
        extract_ms,
        total_start,
        config,
    )
    .await
}

async fn run_analysis(
    document: DocumentText,
    extraction_warnings: Vec<ExtractionWarning>,
    extract_ms: u64,
    total_start: Instant,
    config: &AnalyzerConfig,
) -> Result<AnalysisResult, AnalyzeError> {
    let mut warnings: Vec<String> = extraction_warnings.iter().map(|w| w.to_string()).collect();

    // A document with no recoverable text gets a deterministic all-absent
    // record; there is nothing for the service to extract from. This covers
    // both zero-page documents and documents where every page's extraction
    // came back empty (the assembled text still carries page markers, so
    // the raw text alone cannot decide this).
    if !document.has_recoverable_text() {
        warn!("Document contains no extractable text; reporting all fields absent");
        let metadata = MedicalMetadata::all_absent();
        if let Some(cb) = &config.progress_callback {
            cb.on_analysis_complete(0, metadata.fields.len());
        }
        let stats = AnalysisStats {
            total_pages: document.page_count(),
            pages_used_ocr: document.pages_used_ocr.clone(),
            warnings,
            request_attempts: 0,
            recovered: false,
            extract_duration_ms: extract_ms,
            analysis_duration_ms: 0,
            total_duration_ms: total_start.elapsed().as_millis() as u64,
        };
        return Ok(AnalysisResult {
            document,
            metadata,
            stats,
        });
    }

    let client = AnalysisClient::from_config(config)?;
    let instruction = config.instruction.as_deref().unwrap_or(DEFAULT_INSTRUCTION);
    let message = build_user_message(instruction, &document.text);

    let analysis_start = Instant::now();
    let response = client
        .analyze_text(message, config.progress_callback.as_ref())
        .await?;
    let analysis_ms = analysis_start.elapsed().as_millis() as u64;

    info!(
        "Analysis service replied in {}ms after {} attempt(s)",
        analysis_ms, response.attempts
    );

    let (metadata, recovered) = match parse::parse_response(&response.content) {
        parse::ParseOutcome::Parsed { metadata, notes } => {
            for note in &notes {
                warn!("Field validation: {}", note);
            }
            warnings.extend(notes);
            (metadata, false)
        }
        parse::ParseOutcome::Recovered { metadata, notes } => {
            for note in &notes {
                warn!("Response recovery: {}", note);
            }
            warnings.extend(notes);
            (metadata, true)
        }
        parse::ParseOutcome::Unparseable { detail } => {
            return Err(AnalyzeError::Parse { detail });
        }
    };

    if let Some(cb) = &config.progress_callback {
        cb.on_analysis_complete(metadata.present_fields(), metadata.fields.len());
    }

    let stats = AnalysisStats {
        total_pages: document.page_count(),
        pages_used_ocr: document.pages_used_ocr.clone(),
        warnings,
        request_attempts: response.attempts,
        recovered,
        extract_duration_ms: extract_ms,
        analysis_duration_ms: analysis_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    Ok(AnalysisResult {
        document,
        metadata,
        stats,
    })
}
