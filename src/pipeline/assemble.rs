//! Document assembly: run direct extraction, OCR the pages that need it,
//! and merge everything into an ordered [`DocumentText`].
//!
//! ## Concurrency shape
//!
//! Fallback pages are processed in chunks of `page_workers`. Each chunk is
//! rasterized in a single blocking pass (pdfium holds per-document state
//! that must stay on one thread), then the chunk's images are OCR'd
//! concurrently. This bounds the number of rasterized images alive at once
//! to the worker cap while still overlapping the OCR work. Results are
//! merged strictly in page-index order, so output never depends on which
//! OCR task finished first.

use crate::config::AnalyzerConfig;
use crate::error::{AnalyzeError, ExtractionWarning};
use crate::output::{DocumentText, ExtractionMethod, PageText};
use crate::pipeline::ocr::OcrEngine;
use crate::pipeline::render::{self, DirectPage};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// The assembled document plus everything that went wrong along the way.
#[derive(Debug)]
pub struct AssembledDocument {
    pub document: DocumentText,
    pub warnings: Vec<ExtractionWarning>,
}

/// Extract every page of `pdf_path`, falling back to OCR where direct
/// extraction is unusable, and assemble the ordered document text.
///
/// Page-level failures degrade to warnings; only an unopenable document is
/// fatal.
pub async fn assemble_document(
    pdf_path: &Path,
    config: &AnalyzerConfig,
    engine: &Arc<dyn OcrEngine>,
) -> Result<AssembledDocument, AnalyzeError> {
    let mut direct = render::extract_direct_text(pdf_path, config.min_direct_chars).await?;
    let total_pages = direct.total_pages;

    if let Some(cb) = &config.progress_callback {
        cb.on_analysis_start(total_pages);
    }

    if total_pages == 0 {
        info!("Document has no pages; proceeding with empty text");
        return Ok(AssembledDocument {
            document: DocumentText::empty(),
            warnings: direct.warnings,
        });
    }

    let fallback = direct.fallback_indices();
    let mut warnings = std::mem::take(&mut direct.warnings);
    info!(
        "Direct extraction: {}/{} pages usable, {} falling back to OCR",
        total_pages - fallback.len(),
        total_pages,
        fallback.len()
    );

    if let Some(cb) = &config.progress_callback {
        for page in direct.pages.iter().filter(|p| p.usable) {
            cb.on_page_extracted(page.index, total_pages, false);
        }
    }

    let mut ocr_texts: BTreeMap<usize, String> = BTreeMap::new();

    for chunk in fallback.chunks(config.page_workers.max(1)) {
        let rendered =
            render::rasterize_pages(pdf_path, chunk, config.ocr_dpi, config.max_rendered_pixels)
                .await?;

        let mut tasks = Vec::with_capacity(rendered.len());
        for (idx, png_result) in rendered {
            match png_result {
                Ok(png) => {
                    let engine = Arc::clone(engine);
                    let language = config.ocr_language.clone();
                    tasks.push(async move {
                        let outcome = engine.recognize(&png, &language).await;
                        (idx, outcome)
                    });
                }
                Err(warning) => warnings.push(warning),
            }
        }

        for (idx, outcome) in futures::future::join_all(tasks).await {
            match outcome {
                Ok(text) => {
                    if text.trim().is_empty() {
                        warnings.push(ExtractionWarning::OcrFailed {
                            page: idx,
                            detail: "engine returned no text".into(),
                        });
                    } else {
                        debug!("Page {}: OCR recovered {} chars", idx + 1, text.trim().len());
                    }
                    ocr_texts.insert(idx, text);
                }
                Err(detail) => {
                    warnings.push(ExtractionWarning::OcrFailed { page: idx, detail });
                }
            }
            if let Some(cb) = &config.progress_callback {
                cb.on_page_extracted(idx, total_pages, true);
            }
        }
    }

    let document = merge_pages(direct.pages, &ocr_texts);
    Ok(AssembledDocument { document, warnings })
}

/// Merge direct and OCR page results into the final document, index
/// ascending. Pure, so tests can exercise the merge without a PDF.
///
/// Every page occupies its slot even when it contributed no text, keeping
/// page numbering in the assembled text aligned with the source document.
pub fn merge_pages(
    direct_pages: Vec<DirectPage>,
    ocr_texts: &BTreeMap<usize, String>,
) -> DocumentText {
    let mut pages = Vec::with_capacity(direct_pages.len());
    let mut pages_used_ocr = BTreeSet::new();

    for page in direct_pages {
        if page.usable {
            pages.push(PageText {
                index: page.index,
                text: page.text,
                method: ExtractionMethod::Direct,
                usable: true,
            });
        } else {
            let text = ocr_texts.get(&page.index).cloned().unwrap_or_default();
            pages_used_ocr.insert(page.index);
            pages.push(PageText {
                index: page.index,
                text,
                method: ExtractionMethod::Ocr,
                usable: false,
            });
        }
    }

    let text = pages
        .iter()
        .map(|p| format!("[Page {}]\n{}", p.index + 1, p.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n");

    DocumentText {
        text,
        pages,
        pages_used_ocr,
    }
}
