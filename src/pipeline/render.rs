//! PDF access: per-page direct text extraction and page rasterisation for
//! OCR fallback, both via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async
//! contexts. `tokio::task::spawn_blocking` moves the work onto a dedicated
//! thread-pool thread, preventing the Tokio worker threads from stalling
//! during CPU-heavy text extraction and rendering.
//!
//! ## Why cap pixels, not just DPI?
//!
//! Page sizes vary wildly: an A0 poster at 300 DPI would produce a
//! 10,000 × 14,000 px image. `max_rendered_pixels` caps the longest edge
//! regardless of physical size, keeping memory per in-flight page bounded.

use crate::error::{AnalyzeError, ExtractionWarning};
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info, warn};

/// Direct extraction result for one page. `usable` records whether the
/// trimmed text met the configured character threshold.
#[derive(Debug, Clone)]
pub struct DirectPage {
    pub index: usize,
    pub text: String,
    pub usable: bool,
}

/// The whole document's direct-extraction pass.
#[derive(Debug, Clone)]
pub struct DirectExtraction {
    pub total_pages: usize,
    pub pages: Vec<DirectPage>,
    pub warnings: Vec<ExtractionWarning>,
}

impl DirectExtraction {
    /// Indices of pages whose direct text was not usable, ascending.
    pub fn fallback_indices(&self) -> Vec<usize> {
        self.pages
            .iter()
            .filter(|p| !p.usable)
            .map(|p| p.index)
            .collect()
    }
}

/// A page rendered to a PNG for the OCR engine, or the warning explaining
/// why it could not be.
pub type RenderedPage = (usize, Result<Vec<u8>, ExtractionWarning>);

/// Extract the native text layer of every page.
///
/// A page whose direct extraction raises does not abort the document — it
/// is recorded as a warning and marked unusable so OCR picks it up.
pub async fn extract_direct_text(
    pdf_path: &Path,
    min_direct_chars: usize,
) -> Result<DirectExtraction, AnalyzeError> {
    let path = pdf_path.to_path_buf();

    tokio::task::spawn_blocking(move || extract_direct_text_blocking(&path, min_direct_chars))
        .await
        .map_err(|e| AnalyzeError::Internal(format!("Extraction task panicked: {e}")))?
}

/// Bind to a pdfium library, honouring `PDFIUM_LIB_PATH` when set.
fn bind_pdfium() -> Result<Pdfium, AnalyzeError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&path)),
        Err(_) => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| AnalyzeError::PdfiumBindingFailed(e.to_string()))?;
    Ok(Pdfium::new(bindings))
}

fn extract_direct_text_blocking(
    pdf_path: &Path,
    min_direct_chars: usize,
) -> Result<DirectExtraction, AnalyzeError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| AnalyzeError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: format!("{e:?}"),
        })?;

    let doc_pages = document.pages();
    let total_pages = doc_pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let mut pages = Vec::with_capacity(total_pages);
    let mut warnings = Vec::new();

    for (index, page) in doc_pages.iter().enumerate() {
        match page.text() {
            Ok(text_page) => {
                let text = text_page.all();
                let usable = text.trim().chars().count() > min_direct_chars;
                debug!(
                    "Page {}: {} chars, usable={}",
                    index + 1,
                    text.trim().chars().count(),
                    usable
                );
                pages.push(DirectPage { index, text, usable });
            }
            Err(e) => {
                warn!("Page {}: direct extraction failed: {:?}", index + 1, e);
                warnings.push(ExtractionWarning::DirectFailed {
                    page: index,
                    detail: format!("{e:?}"),
                });
                pages.push(DirectPage {
                    index,
                    text: String::new(),
                    usable: false,
                });
            }
        }
    }

    Ok(DirectExtraction {
        total_pages,
        pages,
        warnings,
    })
}

/// Rasterise the given pages to PNGs for OCR.
///
/// Runs one `spawn_blocking` pass for the whole chunk; per-page render
/// failures are returned in place rather than aborting the chunk.
pub async fn rasterize_pages(
    pdf_path: &Path,
    page_indices: &[usize],
    dpi: u32,
    max_pixels: u32,
) -> Result<Vec<RenderedPage>, AnalyzeError> {
    let path = pdf_path.to_path_buf();
    let indices = page_indices.to_vec();

    tokio::task::spawn_blocking(move || rasterize_pages_blocking(&path, &indices, dpi, max_pixels))
        .await
        .map_err(|e| AnalyzeError::Internal(format!("Render task panicked: {e}")))?
}

fn rasterize_pages_blocking(
    pdf_path: &Path,
    page_indices: &[usize],
    dpi: u32,
    max_pixels: u32,
) -> Result<Vec<RenderedPage>, AnalyzeError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| AnalyzeError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: format!("{e:?}"),
        })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;

    let mut results = Vec::with_capacity(page_indices.len());

    for &idx in page_indices {
        if idx >= total_pages {
            results.push((
                idx,
                Err(ExtractionWarning::RasterFailed {
                    page: idx,
                    detail: format!("page index out of range (total={total_pages})"),
                }),
            ));
            continue;
        }

        let rendered = render_one(&pages, idx, dpi, max_pixels);
        if let Err(ref w) = rendered {
            warn!("{}", w);
        }
        results.push((idx, rendered));
    }

    Ok(results)
}

fn render_one(
    pages: &PdfPages<'_>,
    idx: usize,
    dpi: u32,
    max_pixels: u32,
) -> Result<Vec<u8>, ExtractionWarning> {
    let raster_warning = |detail: String| ExtractionWarning::RasterFailed { page: idx, detail };

    let page = pages
        .get(idx as u16)
        .map_err(|e| raster_warning(format!("{e:?}")))?;

    // Page dimensions are in points (1/72 inch); scale to the requested DPI
    // and cap the longest edge.
    let width_px = (page.width().value * dpi as f32 / 72.0).round() as u32;
    let target_width = width_px.clamp(1, max_pixels);

    let render_config = PdfRenderConfig::new()
        .set_target_width(target_width as i32)
        .set_maximum_height(max_pixels as i32);

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| raster_warning(format!("{e:?}")))?;

    let image = bitmap.as_image();
    debug!(
        "Rendered page {} → {}x{} px",
        idx + 1,
        image.width(),
        image.height()
    );

    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| raster_warning(format!("PNG encoding failed: {e}")))?;

    Ok(png)
}
