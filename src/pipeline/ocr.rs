//! OCR fallback: recognize text from rasterized page images.
//!
//! The engine is a trait so tests can substitute a deterministic fake and
//! embedders can plug in a different recognizer. The default implementation
//! shells out to the `tesseract` CLI, which keeps the crate free of C
//! library bindings and works with any stock tesseract install.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

/// A text recognizer for page images.
///
/// Errors are reported as a plain detail string; the assembler converts
/// them into page-level warnings, never fatal errors.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Recognize text from a PNG-encoded page image.
    async fn recognize(&self, png: &[u8], language: &str) -> Result<String, String>;
}

/// OCR via the `tesseract` command-line binary.
///
/// Invoked as `tesseract <image> stdout -l <lang> --psm 6`; PSM 6 ("assume
/// a single uniform block of text") suits full-page scans of documents.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: PathBuf,
    psm: u8,
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("tesseract"),
            psm: 6,
        }
    }
}

impl TesseractCli {
    /// Use a non-PATH tesseract binary.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl OcrEngine for TesseractCli {
    async fn recognize(&self, png: &[u8], language: &str) -> Result<String, String> {
        // tesseract reads from a file, so spill the image to a temp dir that
        // cleans itself up when dropped.
        let temp_dir = tempfile::tempdir().map_err(|e| format!("tempdir: {e}"))?;
        let image_path = temp_dir.path().join("page.png");
        tokio::fs::write(&image_path, png)
            .await
            .map_err(|e| format!("write temp image: {e}"))?;

        debug!(
            "Running {} on {} ({} bytes, lang={})",
            self.binary.display(),
            image_path.display(),
            png.len(),
            language
        );

        let output = Command::new(&self.binary)
            .arg(&image_path)
            .arg("stdout")
            .arg("-l")
            .arg(language)
            .arg("--psm")
            .arg(self.psm.to_string())
            .output()
            .await
            .map_err(|e| format!("failed to launch {}: {e}", self.binary.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
