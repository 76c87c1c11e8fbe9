//! Input resolution: normalise a user-supplied path, URL, or byte buffer to
//! a local PDF file.
//!
//! ## Why download to a temp file?
//!
//! pdfium wants a file-system path. Downloading to a `TempDir` gives us a
//! path pdfium can open while ensuring cleanup happens automatically when
//! `ResolvedInput` is dropped, even if the process panics. We validate the
//! PDF magic bytes (`%PDF`) before returning so callers get a meaningful
//! error rather than a pdfium crash deep in the pipeline.

use crate::error::AnalyzeError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// The resolved input — a local path, a downloaded temp file, or an
/// in-memory buffer spilled to a temp file.
#[derive(Debug)]
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input was a URL or byte buffer; PDF written to a temp directory.
    /// The `TempDir` is kept alive to prevent cleanup until processing
    /// completes.
    Temp { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    /// Path to the PDF file regardless of how it was resolved.
    pub fn path(&self) -> &Path {
        match self {
            ResolvedInput::Local(p) => p,
            ResolvedInput::Temp { path, .. } => path,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to a local PDF file path.
///
/// URLs are downloaded to a temporary directory; local paths are validated
/// for existence, readability, and PDF magic bytes.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, AnalyzeError> {
    if input.trim().is_empty() {
        return Err(AnalyzeError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

/// Spill an in-memory PDF to a temp file pdfium can open.
pub fn resolve_bytes(bytes: &[u8]) -> Result<ResolvedInput, AnalyzeError> {
    let temp_dir = TempDir::new().map_err(|e| AnalyzeError::Internal(e.to_string()))?;
    let path = temp_dir.path().join("input.pdf");

    if bytes.len() >= 4 && &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        return Err(AnalyzeError::NotAPdf { path, magic });
    }

    std::fs::write(&path, bytes)
        .map_err(|e| AnalyzeError::Internal(format!("Failed to write temp file: {e}")))?;

    Ok(ResolvedInput::Temp {
        path,
        _temp_dir: temp_dir,
    })
}

fn resolve_local(path_str: &str) -> Result<ResolvedInput, AnalyzeError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(AnalyzeError::FileNotFound { path });
    }

    // Check read permission by attempting to open
    match std::fs::File::open(&path) {
        Ok(mut f) => {
            use std::io::Read;
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(AnalyzeError::NotAPdf { path, magic });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(AnalyzeError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(AnalyzeError::FileNotFound { path });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, AnalyzeError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AnalyzeError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            AnalyzeError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            AnalyzeError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(AnalyzeError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let filename = filename_from_url(url);

    let temp_dir = TempDir::new().map_err(|e| AnalyzeError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(&filename);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| AnalyzeError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    if bytes.len() >= 4 && &bytes[..4] != b"%PDF" {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);
        return Err(AnalyzeError::NotAPdf {
            path: file_path,
            magic,
        });
    }

    tokio::fs::write(&file_path, &bytes)
        .await
        .map_err(|e| AnalyzeError::Internal(format!("Failed to write temp file: {e}")))?;

    info!("Downloaded to: {}", file_path.display());

    Ok(ResolvedInput::Temp {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Extract a reasonable filename from the URL path, defaulting otherwise.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    "downloaded.pdf".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/report.pdf"));
        assert!(is_url("http://example.com/report.pdf"));
        assert!(!is_url("/tmp/report.pdf"));
        assert!(!is_url("report.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url("https://example.com/records/summary.pdf"),
            "summary.pdf"
        );
        assert_eq!(filename_from_url("https://example.com/"), "downloaded.pdf");
    }

    #[tokio::test]
    async fn empty_input_is_invalid() {
        let err = resolve_input("   ", 10).await.unwrap_err();
        assert!(matches!(err, AnalyzeError::InvalidInput { .. }));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = resolve_local("/nonexistent/record.pdf").unwrap_err();
        assert!(matches!(err, AnalyzeError::FileNotFound { .. }));
    }

    #[test]
    fn non_pdf_magic_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"PK\x03\x04 definitely a zip").unwrap();
        let err = resolve_local(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, AnalyzeError::NotAPdf { .. }));
    }

    #[test]
    fn pdf_magic_is_accepted() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"%PDF-1.7\n...").unwrap();
        let resolved = resolve_local(file.path().to_str().unwrap()).unwrap();
        assert_eq!(resolved.path(), file.path());
        assert!(format!("{resolved:?}").contains("Local"));
    }

    #[test]
    fn bytes_input_spills_to_temp_pdf() {
        let resolved = resolve_bytes(b"%PDF-1.4 tiny").unwrap();
        assert!(resolved.path().exists());
        assert!(matches!(resolved, ResolvedInput::Temp { .. }));
    }

    #[test]
    fn bytes_input_rejects_non_pdf() {
        let err = resolve_bytes(b"<html>nope</html>").unwrap_err();
        assert!(matches!(err, AnalyzeError::NotAPdf { .. }));
    }
}
