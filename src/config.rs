//! Configuration types for the extraction-and-analysis pipeline.
//!
//! All pipeline behaviour is controlled through [`AnalyzerConfig`], built via
//! its [`AnalyzerConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share configs across threads and to diff two runs to understand
//! why their outputs differ.
//!
//! Credentials and timeouts are injected here at construction, never read
//! from ambient global state inside the pipeline — the only env lookup lives
//! in the CLI binary. Retry and worker-cap behaviour are explicit policy
//! values so tests can exercise edge policies (zero retries, single worker)
//! deterministically.

use crate::error::AnalyzeError;
use crate::pipeline::client::AnalysisTransport;
use crate::pipeline::ocr::OcrEngine;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Retry policy for transient analysis-service failures.
///
/// The delay doubles after each attempt (500 ms → 1 s → 2 s by default),
/// avoiding the thundering-herd problem where concurrent clients retry
/// simultaneously against a recovering endpoint. Auth and other permanent
/// failures bypass this policy entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt. 0 means exactly one attempt.
    pub max_retries: u32,
    /// Initial backoff; doubles per retry.
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 500,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries. Useful in tests and for callers that
    /// do their own retrying.
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: 0,
        }
    }

    /// Backoff before retry number `retry` (1-based).
    pub fn delay_before(&self, retry: u32) -> Duration {
        debug_assert!(retry >= 1);
        Duration::from_millis(self.backoff_ms.saturating_mul(1u64 << (retry - 1).min(16)))
    }

    /// Total attempts this policy allows.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

/// Configuration for a document analysis.
///
/// Built via [`AnalyzerConfig::builder()`] or [`AnalyzerConfig::default()`].
///
/// # Example
/// ```rust
/// use medmeta::AnalyzerConfig;
///
/// let config = AnalyzerConfig::builder()
///     .api_key("sk-or-...")
///     .ocr_dpi(300)
///     .page_workers(2)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct AnalyzerConfig {
    /// A page's direct extraction is usable when its trimmed text exceeds
    /// this many characters. Must be nonzero: a page with only whitespace
    /// or a handful of stray characters from embedded fonts is treated as
    /// a scanned page and falls back to OCR. Default: 100.
    pub min_direct_chars: usize,

    /// Rasterization DPI for OCR fallback. Range: 72–600. Default: 300.
    ///
    /// Higher DPI improves recognition on small print at higher CPU and
    /// memory cost per page. 300 is the usual OCR sweet spot.
    pub ocr_dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels.
    /// Default: 4000.
    ///
    /// A safety cap independent of DPI: a 300-DPI render of an oversized
    /// page could otherwise exhaust memory. Either dimension is capped,
    /// scaling the other proportionally.
    pub max_rendered_pixels: u32,

    /// Language hint forwarded to the OCR engine. Default: "eng".
    pub ocr_language: String,

    /// Worker cap for concurrent OCR of fallback pages. Default: 4.
    ///
    /// Rasterized page images are large; this bounds how many are alive at
    /// once. Results are always joined in page-index order regardless of
    /// completion order.
    pub page_workers: usize,

    /// Retry policy for transient analysis-service failures.
    pub retry: RetryPolicy,

    /// API credential for the analysis service. Required unless a custom
    /// `transport` is injected.
    pub api_key: Option<String>,

    /// Base URL of the analysis service. Default: OpenRouter.
    pub api_base_url: String,

    /// Model identifier sent with each request.
    pub model: String,

    /// Maximum tokens the service may generate. Default: 6000.
    ///
    /// The full metadata record for a dense discharge summary can exceed
    /// 4000 output tokens; too low a cap truncates the JSON mid-object and
    /// forces the parser into recovery.
    pub max_response_tokens: usize,

    /// Sampling temperature. Default: 0.1 — extraction wants determinism,
    /// not creativity.
    pub temperature: f32,

    /// Per-call timeout for the analysis request in seconds. Default: 30.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Custom instruction text. If None, uses
    /// [`crate::prompts::DEFAULT_INSTRUCTION`]. Overriding changes only the
    /// prose sent to the model; the validated field contract stays fixed.
    pub instruction: Option<String>,

    /// Pre-constructed analysis transport. Takes precedence over the
    /// HTTP transport built from `api_key`/`api_base_url`. Lets tests and
    /// embedders inject fakes or middleware.
    pub transport: Option<Arc<dyn AnalysisTransport>>,

    /// OCR engine. If None, uses the tesseract CLI engine.
    pub ocr_engine: Option<Arc<dyn OcrEngine>>,

    /// Optional progress callback for per-page and per-attempt events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            min_direct_chars: 100,
            ocr_dpi: 300,
            max_rendered_pixels: 4000,
            ocr_language: "eng".to_string(),
            page_workers: 4,
            retry: RetryPolicy::default(),
            api_key: None,
            api_base_url: "https://openrouter.ai/api/v1".to_string(),
            model: "meta-llama/llama-3.1-8b-instruct".to_string(),
            max_response_tokens: 6000,
            temperature: 0.1,
            api_timeout_secs: 30,
            download_timeout_secs: 120,
            instruction: None,
            transport: None,
            ocr_engine: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnalyzerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerConfig")
            .field("min_direct_chars", &self.min_direct_chars)
            .field("ocr_dpi", &self.ocr_dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("ocr_language", &self.ocr_language)
            .field("page_workers", &self.page_workers)
            .field("retry", &self.retry)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_base_url", &self.api_base_url)
            .field("model", &self.model)
            .field("max_response_tokens", &self.max_response_tokens)
            .field("temperature", &self.temperature)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("transport", &self.transport.as_ref().map(|_| "<dyn AnalysisTransport>"))
            .field("ocr_engine", &self.ocr_engine.as_ref().map(|_| "<dyn OcrEngine>"))
            .finish()
    }
}

impl AnalyzerConfig {
    /// Create a new builder for `AnalyzerConfig`.
    pub fn builder() -> AnalyzerConfigBuilder {
        AnalyzerConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AnalyzerConfig`].
#[derive(Debug)]
pub struct AnalyzerConfigBuilder {
    config: AnalyzerConfig,
}

impl AnalyzerConfigBuilder {
    pub fn min_direct_chars(mut self, n: usize) -> Self {
        self.config.min_direct_chars = n.max(1);
        self
    }

    pub fn ocr_dpi(mut self, dpi: u32) -> Self {
        self.config.ocr_dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn page_workers(mut self, n: usize) -> Self {
        self.config.page_workers = n.max(1);
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn max_response_tokens(mut self, n: usize) -> Self {
        self.config.max_response_tokens = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn instruction(mut self, text: impl Into<String>) -> Self {
        self.config.instruction = Some(text.into());
        self
    }

    pub fn transport(mut self, transport: Arc<dyn AnalysisTransport>) -> Self {
        self.config.transport = Some(transport);
        self
    }

    pub fn ocr_engine(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.config.ocr_engine = Some(engine);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalyzerConfig, AnalyzeError> {
        let c = &self.config;
        if c.min_direct_chars == 0 {
            return Err(AnalyzeError::InvalidConfig(
                "min_direct_chars must be ≥ 1 (a zero threshold would never trigger OCR)".into(),
            ));
        }
        if c.ocr_dpi < 72 || c.ocr_dpi > 600 {
            return Err(AnalyzeError::InvalidConfig(format!(
                "OCR DPI must be 72–600, got {}",
                c.ocr_dpi
            )));
        }
        if c.page_workers == 0 {
            return Err(AnalyzeError::InvalidConfig("page_workers must be ≥ 1".into()));
        }
        if c.api_key.is_none() && c.transport.is_none() {
            return Err(AnalyzeError::InvalidConfig(
                "an API key (or a custom transport) is required".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_clamps_out_of_range_values() {
        let config = AnalyzerConfig::builder()
            .api_key("k")
            .ocr_dpi(9999)
            .page_workers(0)
            .min_direct_chars(0)
            .build()
            .unwrap();
        assert_eq!(config.ocr_dpi, 600);
        assert_eq!(config.page_workers, 1);
        assert_eq!(config.min_direct_chars, 1);
    }

    #[test]
    fn build_requires_credential_or_transport() {
        let err = AnalyzerConfig::builder().build().unwrap_err();
        assert!(matches!(err, AnalyzeError::InvalidConfig(_)));
    }

    #[test]
    fn retry_policy_backoff_doubles() {
        let p = RetryPolicy {
            max_retries: 3,
            backoff_ms: 500,
        };
        assert_eq!(p.delay_before(1), Duration::from_millis(500));
        assert_eq!(p.delay_before(2), Duration::from_millis(1000));
        assert_eq!(p.delay_before(3), Duration::from_millis(2000));
        assert_eq!(p.max_attempts(), 4);
    }

    #[test]
    fn zero_retry_policy_means_single_attempt() {
        assert_eq!(RetryPolicy::none().max_attempts(), 1);
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AnalyzerConfig::builder()
            .api_key("super-secret")
            .build()
            .unwrap();
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("super-secret"));
        assert!(dbg.contains("<redacted>"));
    }
}
