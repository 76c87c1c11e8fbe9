//! CLI binary for medmeta.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `AnalyzerConfig` and prints the metadata record.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use medmeta::{
    analyze, analyze_to_file, AnalysisProgressCallback, AnalyzerConfig, ProgressCallback,
    RetryPolicy,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar over pages, with per-page log
/// lines distinguishing direct extraction from OCR fallback.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    /// Create a callback whose progress-bar length is set dynamically by
    /// `on_analysis_start` (called once the PDF is open).
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_analysis_start

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Extracting");
    }
}

impl AnalysisProgressCallback for CliProgressCallback {
    fn on_analysis_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Analyzing {total_pages} pages…"))
        ));
    }

    fn on_page_extracted(&self, page_index: usize, total: usize, used_ocr: bool) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            green("✓"),
            page_index + 1,
            total,
            if used_ocr { dim("ocr") } else { dim("direct") },
        ));
        self.bar.inc(1);
    }

    fn on_request_attempt(&self, attempt: u32, max_attempts: u32) {
        self.bar.set_prefix("Analyzing");
        self.bar
            .set_message(format!("service attempt {attempt}/{max_attempts}"));
    }

    fn on_analysis_complete(&self, present_fields: usize, total_fields: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} of {} metadata fields extracted",
            green("✔"),
            bold(&present_fields.to_string()),
            total_fields
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyze a local document (metadata JSON to stdout)
  medmeta discharge_summary.pdf

  # Write the metadata record to a file
  medmeta discharge_summary.pdf -o metadata.json

  # Full result: metadata plus extracted text and diagnostics
  medmeta --full lab_report.pdf -o result.json

  # Analyze from URL
  medmeta https://example.org/records/summary.pdf

  # Scanned document: higher DPI, German OCR
  medmeta --dpi 400 --ocr-lang deu scan.pdf

  # Different model, no retries
  medmeta --model anthropic/claude-3.5-haiku --max-retries 0 report.pdf

ENVIRONMENT VARIABLES:
  OPENROUTER_API_KEY      Analysis service API key (required)
  PDFIUM_LIB_PATH         Path to an existing libpdfium build
  RUST_LOG                Tracing filter (overrides -v/-q)

SETUP:
  1. Install tesseract:   apt install tesseract-ocr  (or brew install tesseract)
  2. Set API key:         export OPENROUTER_API_KEY=sk-or-...
  3. Analyze:             medmeta document.pdf -o metadata.json
"#;

/// Extract structured metadata from medical PDF documents.
#[derive(Parser, Debug)]
#[command(
    name = "medmeta",
    version,
    about = "Extract structured metadata from medical PDF documents",
    long_about = "Extract validated, structured metadata (document type, date, department, \
diagnoses, medications, lab results, ...) from medical PDF documents. Reads the native text \
layer per page, falls back to OCR for scanned pages, and analyzes the text with an LLM.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Write the JSON result to this file instead of stdout.
    #[arg(short, long, env = "MEDMETA_OUTPUT")]
    output: Option<PathBuf>,

    /// Analysis service API key.
    #[arg(long, env = "OPENROUTER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Model ID sent to the analysis service.
    #[arg(long, env = "MEDMETA_MODEL")]
    model: Option<String>,

    /// Base URL of the analysis service.
    #[arg(long, env = "MEDMETA_API_BASE_URL")]
    api_base_url: Option<String>,

    /// OCR rasterization DPI (72–600).
    #[arg(long, env = "MEDMETA_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// OCR language (tesseract language code, e.g. eng, deu, fra).
    #[arg(long, env = "MEDMETA_OCR_LANG", default_value = "eng")]
    ocr_lang: String,

    /// Minimum characters of native text for a page to skip OCR.
    #[arg(long, env = "MEDMETA_MIN_DIRECT_CHARS", default_value_t = 100)]
    min_direct_chars: usize,

    /// Concurrent OCR workers.
    #[arg(short = 'w', long, env = "MEDMETA_PAGE_WORKERS", default_value_t = 4)]
    page_workers: usize,

    /// Retries on transient analysis-service failure.
    #[arg(long, env = "MEDMETA_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Max tokens the analysis service may generate.
    #[arg(long, env = "MEDMETA_MAX_TOKENS", default_value_t = 6000)]
    max_tokens: usize,

    /// Analysis sampling temperature (0.0–2.0).
    #[arg(long, env = "MEDMETA_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Path to a text file with a custom analysis instruction.
    #[arg(long, env = "MEDMETA_INSTRUCTION")]
    instruction: Option<PathBuf>,

    /// Analysis request timeout in seconds.
    #[arg(long, env = "MEDMETA_API_TIMEOUT", default_value_t = 30)]
    api_timeout: u64,

    /// HTTP download timeout in seconds (URL inputs).
    #[arg(long, env = "MEDMETA_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Output the full result (document text + stats), not just metadata.
    #[arg(long, env = "MEDMETA_FULL")]
    full: bool,

    /// Disable progress bar.
    #[arg(long, env = "MEDMETA_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MEDMETA_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the result.
    #[arg(short, long, env = "MEDMETA_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn AnalysisProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;

    // ── Run analysis ─────────────────────────────────────────────────────
    let result = match (&cli.output, cli.full) {
        (Some(path), true) => analyze_to_file(&cli.input, path, &config)
            .await
            .context("Analysis failed")?,
        _ => analyze(&cli.input, &config).await.context("Analysis failed")?,
    };

    if let Some(ref output_path) = cli.output {
        if !cli.full {
            let json = serde_json::to_string_pretty(&result.metadata.fields)
                .context("Failed to serialise metadata")?;
            tokio::fs::write(output_path, &json)
                .await
                .with_context(|| format!("Failed to write {:?}", output_path))?;
        }
        if !cli.quiet {
            eprintln!(
                "{}  {} pages ({} via OCR)  {}ms  →  {}",
                green("✔"),
                result.stats.total_pages,
                result.stats.pages_used_ocr.len(),
                result.stats.total_duration_ms,
                bold(&output_path.display().to_string()),
            );
        }
    } else {
        let json = if cli.full {
            serde_json::to_string_pretty(&result).context("Failed to serialise result")?
        } else {
            serde_json::to_string_pretty(&result.metadata.fields)
                .context("Failed to serialise metadata")?
        };
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(json.as_bytes())
            .context("Failed to write to stdout")?;
        handle.write_all(b"\n").ok();

        if !cli.quiet && !show_progress {
            eprintln!(
                "Analyzed {} pages ({} via OCR) in {}ms",
                result.stats.total_pages,
                result.stats.pages_used_ocr.len(),
                result.stats.total_duration_ms
            );
        }
    }

    if !cli.quiet {
        for warning in &result.stats.warnings {
            eprintln!("  {} {}", dim("⚠"), dim(warning));
        }
    }

    Ok(())
}

/// Map CLI args to `AnalyzerConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<AnalyzerConfig> {
    let instruction = if let Some(ref path) = cli.instruction {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read instruction from {:?}", path))?,
        )
    } else {
        None
    };

    let mut builder = AnalyzerConfig::builder()
        .ocr_dpi(cli.dpi)
        .ocr_language(&cli.ocr_lang)
        .min_direct_chars(cli.min_direct_chars)
        .page_workers(cli.page_workers)
        .retry(RetryPolicy {
            max_retries: cli.max_retries,
            ..RetryPolicy::default()
        })
        .max_response_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref url) = cli.api_base_url {
        builder = builder.api_base_url(url);
    }
    if let Some(text) = instruction {
        builder = builder.instruction(text);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
