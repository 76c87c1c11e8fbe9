//! Integration tests for the analysis pipeline, driven through the public
//! API with a scripted transport so no network or PDF rendering stack is
//! needed.
//!
//! A live end-to-end test against a real PDF and the real analysis service
//! runs only when E2E_ENABLED=1 (plus OPENROUTER_API_KEY and
//! MEDMETA_E2E_PDF) is set, mirroring how CI separates hermetic from
//! networked runs.

use async_trait::async_trait;
use medmeta::pipeline::client::{AnalysisRequest, TransportFailure, TransportReply};
use medmeta::{
    analyze_document, AnalysisProgressCallback, AnalysisTransport, AnalyzeError, AnalyzerConfig,
    DocumentText, ExtractionMethod, FieldValue, PageText, RetryPolicy,
};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

// ── Helpers ──────────────────────────────────────────────────────────────

fn sample_document() -> DocumentText {
    let pages = vec![
        PageText {
            index: 0,
            text: "DISCHARGE SUMMARY\nDepartment of Cardiology\nChief complaint: chest pain"
                .to_string(),
            method: ExtractionMethod::Direct,
            usable: true,
        },
        PageText {
            index: 1,
            text: "Medications: aspirin 81mg daily".to_string(),
            method: ExtractionMethod::Ocr,
            usable: false,
        },
    ];
    let text = pages
        .iter()
        .map(|p| format!("[Page {}]\n{}", p.index + 1, p.text))
        .collect::<Vec<_>>()
        .join("\n\n");
    DocumentText {
        text,
        pages,
        pages_used_ocr: BTreeSet::from([1]),
    }
}

fn sample_reply() -> String {
    serde_json::json!({
        "document_type": "discharge summary",
        "document_date": "2024-03-15",
        "department": "Cardiology",
        "chief_complaint": "chest pain",
        "follow_up": "N/A",
        "analysis_confidence": "high",
        "diagnoses": ["NSTEMI"],
        "medications": ["aspirin 81mg"],
        "procedures": [],
        "lab_results": [],
        "allergies": [],
        "key_findings": ["elevated troponin"],
        "recommendations": ["cardiology follow-up in 2 weeks"]
    })
    .to_string()
}

/// Transport that fails `failures` times with the given failure, then
/// replies with `reply`.
struct ScriptedTransport {
    calls: AtomicU32,
    failures: u32,
    failure: fn() -> TransportFailure,
    reply: String,
}

impl ScriptedTransport {
    fn succeeding(reply: String) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            failures: 0,
            failure: || unreachable!(),
            reply,
        })
    }

    fn flaky(failures: u32, reply: String) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            failures,
            failure: || TransportFailure::Transient {
                detail: "connection reset by peer".into(),
            },
            reply,
        })
    }

    fn auth_rejecting() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            failures: u32::MAX,
            failure: || TransportFailure::Auth {
                detail: "HTTP 401: invalid key".into(),
            },
            reply: String::new(),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisTransport for ScriptedTransport {
    async fn send(&self, _request: &AnalysisRequest) -> Result<TransportReply, TransportFailure> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err((self.failure)())
        } else {
            Ok(TransportReply {
                content: self.reply.clone(),
                status: 200,
            })
        }
    }
}

fn config_with(transport: Arc<ScriptedTransport>, retry: RetryPolicy) -> AnalyzerConfig {
    AnalyzerConfig::builder()
        .transport(transport)
        .retry(retry)
        .build()
        .expect("test config must build")
}

fn fast_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        backoff_ms: 1,
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn clean_reply_produces_validated_metadata() {
    let transport = ScriptedTransport::succeeding(sample_reply());
    let config = config_with(Arc::clone(&transport), fast_retry(3));

    let result = analyze_document(sample_document(), &config).await.unwrap();

    assert_eq!(
        result.metadata.get("department"),
        Some(&FieldValue::Text("Cardiology".into()))
    );
    assert_eq!(
        result.metadata.get("diagnoses"),
        Some(&FieldValue::Items(vec![serde_json::json!("NSTEMI")]))
    );
    assert!(result.metadata.get("follow_up").unwrap().is_absent());
    assert_eq!(result.stats.request_attempts, 1);
    assert!(!result.stats.recovered);
    assert_eq!(result.stats.total_pages, 2);
    assert_eq!(result.stats.pages_used_ocr, BTreeSet::from([1]));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn transient_failures_retry_until_success() {
    let transport = ScriptedTransport::flaky(2, sample_reply());
    let config = config_with(Arc::clone(&transport), fast_retry(3));

    let result = analyze_document(sample_document(), &config).await.unwrap();

    assert_eq!(result.stats.request_attempts, 3);
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn exhausted_retries_fail_with_transport_error() {
    let transport = ScriptedTransport::flaky(u32::MAX, String::new());
    let config = config_with(Arc::clone(&transport), fast_retry(2));

    let err = analyze_document(sample_document(), &config).await.unwrap_err();

    match err {
        AnalyzeError::Transport { attempts, detail } => {
            assert_eq!(attempts, 3);
            assert!(detail.contains("connection reset"));
        }
        other => panic!("expected Transport, got {other:?}"),
    }
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn auth_rejection_aborts_without_retry() {
    let transport = ScriptedTransport::auth_rejecting();
    let config = config_with(Arc::clone(&transport), fast_retry(5));

    let err = analyze_document(sample_document(), &config).await.unwrap_err();

    assert!(matches!(err, AnalyzeError::Auth { .. }));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn zero_retry_policy_makes_one_attempt() {
    let transport = ScriptedTransport::flaky(1, sample_reply());
    let config = config_with(Arc::clone(&transport), RetryPolicy::none());

    let err = analyze_document(sample_document(), &config).await.unwrap_err();

    assert!(matches!(err, AnalyzeError::Transport { attempts: 1, .. }));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn commentary_wrapped_reply_is_recovered() {
    let reply = format!("Here is the metadata you asked for:\n\n{}", sample_reply());
    let transport = ScriptedTransport::succeeding(reply);
    let config = config_with(transport, fast_retry(0));

    let result = analyze_document(sample_document(), &config).await.unwrap();

    assert!(result.stats.recovered);
    assert!(result
        .stats
        .warnings
        .iter()
        .any(|w| w.contains("commentary")));
    assert_eq!(
        result.metadata.get("document_type"),
        Some(&FieldValue::Text("discharge summary".into()))
    );
}

#[tokio::test]
async fn unparseable_reply_is_a_parse_error_not_transport() {
    let transport = ScriptedTransport::succeeding("I cannot help with that.".into());
    let config = config_with(Arc::clone(&transport), fast_retry(3));

    let err = analyze_document(sample_document(), &config).await.unwrap_err();

    assert!(matches!(err, AnalyzeError::Parse { .. }));
    // A parse failure is not a transport failure: no retries.
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn empty_document_completes_with_all_fields_absent() {
    let transport = ScriptedTransport::succeeding(sample_reply());
    let config = config_with(Arc::clone(&transport), fast_retry(3));

    let result = analyze_document(DocumentText::empty(), &config)
        .await
        .unwrap();

    assert_eq!(result.metadata.present_fields(), 0);
    assert_eq!(result.stats.request_attempts, 0);
    // Nothing to analyze, so the service is never contacted.
    assert_eq!(transport.calls(), 0);
}

#[tokio::test]
async fn all_failed_extraction_completes_without_service_call() {
    // Every page's extraction came back empty, so the assembled text is
    // page markers only. The result must be a deterministic all-absent
    // record with no service round-trip.
    let pages: Vec<PageText> = (0..2)
        .map(|index| PageText {
            index,
            text: String::new(),
            method: ExtractionMethod::Ocr,
            usable: false,
        })
        .collect();
    let document = DocumentText {
        text: "[Page 1]\n\n\n[Page 2]\n".to_string(),
        pages,
        pages_used_ocr: BTreeSet::from([0, 1]),
    };

    let transport = ScriptedTransport::succeeding(sample_reply());
    let config = config_with(Arc::clone(&transport), fast_retry(3));

    let result = analyze_document(document, &config).await.unwrap();

    assert_eq!(transport.calls(), 0);
    assert_eq!(result.metadata.present_fields(), 0);
    assert_eq!(result.stats.request_attempts, 0);
    assert_eq!(result.stats.total_pages, 2);
}

#[tokio::test]
async fn identifier_fields_in_reply_are_dropped() {
    let reply = serde_json::json!({
        "department": "Oncology",
        "patient_name": "Jane Doe",
        "date_of_birth": "1970-01-01",
        "diagnoses": ["anemia"]
    })
    .to_string();
    let transport = ScriptedTransport::succeeding(reply);
    let config = config_with(transport, fast_retry(0));

    let result = analyze_document(sample_document(), &config).await.unwrap();

    assert!(result.metadata.get("patient_name").is_none());
    assert!(result.metadata.get("date_of_birth").is_none());
    assert_eq!(result.metadata.present_fields(), 2);
    // Dropped fields are reported even though the reply parsed cleanly.
    assert!(!result.stats.recovered);
    assert!(result
        .stats
        .warnings
        .iter()
        .any(|w| w.contains("patient_name")));
}

#[tokio::test]
async fn progress_callback_sees_attempts_and_completion() {
    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl AnalysisProgressCallback for Recorder {
        fn on_request_attempt(&self, attempt: u32, max: u32) {
            self.events
                .lock()
                .unwrap()
                .push(format!("attempt:{attempt}/{max}"));
        }

        fn on_analysis_complete(&self, present: usize, total: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("done:{present}/{total}"));
        }
    }

    let recorder = Arc::new(Recorder::default());
    let transport = ScriptedTransport::flaky(1, sample_reply());
    let config = AnalyzerConfig::builder()
        .transport(transport)
        .retry(fast_retry(2))
        .progress_callback(Arc::clone(&recorder) as Arc<dyn AnalysisProgressCallback>)
        .build()
        .unwrap();

    analyze_document(sample_document(), &config).await.unwrap();

    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(events[0], "attempt:1/3");
    assert_eq!(events[1], "attempt:2/3");
    assert!(events[2].starts_with("done:"));
}

// ── Live end-to-end (opt-in) ─────────────────────────────────────────────

fn e2e_enabled() -> bool {
    std::env::var("E2E_ENABLED").map(|v| v == "1").unwrap_or(false)
        && std::env::var("OPENROUTER_API_KEY").is_ok()
}

#[tokio::test]
async fn e2e_analyze_real_pdf() {
    if !e2e_enabled() {
        eprintln!("skipping: set E2E_ENABLED=1, OPENROUTER_API_KEY and MEDMETA_E2E_PDF");
        return;
    }
    let Ok(pdf) = std::env::var("MEDMETA_E2E_PDF") else {
        eprintln!("skipping: MEDMETA_E2E_PDF not set");
        return;
    };

    let config = AnalyzerConfig::builder()
        .api_key(std::env::var("OPENROUTER_API_KEY").unwrap())
        .build()
        .unwrap();

    let result = medmeta::analyze(&pdf, &config).await.unwrap();

    assert!(result.stats.total_pages > 0);
    assert!(result.metadata.get("document_type").is_some());
    eprintln!(
        "e2e: {} pages, {} fields present, {}ms",
        result.stats.total_pages,
        result.metadata.present_fields(),
        result.stats.total_duration_ms
    );
}
