//! Progress reporting for long-running analyses.
//!
//! A multi-page scanned document can spend minutes in OCR; callers (the CLI,
//! a service embedding the library) want to surface that. Implement
//! [`AnalysisProgressCallback`] and register it via
//! [`crate::config::AnalyzerConfigBuilder::progress_callback`].
//!
//! Callbacks are invoked inline from pipeline tasks, so implementations must
//! be cheap and non-blocking.

use std::sync::Arc;

/// Observer for pipeline progress events.
///
/// All methods have empty default implementations — implement only the
/// events you care about.
pub trait AnalysisProgressCallback: Send + Sync {
    /// The document was opened; extraction is about to begin.
    fn on_analysis_start(&self, _total_pages: usize) {}

    /// A page finished extraction (direct or OCR).
    fn on_page_extracted(&self, _page_index: usize, _total_pages: usize, _used_ocr: bool) {}

    /// An analysis-service request attempt is starting (1-based).
    fn on_request_attempt(&self, _attempt: u32, _max_attempts: u32) {}

    /// The pipeline finished; the metadata record is validated.
    fn on_analysis_complete(&self, _present_fields: usize, _total_fields: usize) {}
}

/// Shared handle to a progress callback.
pub type ProgressCallback = Arc<dyn AnalysisProgressCallback>;

/// A callback that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgressCallback;

impl AnalysisProgressCallback for NoopProgressCallback {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl AnalysisProgressCallback for Recorder {
        fn on_analysis_start(&self, total_pages: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("start:{total_pages}"));
        }

        fn on_page_extracted(&self, page_index: usize, _total: usize, used_ocr: bool) {
            self.events
                .lock()
                .unwrap()
                .push(format!("page:{page_index}:{used_ocr}"));
        }

        fn on_analysis_complete(&self, present: usize, total: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("done:{present}/{total}"));
        }
    }

    #[test]
    fn events_are_observed_in_order() {
        let recorder = Recorder::default();
        recorder.on_analysis_start(2);
        recorder.on_page_extracted(0, 2, false);
        recorder.on_page_extracted(1, 2, true);
        recorder.on_analysis_complete(5, 13);
        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec!["start:2", "page:0:false", "page:1:true", "done:5/13"]
        );
    }

    #[test]
    fn noop_callback_accepts_every_event() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_analysis_start(1);
        cb.on_request_attempt(1, 4);
        cb.on_analysis_complete(0, 13);
    }
}
