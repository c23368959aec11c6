//! Operator-facing reporting for log and feedback deliveries.
//! Every attempt is logged through `tracing`; a [`TelemetrySink`] installed
//! via `set_telemetry_sink` additionally receives a structured report.

pub mod keys;
pub mod types;
#[cfg(test)]
pub mod test_span;

pub use keys::*;
pub use types::*;

use std::sync::Arc;

use once_cell::sync::OnceCell;

/// Implement this to receive delivery reports.
///
/// Requirements:
/// - Implementations must be thread-safe (`Send + Sync`) and `'static`.
/// - `record` **may** be called from any thread; implementations should avoid panicking.
pub trait TelemetrySink: Send + Sync + 'static {
    fn record(&self, report: DeliveryReport);
}

static TELEMETRY_SINK: OnceCell<Arc<dyn TelemetrySink>> = OnceCell::new();

// In tests, gate emission to only the calling test thread to avoid cross-test interference.
#[cfg(test)]
thread_local! {
    static TEST_CAPTURE: std::cell::Cell<bool> = const { std::cell::Cell::new(false) };
}

/// Install a global telemetry sink. Returns `false` if a sink is already installed.
///
/// This is a write-once global for the process lifetime (backed by `OnceCell`).
pub fn set_telemetry_sink(sink: Arc<dyn TelemetrySink>) -> bool {
    TELEMETRY_SINK.set(sink).is_ok()
}

/// Log the report and hand it to the sink, if one is installed.
///
/// In tests, the sink only sees reports while capture is enabled for the
/// current thread via `test_set_capture_enabled`.
pub(crate) fn report(report: DeliveryReport) {
    match report.outcome {
        DeliveryOutcome::Delivered => tracing::debug!(
            channel = %report.channel,
            rapida.id = report.rapida_id.as_deref().unwrap_or(""),
            http.status = report.status.unwrap_or_default(),
            "rapida delivery complete"
        ),
        _ => tracing::warn!(
            channel = %report.channel,
            outcome = ?report.outcome,
            rapida.id = report.rapida_id.as_deref().unwrap_or(""),
            http.url = report.endpoint.as_deref().unwrap_or(""),
            http.status = report.status.unwrap_or_default(),
            error.kind = report.error_kind.as_deref().unwrap_or(""),
            error.message = report.error_message.as_deref().unwrap_or(""),
            "rapida delivery did not succeed"
        ),
    }

    #[cfg(test)]
    {
        if !TEST_CAPTURE.with(|c| c.get()) {
            return;
        }
    }
    if let Some(sink) = TELEMETRY_SINK.get() {
        sink.record(report);
    }
}

#[cfg(test)]
/// Test-only helper: enable or disable capture for the current test thread.
pub fn test_set_capture_enabled(enabled: bool) {
    TEST_CAPTURE.with(|c| c.set(enabled));
}

#[cfg(test)]
pub(crate) mod test_sink {
    //! Shared capturing sink for tests across modules.

    use super::*;
    use once_cell::sync::Lazy;
    use std::sync::Mutex;

    pub static REPORTS: Lazy<Mutex<Vec<DeliveryReport>>> = Lazy::new(|| Mutex::new(Vec::new()));

    struct CaptureSink;
    impl TelemetrySink for CaptureSink {
        fn record(&self, report: DeliveryReport) {
            REPORTS.lock().unwrap().push(report);
        }
    }

    /// Install the capturing sink and enable capture on this thread.
    pub fn capture() {
        let _ = set_telemetry_sink(Arc::new(CaptureSink));
        test_set_capture_enabled(true);
    }

    pub fn reports_for(rapida_id: &str) -> Vec<DeliveryReport> {
        REPORTS
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.rapida_id.as_deref() == Some(rapida_id))
            .cloned()
            .collect()
    }

    pub fn reports_for_provider(tag: &str) -> Vec<DeliveryReport> {
        REPORTS
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.provider.as_deref() == Some(tag))
            .cloned()
            .collect()
    }
}
