use serde::{Deserialize, Serialize};

/// How a single log or feedback delivery attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// The backend answered with a 2xx/3xx status.
    Delivered,
    /// The backend answered, but with a 4xx/5xx status.
    Rejected,
    /// No request was sent (unsupported provider, missing/malformed base URL).
    Skipped,
    /// The request was sent but never got an answer.
    Failed,
}

/// Operator-facing report of one delivery attempt. Emitted for every
/// attempt; never returned to the primary call path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    /// `log` or `feedback`.
    pub channel: String,
    pub outcome: DeliveryOutcome,

    /// Correlation id of the record or feedback event.
    pub rapida_id: Option<String>,

    /// Provider tag for log deliveries, e.g. "openai", "custom-model".
    pub provider: Option<String>,

    /// Resolved endpoint, when resolution got that far.
    pub endpoint: Option<String>,

    /// HTTP status returned by the backend.
    pub status: Option<u16>,

    pub latency_ms: Option<u64>,

    /// Optional error metadata, if applicable.
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
}

impl DeliveryReport {
    pub fn new(channel: &str, outcome: DeliveryOutcome) -> Self {
        Self {
            channel: channel.to_string(),
            outcome,
            rapida_id: None,
            provider: None,
            endpoint: None,
            status: None,
            latency_ms: None,
            error_kind: None,
            error_message: None,
        }
    }

    pub fn rapida_id(mut self, id: &str) -> Self {
        self.rapida_id = Some(id.to_string());
        self
    }
    pub fn provider(mut self, provider: &str) -> Self {
        self.provider = Some(provider.to_string());
        self
    }
    pub fn endpoint_opt(mut self, url: Option<&str>) -> Self {
        self.endpoint = url.map(|s| s.to_string());
        self
    }
    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
    pub fn latency_ms(mut self, ms: u64) -> Self {
        self.latency_ms = Some(ms);
        self
    }
    pub fn error(mut self, err: &crate::error::RapidaError) -> Self {
        self.error_kind = Some(err.kind().to_string());
        self.error_message = Some(err.to_string());
        self
    }
}
