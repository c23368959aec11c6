/// Span/event field keys for delivery reporting.
/// Keep these stable; changing them is a breaking change for dashboards.
pub const KEY_CHANNEL: &str = "rapida.channel";
pub const KEY_RAPIDA_ID: &str = "rapida.id";
pub const KEY_PROVIDER: &str = "llm.provider";
pub const KEY_ENDPOINT: &str = "http.url";
pub const KEY_STATUS: &str = "http.status";
pub const KEY_LATENCY_MS: &str = "latency.ms";

/// Error-related (if applicable)
pub const KEY_ERROR_KIND: &str = "error.kind";
pub const KEY_ERROR_MESSAGE: &str = "error.message";

/// Channel names used in reports.
pub const CHANNEL_LOG: &str = "log";
pub const CHANNEL_FEEDBACK: &str = "feedback";
pub const CHANNEL_RUNS: &str = "runs";
