//! Feedback submission: attaches a positive/negative rating, or a named and
//! optionally typed metric, to a logged call identified by its correlation id.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use reqwest::Url;
use secrecy::SecretString;
use serde::Serialize;
use serde_json::Value;
use tracing::Instrument;

use crate::callback::{self, ResponseHook};
use crate::config::{self, RapidaConfig};
use crate::error::{CoreResult, RapidaError};
use crate::headers::AUTH;
use crate::http_client::{DeliveredResponse, HttpClient};
use crate::telemetry::{self, CHANNEL_FEEDBACK, DeliveryOutcome, DeliveryReport};

pub const FEEDBACK_PATH: &str = "/v1/feedback";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rating {
    Positive,
    Negative,
}

impl From<Rating> for bool {
    fn from(r: Rating) -> bool {
        matches!(r, Rating::Positive)
    }
}

impl From<bool> for Rating {
    fn from(b: bool) -> Self {
        if b { Rating::Positive } else { Rating::Negative }
    }
}

/// Wire body of a feedback event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedbackEvent<'a> {
    #[serde(rename = "rapida-id")]
    pub rapida_id: &'a str,
    pub rating: bool,
}

/// Declared type of a named feedback value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackDataType {
    String,
    Boolean,
    Numerical,
    Categorical,
}

impl FromStr for FeedbackDataType {
    type Err = RapidaError;

    /// Accepts the canonical names and their common aliases, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "str" | "string" => Ok(Self::String),
            "bool" | "boolean" => Ok(Self::Boolean),
            "float" | "int" | "numerical" => Ok(Self::Numerical),
            "object" | "categorical" => Ok(Self::Categorical),
            other => Err(RapidaError::Configuration(format!(
                "invalid feedback data type '{other}'"
            ))),
        }
    }
}

/// Named feedback: an arbitrary metric attached to a logged call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedFeedback<'a> {
    #[serde(rename = "rapida-id")]
    pub rapida_id: &'a str,
    pub name: &'a str,
    pub value: Value,
    #[serde(rename = "data-type", skip_serializing_if = "Option::is_none")]
    pub data_type: Option<FeedbackDataType>,
}

/// Feedback endpoint: the base URL with its path replaced by `/v1/feedback`.
pub fn feedback_url(base_url: &str) -> CoreResult<String> {
    let mut url = Url::parse(base_url)
        .map_err(|e| RapidaError::Configuration(format!("invalid base url '{base_url}': {e}")))?;
    url.set_path(FEEDBACK_PATH);
    Ok(url.to_string())
}

#[derive(Clone)]
pub struct FeedbackClient {
    http: HttpClient,
    base_url: Option<String>,
    api_key: Option<SecretString>,
    on_feedback: Option<Arc<dyn ResponseHook>>,
}

impl FeedbackClient {
    pub fn new(cfg: &RapidaConfig, http: HttpClient) -> Self {
        Self {
            http,
            base_url: cfg.base_url.clone(),
            api_key: cfg.api_key.clone(),
            on_feedback: None,
        }
    }

    pub fn with_on_feedback(mut self, hook: Option<Arc<dyn ResponseHook>>) -> Self {
        self.on_feedback = hook;
        self
    }

    pub async fn log_rating(&self, rapida_id: &str, rating: Rating) -> Option<DeliveredResponse> {
        self.log_feedback(rapida_id, rating.into()).await
    }

    /// Submit one rating. Any HTTP answer, even an error status, is handed to
    /// `on_feedback` exactly once and returned; transport failures are
    /// reported and yield `None`.
    pub async fn log_feedback(&self, rapida_id: &str, rating: bool) -> Option<DeliveredResponse> {
        let span = tracing::info_span!(
            "rapida.feedback",
            rapida.id = rapida_id,
            rating,
            http.status = tracing::field::Empty,
        );
        let event = FeedbackEvent { rapida_id, rating };
        self.submit(rapida_id, &event).instrument(span).await
    }

    /// Submit a named metric such as `"helpfulness" = 4`. Same delivery
    /// rules as [`FeedbackClient::log_feedback`].
    pub async fn log_named_feedback(
        &self,
        rapida_id: &str,
        name: &str,
        value: impl Into<Value>,
        data_type: Option<FeedbackDataType>,
    ) -> Option<DeliveredResponse> {
        let span = tracing::info_span!(
            "rapida.feedback",
            rapida.id = rapida_id,
            feedback.name = name,
            http.status = tracing::field::Empty,
        );
        let event = NamedFeedback {
            rapida_id,
            name,
            value: value.into(),
            data_type,
        };
        self.submit(rapida_id, &event).instrument(span).await
    }

    async fn submit<B: Serialize + ?Sized>(
        &self,
        rapida_id: &str,
        event: &B,
    ) -> Option<DeliveredResponse> {
        let base = DeliveryReport::new(CHANNEL_FEEDBACK, DeliveryOutcome::Skipped).rapida_id(rapida_id);

        let url = match self.base_url.as_deref() {
            None => Err(RapidaError::Configuration(
                "base url is not configured".into(),
            )),
            Some(b) => feedback_url(b),
        };
        let url = match url {
            Ok(url) => url,
            Err(err) => {
                telemetry::report(base.error(&err));
                return None;
            }
        };

        let auth = config::bearer(self.api_key.as_ref());
        let started = Instant::now();
        let result = self
            .http
            .post_raw(CHANNEL_FEEDBACK, &url, event, &[(AUTH, auth.as_str())])
            .await;
        let latency = started.elapsed().as_millis() as u64;

        let response = match result {
            Ok(resp) => resp,
            Err(err) => {
                telemetry::report(
                    DeliveryReport {
                        outcome: DeliveryOutcome::Failed,
                        ..base
                    }
                    .endpoint_opt(Some(&url))
                    .latency_ms(latency)
                    .error(&err),
                );
                return None;
            }
        };

        let status = response.status.as_u16();
        tracing::Span::current().record("http.status", status);
        let outcome = if response.is_ok() {
            DeliveryOutcome::Delivered
        } else {
            DeliveryOutcome::Rejected
        };
        telemetry::report(
            DeliveryReport { outcome, ..base }
                .endpoint_opt(Some(&url))
                .status(status)
                .latency_ms(latency),
        );

        if let Some(hook) = &self.on_feedback {
            callback::invoke(hook.as_ref(), CHANNEL_FEEDBACK, response.clone()).await;
        }
        Some(response)
    }
}

impl fmt::Debug for FeedbackClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedbackClient")
            .field("base_url", &self.base_url)
            .field("on_feedback", &self.on_feedback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::test_sink;
    use httpmock::Method::POST;
    use httpmock::MockServer;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_client(cfg: &RapidaConfig) -> (Arc<AtomicUsize>, FeedbackClient) {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let hook: Arc<dyn ResponseHook> = Arc::new(move |_r: DeliveredResponse| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });
        let client =
            FeedbackClient::new(cfg, HttpClient::new_default().unwrap()).with_on_feedback(Some(hook));
        (calls, client)
    }

    #[test]
    fn feedback_url_replaces_path() {
        assert_eq!(
            feedback_url("https://api.rapida.example/v1").unwrap(),
            "https://api.rapida.example/v1/feedback"
        );
        assert_eq!(
            feedback_url("https://api.rapida.example").unwrap(),
            "https://api.rapida.example/v1/feedback"
        );
        assert!(feedback_url("::nope::").is_err());
    }

    #[test]
    fn rating_maps_to_bool() {
        assert!(bool::from(Rating::Positive));
        assert!(!bool::from(Rating::Negative));
        assert_eq!(Rating::from(true), Rating::Positive);
    }

    #[test]
    fn event_serializes_with_hyphenated_id() {
        let v = serde_json::to_value(FeedbackEvent {
            rapida_id: "abc",
            rating: false,
        })
        .unwrap();
        assert_eq!(v, json!({"rapida-id": "abc", "rating": false}));
    }

    #[tokio::test]
    async fn posts_rating_and_invokes_callback_once() {
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/feedback")
                .header("rapida-auth", "Bearer test-key")
                .json_body(json!({"rapida-id": "req-42", "rating": true}));
            then.status(200).body("{}");
        });

        let cfg = RapidaConfig::new(server.base_url(), "test-key");
        let (calls, client) = counting_client(&cfg);
        let resp = client.log_feedback("req-42", true).await.expect("response");

        m.assert();
        assert_eq!(resp.status.as_u16(), 200);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn data_type_aliases_normalize() {
        assert_eq!("STR".parse::<FeedbackDataType>().unwrap(), FeedbackDataType::String);
        assert_eq!("bool".parse::<FeedbackDataType>().unwrap(), FeedbackDataType::Boolean);
        assert_eq!("int".parse::<FeedbackDataType>().unwrap(), FeedbackDataType::Numerical);
        assert_eq!("object".parse::<FeedbackDataType>().unwrap(), FeedbackDataType::Categorical);
        assert!(matches!(
            "date".parse::<FeedbackDataType>(),
            Err(RapidaError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn named_feedback_posts_name_value_and_type() {
        let server = MockServer::start();
        let typed = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/feedback")
                .header("rapida-auth", "Bearer test-key")
                .json_body(json!({
                    "rapida-id": "req-named",
                    "name": "helpfulness",
                    "value": 4,
                    "data-type": "numerical"
                }));
            then.status(200).body("{}");
        });
        let untyped = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/feedback")
                .json_body(json!({"rapida-id": "req-named", "name": "note", "value": "terse"}));
            then.status(200).body("{}");
        });

        let cfg = RapidaConfig::new(server.base_url(), "test-key");
        let (calls, client) = counting_client(&cfg);
        client
            .log_named_feedback("req-named", "helpfulness", 4, Some(FeedbackDataType::Numerical))
            .await
            .expect("typed response");
        client
            .log_named_feedback("req-named", "note", "terse", None)
            .await
            .expect("untyped response");

        typed.assert();
        untyped.assert();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn error_status_is_reported_and_callback_still_runs() {
        test_sink::capture();
        let server = MockServer::start();
        let m = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/feedback")
                .json_body(json!({"rapida-id": "req-500", "rating": false}));
            then.status(500).body("nope");
        });

        let cfg = RapidaConfig::new(server.base_url(), "test-key");
        let (calls, client) = counting_client(&cfg);
        let resp = client
            .log_rating("req-500", Rating::Negative)
            .await
            .expect("response");

        m.assert();
        assert_eq!(resp.body, "nope");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let reports = test_sink::reports_for("req-500");
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].outcome, DeliveryOutcome::Rejected);
        assert_eq!(reports[0].status, Some(500));
    }

    #[tokio::test]
    async fn network_failure_returns_none_without_callback() {
        test_sink::capture();
        let cfg = RapidaConfig::new("http://127.0.0.1:9", "k");
        let (calls, client) = counting_client(&cfg);
        assert!(client.log_feedback("req-net", true).await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let reports = test_sink::reports_for("req-net");
        assert_eq!(reports[0].outcome, DeliveryOutcome::Failed);
    }

    #[tokio::test]
    async fn missing_base_url_is_skipped() {
        test_sink::capture();
        let (calls, client) = counting_client(&RapidaConfig::default());
        assert!(client.log_feedback("req-nobase", true).await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let reports = test_sink::reports_for("req-nobase");
        assert_eq!(reports[0].outcome, DeliveryOutcome::Skipped);
    }
}
