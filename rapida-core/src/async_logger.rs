//! Best-effort shipment of [`LogRecord`]s to the provider-specific logging
//! endpoint. Nothing in here returns an error to the caller: failures are
//! reported through [`crate::telemetry`] and the call yields `None`.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use reqwest::Url;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::callback::{self, ResponseHook};
use crate::config::{self, RapidaConfig};
use crate::error::{CoreResult, RapidaError};
use crate::http_client::{DeliveredResponse, HttpClient};
use crate::log_record::LogRecord;
use crate::telemetry::{self, CHANNEL_LOG, DeliveryOutcome, DeliveryReport};

/// Upstream LLM backend a record was produced by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    #[serde(rename = "openai")]
    OpenAI,
    #[serde(rename = "azure-openai")]
    AzureOpenAI,
    Anthropic,
    CustomModel,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAI => "openai",
            Self::AzureOpenAI => "azure-openai",
            Self::Anthropic => "anthropic",
            Self::CustomModel => "custom-model",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = RapidaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai" => Ok(Self::OpenAI),
            "azure-openai" => Ok(Self::AzureOpenAI),
            "anthropic" => Ok(Self::Anthropic),
            "custom-model" => Ok(Self::CustomModel),
            other => Err(RapidaError::Configuration(format!(
                "provider '{other}' not supported"
            ))),
        }
    }
}

/// Logging endpoint for `provider` under `base_url`.
///
/// Custom models log to `/custom/v1/log` at the root of the base URL; the
/// other providers append their suffix to the base URL as given.
pub fn endpoint_for(base_url: &str, provider: Provider) -> CoreResult<String> {
    let mut url = Url::parse(base_url)
        .map_err(|e| RapidaError::Configuration(format!("invalid base url '{base_url}': {e}")))?;
    let base = base_url.trim_end_matches('/');
    Ok(match provider {
        Provider::CustomModel => {
            url.set_path("/custom/v1/log");
            url.to_string()
        }
        Provider::OpenAI | Provider::AzureOpenAI => format!("{base}/oai/v1/log"),
        Provider::Anthropic => format!("{base}/anthropic/v1/log"),
    })
}

/// Like [`endpoint_for`] but takes a raw provider tag. Unsupported tags and
/// malformed base URLs are reported and yield `None`.
pub fn resolve_endpoint(base_url: &str, tag: &str) -> Option<String> {
    match tag.parse::<Provider>().and_then(|p| endpoint_for(base_url, p)) {
        Ok(url) => Some(url),
        Err(err) => {
            telemetry::report(
                DeliveryReport::new(CHANNEL_LOG, DeliveryOutcome::Skipped)
                    .provider(tag)
                    .error(&err),
            );
            None
        }
    }
}

/// Ships built log records. Cheap to clone; clones share the HTTP pool.
#[derive(Clone)]
pub struct AsyncLogger {
    http: HttpClient,
    base_url: Option<String>,
    api_key: Option<SecretString>,
    on_log: Option<Arc<dyn ResponseHook>>,
}

impl AsyncLogger {
    pub fn new(cfg: &RapidaConfig, http: HttpClient) -> Self {
        Self {
            http,
            base_url: cfg.base_url.clone(),
            api_key: cfg.api_key.clone(),
            on_log: None,
        }
    }

    pub fn with_on_log(mut self, hook: Option<Arc<dyn ResponseHook>>) -> Self {
        self.on_log = hook;
        self
    }

    /// Deliver one record and wait for the outcome.
    ///
    /// Returns the backend's response when one arrived. A copy goes to
    /// `on_log` on a separate task, so a slow hook never holds up the caller.
    /// Every failure is reported and yields `None`.
    pub async fn log(&self, record: &LogRecord, provider: Provider) -> Option<DeliveredResponse> {
        let span = tracing::info_span!(
            "rapida.log",
            rapida.id = record.id(),
            llm.provider = provider.as_str(),
            http.status = tracing::field::Empty,
            latency.ms = tracing::field::Empty,
        );
        self.deliver(record, provider).instrument(span).await
    }

    /// Fire-and-forget variant of [`AsyncLogger::log`]: ships on a detached
    /// task. Awaiting the handle is optional.
    pub fn spawn(&self, record: LogRecord, provider: Provider) -> JoinHandle<Option<DeliveredResponse>> {
        let logger = self.clone();
        tokio::spawn(async move { logger.log(&record, provider).await })
    }

    async fn deliver(&self, record: &LogRecord, provider: Provider) -> Option<DeliveredResponse> {
        let base = DeliveryReport::new(CHANNEL_LOG, DeliveryOutcome::Skipped)
            .rapida_id(record.id())
            .provider(provider.as_str());

        let Some(base_url) = self.base_url.as_deref() else {
            telemetry::report(base.error(&RapidaError::Configuration(
                "base url is not configured".into(),
            )));
            return None;
        };
        let url = match endpoint_for(base_url, provider) {
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
            .post_raw(
                CHANNEL_LOG,
                &url,
                record,
                &[("Authorization", auth.as_str())],
            )
            .await;
        let latency = started.elapsed().as_millis() as u64;
        tracing::Span::current().record("latency.ms", latency);

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

        if let Some(hook) = &self.on_log {
            let _ = callback::dispatch(hook.clone(), CHANNEL_LOG, response.clone());
        }
        Some(response)
    }
}

impl fmt::Debug for AsyncLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncLogger")
            .field("base_url", &self.base_url)
            .field("on_log", &self.on_log.is_some())
            .finish()
    }
}
