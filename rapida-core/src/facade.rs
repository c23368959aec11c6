//! Manual-mode entry point: wraps a provider call with a [`LogBuilder`] and
//! ships the finished record to the Rapida backend.

use serde_json::Value;
use tokio::task::JoinHandle;

use crate::async_logger::{AsyncLogger, Provider};
use crate::callback::Callbacks;
use crate::config::RapidaConfig;
use crate::error::CoreResult;
use crate::feedback::{FeedbackClient, FeedbackDataType, Rating};
use crate::http_client::{DeliveredResponse, HttpClient};
use crate::log_record::{Completed, LogBuilder, LogRecord};
use crate::runs::RunsClient;

#[derive(Debug, Clone)]
pub struct RapidaLogger {
    logger: AsyncLogger,
    feedback: FeedbackClient,
    runs: RunsClient,
}

impl RapidaLogger {
    pub fn new(cfg: &RapidaConfig, callbacks: Callbacks) -> CoreResult<Self> {
        let http = HttpClient::from_cfg(&cfg.http)?;
        Ok(Self {
            logger: AsyncLogger::new(cfg, http.clone()).with_on_log(callbacks.on_log),
            feedback: FeedbackClient::new(cfg, http.clone())
                .with_on_feedback(callbacks.on_feedback),
            runs: RunsClient::new(cfg, http),
        })
    }

    /// Jobs and nodes, sharing this logger's connection pool.
    pub fn runs(&self) -> &RunsClient {
        &self.runs
    }

    /// Start capturing a call. The builder's id is the correlation id to use
    /// for feedback later.
    pub fn builder(&self, request: Value) -> LogBuilder {
        LogBuilder::new(request)
    }

    /// Build and ship as `custom-model`, waiting for the backend's answer.
    pub async fn submit(&self, builder: LogBuilder<Completed>) -> Option<DeliveredResponse> {
        let record = builder.build();
        self.logger.log(&record, Provider::CustomModel).await
    }

    /// Build and ship as `custom-model` on a detached task.
    pub fn submit_detached(
        &self,
        builder: LogBuilder<Completed>,
    ) -> JoinHandle<Option<DeliveredResponse>> {
        self.logger.spawn(builder.build(), Provider::CustomModel)
    }

    pub async fn log(&self, record: &LogRecord, provider: Provider) -> Option<DeliveredResponse> {
        self.logger.log(record, provider).await
    }

    pub async fn feedback(&self, rapida_id: &str, rating: Rating) -> Option<DeliveredResponse> {
        self.feedback.log_rating(rapida_id, rating).await
    }

    pub async fn named_feedback(
        &self,
        rapida_id: &str,
        name: &str,
        value: impl Into<Value>,
        data_type: Option<FeedbackDataType>,
    ) -> Option<DeliveredResponse> {
        self.feedback
            .log_named_feedback(rapida_id, name, value, data_type)
            .await
    }
}
