//! Runs API: a job groups the provider calls of one unit of work, and nodes
//! (optionally nested) mark its steps. A node's id is what proxied calls carry
//! in `Rapida-Node-Id`.
//!
//! Unlike log shipping, these are explicit calls and failures are returned.

use std::collections::BTreeMap;
use std::fmt;

use reqwest::Method;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{self, RapidaConfig};
use crate::error::{CoreResult, RapidaError};
use crate::headers::AUTH;
use crate::http_client::{self, HttpClient};
use crate::telemetry::CHANNEL_RUNS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl RunStatus {
    /// Finished with a verdict. A cancelled run has none.
    pub fn is_completed(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobConfig {
    pub name: String,
    pub description: String,
    pub custom_properties: BTreeMap<String, String>,
    pub timeout_seconds: u64,
}

impl JobConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            custom_properties: BTreeMap::new(),
            timeout_seconds: 60,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_properties.insert(key.into(), value.into());
        self
    }

    pub fn timeout_seconds(mut self, secs: u64) -> Self {
        self.timeout_seconds = secs;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeConfig {
    pub parent_job_id: Option<String>,
    pub name: Option<String>,
    pub description: String,
    pub custom_properties: BTreeMap<String, String>,
}

impl NodeConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_properties.insert(key.into(), value.into());
        self
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JobBody<'a> {
    id: &'a str,
    name: &'a str,
    description: &'a str,
    custom_properties: &'a BTreeMap<String, String>,
    timeout_seconds: u64,
    status: RunStatus,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NodeBody<'a> {
    id: &'a str,
    job: &'a str,
    parent_job_id: Option<&'a str>,
    name: Option<&'a str>,
    description: &'a str,
    custom_properties: &'a BTreeMap<String, String>,
}

#[derive(Serialize)]
struct StatusBody {
    status: RunStatus,
}

/// Client for `/job` and `/node`. Cheap to clone; jobs and nodes hold one.
#[derive(Clone)]
pub struct RunsClient {
    http: HttpClient,
    base_url: Option<String>,
    api_key: Option<SecretString>,
}

impl RunsClient {
    pub fn new(cfg: &RapidaConfig, http: HttpClient) -> Self {
        Self {
            http,
            base_url: cfg.base_url.clone(),
            api_key: cfg.api_key.clone(),
        }
    }

    /// Register a job; its id is minted locally.
    pub async fn create_job(&self, config: JobConfig) -> CoreResult<Job> {
        let id = Uuid::new_v4().to_string();
        let status = RunStatus::Pending;
        let body = JobBody {
            id: &id,
            name: &config.name,
            description: &config.description,
            custom_properties: &config.custom_properties,
            timeout_seconds: config.timeout_seconds,
            status,
        };
        self.send(Method::POST, "/job", &body).await?;
        tracing::debug!(rapida.job = %id, name = %config.name, "rapida job created");
        Ok(Job {
            client: self.clone(),
            id,
            config,
            status,
        })
    }

    async fn create_node(&self, job_id: &str, config: NodeConfig) -> CoreResult<Node> {
        let id = Uuid::new_v4().to_string();
        let body = NodeBody {
            id: &id,
            job: job_id,
            parent_job_id: config.parent_job_id.as_deref(),
            name: config.name.as_deref(),
            description: &config.description,
            custom_properties: &config.custom_properties,
        };
        self.send(Method::POST, "/node", &body).await?;
        tracing::debug!(rapida.job = %job_id, rapida.node = %id, "rapida node created");
        Ok(Node {
            client: self.clone(),
            id,
            job_id: job_id.to_string(),
            config,
            status: RunStatus::Pending,
        })
    }

    async fn set_status(&self, kind: &str, id: &str, status: RunStatus) -> CoreResult<()> {
        self.send(Method::PATCH, &format!("/{kind}/{id}/status"), &StatusBody { status })
            .await
    }

    async fn send<B: Serialize + ?Sized>(&self, method: Method, path: &str, body: &B) -> CoreResult<()> {
        let base = self
            .base_url
            .as_deref()
            .ok_or_else(|| RapidaError::Configuration("base url is not configured".into()))?;
        let url = format!("{}{path}", base.trim_end_matches('/'));
        let auth = config::bearer(self.api_key.as_ref());
        let resp = self
            .http
            .send_raw(method, CHANNEL_RUNS, &url, body, &[(AUTH, auth.as_str())])
            .await?;
        if !resp.status.is_success() {
            return Err(RapidaError::Delivery {
                channel: CHANNEL_RUNS,
                message: format!(
                    "{path} returned {}: {}",
                    resp.status.as_u16(),
                    http_client::truncate(&resp.body, 300)
                ),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for RunsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunsClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    client: RunsClient,
    id: String,
    config: JobConfig,
    status: RunStatus,
}

impl Job {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub async fn create_node(&self, config: NodeConfig) -> CoreResult<Node> {
        self.client.create_node(&self.id, config).await
    }

    /// The local status only changes once the backend accepted it.
    pub async fn set_status(&mut self, status: RunStatus) -> CoreResult<()> {
        self.client.set_status("job", &self.id, status).await?;
        self.status = status;
        Ok(())
    }

    pub async fn success(&mut self) -> CoreResult<()> {
        self.set_status(RunStatus::Success).await
    }

    pub async fn fail(&mut self) -> CoreResult<()> {
        self.set_status(RunStatus::Failed).await
    }

    pub async fn cancel(&mut self) -> CoreResult<()> {
        self.set_status(RunStatus::Cancelled).await
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    client: RunsClient,
    id: String,
    job_id: String,
    config: NodeConfig,
    status: RunStatus,
}

impl Node {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// A node in the same job whose parent is this node.
    pub async fn create_child_node(&self, config: NodeConfig) -> CoreResult<Node> {
        let config = NodeConfig {
            parent_job_id: Some(self.id.clone()),
            ..config
        };
        self.client.create_node(&self.job_id, config).await
    }

    pub async fn set_status(&mut self, status: RunStatus) -> CoreResult<()> {
        self.client.set_status("node", &self.id, status).await?;
        self.status = status;
        Ok(())
    }

    pub async fn success(&mut self) -> CoreResult<()> {
        self.set_status(RunStatus::Success).await
    }

    pub async fn fail(&mut self) -> CoreResult<()> {
        self.set_status(RunStatus::Failed).await
    }

    pub async fn cancel(&mut self) -> CoreResult<()> {
        self.set_status(RunStatus::Cancelled).await
    }
}
