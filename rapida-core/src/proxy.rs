//! Proxy mode: provider calls are routed through the Rapida gateway, which
//! records them server-side. The client only injects configuration headers
//! and reads back the correlation id.

use std::collections::BTreeMap;

use serde::{Serialize, de::DeserializeOwned};

use crate::callback::Callbacks;
use crate::config::RapidaConfig;
use crate::error::{CoreResult, RapidaError};
use crate::feedback::{FeedbackClient, Rating};
use crate::headers::{HeaderBuilder, HeaderSet, RATE_LIMIT_POLICY};
use crate::http_client::{DeliveredResponse, HttpClient, RAPIDA_ID_HEADER};

const PROXY_PROVIDER: &str = "rapida-proxy";

pub const STATUS_HEADER: &str = "rapida-status";
pub const CACHE_HEADER: &str = "rapida-cache";
pub const RATE_LIMIT_LIMIT_HEADER: &str = "rapida-ratelimit-limit";
pub const RATE_LIMIT_REMAINING_HEADER: &str = "rapida-ratelimit-remaining";
pub const RATE_LIMIT_RESET_HEADER: &str = "rapida-ratelimit-reset";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RateLimitInfo {
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    pub reset: Option<u64>,
    pub policy: String,
}

/// Gateway metadata returned alongside a proxied provider response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProxyMeta {
    pub id: Option<String>,
    pub status: Option<String>,
    pub cache: Option<String>,
    pub rate_limit: Option<RateLimitInfo>,
}

impl ProxyMeta {
    /// Read gateway headers from a lowercase header map. Rate-limit details are
    /// only present when the gateway echoed a policy.
    pub fn from_headers(headers: &BTreeMap<String, String>) -> Self {
        let get = |name: &str| headers.get(name).cloned();
        let num = |name: &str| headers.get(name).and_then(|v| v.trim().parse::<u64>().ok());
        let rate_limit = get(&RATE_LIMIT_POLICY.to_ascii_lowercase()).map(|policy| RateLimitInfo {
            limit: num(RATE_LIMIT_LIMIT_HEADER),
            remaining: num(RATE_LIMIT_REMAINING_HEADER),
            reset: num(RATE_LIMIT_RESET_HEADER),
            policy,
        });
        Self {
            id: get(RAPIDA_ID_HEADER),
            status: get(STATUS_HEADER),
            cache: get(CACHE_HEADER),
            rate_limit,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProxiedResponse<R> {
    pub body: R,
    pub status: http::StatusCode,
    pub meta: ProxyMeta,
    pub latency_ms: u32,
}

impl<R> ProxiedResponse<R> {
    pub fn rapida_id(&self) -> Option<&str> {
        self.meta.id.as_deref()
    }
}

#[derive(Debug, Clone)]
pub struct RapidaProxy {
    http: HttpClient,
    base_url: String,
    headers: HeaderSet,
    feedback: FeedbackClient,
}

impl RapidaProxy {
    /// The header set is computed and checked here once, then reused for
    /// every call. Unsendable headers fail construction, not provider calls.
    pub fn new(cfg: &RapidaConfig, callbacks: Callbacks) -> CoreResult<Self> {
        let base_url = cfg
            .base_url
            .clone()
            .ok_or_else(|| RapidaError::Configuration("proxy mode requires base_url".into()))?;
        let headers = HeaderBuilder::all(cfg);
        headers.validate()?;
        let http = HttpClient::from_cfg(&cfg.http)?;
        let feedback =
            FeedbackClient::new(cfg, http.clone()).with_on_feedback(callbacks.on_feedback);
        Ok(Self {
            headers,
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            feedback,
        })
    }

    pub fn headers(&self) -> &HeaderSet {
        &self.headers
    }

    /// Absolute URLs are used as-is; anything else is appended to the gateway
    /// base URL.
    pub fn url_for(&self, path_or_url: &str) -> String {
        if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
            path_or_url.to_string()
        } else {
            format!("{}/{}", self.base_url, path_or_url.trim_start_matches('/'))
        }
    }

    /// POST a provider request through the gateway with the Rapida headers
    /// attached. Provider failures surface as typed errors.
    pub async fn post_json<T, R>(&self, path_or_url: &str, body: &T) -> CoreResult<ProxiedResponse<R>>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.url_for(path_or_url);
        let hdrs: Vec<(&str, &str)> = self.headers.iter().collect();
        let resp = self
            .http
            .post_json::<T, R>(PROXY_PROVIDER, &url, body, &hdrs)
            .await?;
        let meta = ProxyMeta::from_headers(&resp.headers);
        tracing::debug!(
            rapida.id = meta.id.as_deref().unwrap_or(""),
            http.url = %url,
            latency.ms = resp.latency_ms,
            "proxied provider call"
        );
        Ok(ProxiedResponse {
            body: resp.body,
            status: resp.status,
            meta,
            latency_ms: resp.latency_ms,
        })
    }

    pub async fn feedback(&self, rapida_id: &str, rating: Rating) -> Option<DeliveredResponse> {
        self.feedback.log_rating(rapida_id, rating).await
    }
}
