use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use http::StatusCode;
use reqwest::{Client, Method, header::HeaderMap};
use serde::{Serialize, de::DeserializeOwned};

use crate::config::HttpCfg;
use crate::error::{CoreResult, RapidaError};

/// Response header carrying the backend's correlation id.
pub const RAPIDA_ID_HEADER: &str = "rapida-id";

/// Owned copy of a raw HTTP response: status, headers (lowercase names) and
/// body text. Handed to `on_log` / `on_feedback` callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredResponse {
    pub status: StatusCode,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl DeliveredResponse {
    /// 2xx or 3xx.
    pub fn is_ok(&self) -> bool {
        self.status.is_success() || self.status.is_redirection()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn rapida_id(&self) -> Option<&str> {
        self.header(RAPIDA_ID_HEADER)
    }

    pub fn json<R: DeserializeOwned>(&self) -> CoreResult<R> {
        serde_json::from_str(&self.body).map_err(|e| RapidaError::Other(e.into()))
    }
}

/// Parsed provider response plus the transport details proxy mode needs.
#[derive(Debug, Clone)]
pub struct JsonResponse<R> {
    pub body: R,
    pub status: StatusCode,
    pub headers: BTreeMap<String, String>,
    pub latency_ms: u32,
}

/// Thin wrapper around reqwest::Client with defaults and helpers.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
    user_agent: String,
}

impl HttpClient {
    pub fn new_default() -> CoreResult<Self> {
        Self::from_cfg(&HttpCfg {
            pool_max_idle_per_host: Some(8),
            ..HttpCfg::default()
        })
    }

    pub fn from_cfg(cfg: &HttpCfg) -> CoreResult<Self> {
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_millis(cfg.connect_timeout_ms))
            .timeout(Duration::from_millis(cfg.request_timeout_ms));
        if let Some(n) = cfg.pool_max_idle_per_host {
            builder = builder.pool_max_idle_per_host(n);
        }
        let inner = builder
            .build()
            .map_err(|e| RapidaError::Other(anyhow::anyhow!("http client build failed: {e}")))?;
        Ok(Self {
            inner,
            user_agent: concat!("rapida-rs/", env!("CARGO_PKG_VERSION")).to_string(),
        })
    }

    /// POST JSON and hand back whatever the server answered, whatever the
    /// status. Only transport failures are errors.
    pub async fn post_raw<T: Serialize + ?Sized>(
        &self,
        channel: &'static str,
        url: &str,
        body: &T,
        headers: &[(&str, &str)],
    ) -> CoreResult<DeliveredResponse> {
        self.send_raw(Method::POST, channel, url, body, headers).await
    }

    /// [`HttpClient::post_raw`] with an arbitrary method.
    pub async fn send_raw<T: Serialize + ?Sized>(
        &self,
        method: Method,
        channel: &'static str,
        url: &str,
        body: &T,
        headers: &[(&str, &str)],
    ) -> CoreResult<DeliveredResponse> {
        let mut req = self
            .inner
            .request(method, url)
            .json(body)
            .header("User-Agent", &self.user_agent);
        for (k, v) in headers {
            req = req.header(*k, *v);
        }

        let delivery = |message: String| RapidaError::Delivery { channel, message };
        let resp = req.send().await.map_err(|e| delivery(e.to_string()))?;
        let status = resp.status();
        let headers = header_map(resp.headers());
        let body = resp
            .text()
            .await
            .map_err(|e| delivery(format!("reading response body: {e}")))?;
        Ok(DeliveredResponse {
            status,
            headers,
            body,
        })
    }

    /// POST JSON to a provider and decode the reply. Non-2xx statuses map to
    /// typed provider errors.
    pub async fn post_json<T: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        provider: &str,
        url: &str,
        body: &T,
        headers: &[(&str, &str)],
    ) -> CoreResult<JsonResponse<R>> {
        let start = Instant::now();
        let mut req = self
            .inner
            .post(url)
            .json(body)
            .header("User-Agent", &self.user_agent);
        for (k, v) in headers {
            req = req.header(*k, *v);
        }

        let resp = req
            .send()
            .await
            .map_err(|_e| RapidaError::ProviderUnavailable {
                provider: provider.into(),
            })?;

        let latency_ms = start.elapsed().as_millis() as u32;
        let status = resp.status();
        let raw_headers = resp.headers().clone();

        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let ra = parse_retry_after(&raw_headers);
            return Err(map_http_error(provider, status, ra, &text));
        }

        let parsed = resp
            .json::<R>()
            .await
            .map_err(|e| RapidaError::ProviderError {
                provider: provider.into(),
                code: status.as_u16().to_string(),
                message: format!("json decode error: {e}"),
            })?;
        Ok(JsonResponse {
            body: parsed,
            status,
            headers: header_map(&raw_headers),
            latency_ms,
        })
    }
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
        .collect()
}

fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    if let Some(v) = headers.get("retry-after")
        && let Ok(s) = v.to_str()
        && let Ok(secs) = s.trim().parse::<u64>()
    {
        return Some(secs);
    }
    // HTTP-date forms are ignored.
    None
}

fn map_http_error(
    provider: &str,
    status: StatusCode,
    retry_after: Option<u64>,
    body: &str,
) -> RapidaError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => RapidaError::RateLimited {
            provider: provider.to_string(),
            retry_after,
        },
        s if s.is_server_error() => RapidaError::ProviderUnavailable {
            provider: provider.to_string(),
        },
        s => RapidaError::ProviderError {
            provider: provider.to_string(),
            code: s.as_u16().to_string(),
            message: truncate(body, 300),
        },
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.len() > max {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        let mut t = s[..end].to_string();
        t.push_str("...");
        t
    } else {
        s.to_string()
    }
}
