//! Per-call log record assembly.
//!
//! A [`LogBuilder`] moves through two states before it can be frozen:
//! `Created` (request captured, start stamped, id minted) and `Completed`
//! (response attached, end stamped). Only a completed builder exposes
//! [`LogBuilder::build`]:
//!
//! ```compile_fail
//! use rapida_core::log_record::LogBuilder;
//!
//! let builder = LogBuilder::new(serde_json::json!({"model": "davinci"}));
//! let _record = builder.build(); // no response attached
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::timing::{Timing, now_ms};

/// Meta key carrying the correlation id.
pub const META_REQUEST_ID: &str = "Request-Id";
/// Meta key carrying the end user id.
pub const META_USER_ID: &str = "User-Id";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub url: String,
    pub json: Value,
    pub meta: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub json: Value,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
}

/// One normalized request/response/timing triple. Frozen once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    #[serde(skip)]
    id: String,
    provider_request: ProviderRequest,
    provider_response: ProviderResponse,
    timing: Timing,
}

impl LogRecord {
    /// Correlation id; also present as `Request-Id` in the request meta.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn provider_request(&self) -> &ProviderRequest {
        &self.provider_request
    }

    pub fn provider_response(&self) -> &ProviderResponse {
        &self.provider_response
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }
}

/// Request captured, no response yet.
#[derive(Debug)]
pub struct Created;

/// Response attached; the builder can be frozen.
#[derive(Debug)]
pub struct Completed {
    response: Value,
    end_ms: i64,
}

/// Fluent accumulator for one in-flight call. Not shared across calls.
#[derive(Debug)]
pub struct LogBuilder<S = Created> {
    id: String,
    url: String,
    request: Value,
    user: Option<String>,
    start_ms: i64,
    status: u16,
    headers: BTreeMap<String, String>,
    state: S,
}

impl LogBuilder<Created> {
    pub fn new(request: Value) -> Self {
        Self::new_at(request, now_ms())
    }

    /// Like [`LogBuilder::new`] with a caller-measured start instant.
    pub fn new_at(request: Value, start_ms: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            url: String::new(),
            request,
            user: None,
            start_ms,
            status: 200,
            headers: BTreeMap::new(),
            state: Created,
        }
    }
}

impl<S> LogBuilder<S> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn add_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn add_response(self, response: Value) -> LogBuilder<Completed> {
        self.add_response_at(response, now_ms())
    }

    /// Attach the response with a caller-measured end instant. A second call
    /// replaces the earlier response and end time.
    pub fn add_response_at(self, response: Value, end_ms: i64) -> LogBuilder<Completed> {
        LogBuilder {
            id: self.id,
            url: self.url,
            request: self.request,
            user: self.user,
            start_ms: self.start_ms,
            status: self.status,
            headers: self.headers,
            state: Completed { response, end_ms },
        }
    }
}

impl LogBuilder<Completed> {
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> LogRecord {
        let Self {
            id,
            url,
            request,
            user,
            start_ms,
            status,
            headers,
            state: Completed { response, end_ms },
        } = self;

        let mut meta = BTreeMap::new();
        meta.insert(META_REQUEST_ID.to_string(), id.clone());
        if let Some(user) = user {
            meta.insert(META_USER_ID.to_string(), user);
        }

        let mut json = match response {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("body".into(), other);
                map
            }
        };
        if let Some(model) = request.get("model") {
            json.insert("model".into(), model.clone());
        }

        LogRecord {
            id,
            provider_request: ProviderRequest {
                url,
                json: request,
                meta,
            },
            provider_response: ProviderResponse {
                json: Value::Object(json),
                status,
                headers,
            },
            timing: Timing::from_millis(start_ms, end_ms),
        }
    }
}
