//! Proxy-mode header policy.
//!
//! Every recognised option in [`RapidaConfig`] maps to a fixed set of
//! `Rapida-*` headers. Each `with_*` step only touches its own header names,
//! so the steps can run in any order and repeated calls are no-ops.

use std::collections::BTreeMap;

use http::{HeaderName, HeaderValue};
use serde_json::Value;

use crate::config::{RapidaConfig, RetrySetting};
use crate::error::{CoreResult, RapidaError};

pub const AUTH: &str = "Rapida-Auth";
pub const PROPERTY_PREFIX: &str = "Rapida-Property-";
pub const CACHE_ENABLED: &str = "Rapida-Cache-Enabled";
pub const RETRY_ENABLED: &str = "Rapida-Retry-Enabled";
pub const RETRY_NUM: &str = "Rapida-Retry-Num";
pub const RETRY_FACTOR: &str = "Rapida-Retry-Factor";
pub const RETRY_MIN_TIMEOUT: &str = "Rapida-Retry-Min-Timeout";
pub const RETRY_MAX_TIMEOUT: &str = "Rapida-Retry-Max-Timeout";
pub const RATE_LIMIT_POLICY: &str = "Rapida-RateLimit-Policy";
pub const USER_ID: &str = "Rapida-User-Id";
pub const NODE_ID: &str = "Rapida-Node-Id";
pub const PROVIDER_API_BASE: &str = "Rapida-OpenAI-Api-Base";

/// Insertion-ordered header list. Inserting an existing name replaces the
/// value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: Vec<(String, String)>,
}

impl HeaderSet {
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.entries.iter().cloned().collect()
    }

    /// Reject names or values that could not go out on the wire. Values are
    /// not echoed since the auth header carries the api key.
    pub fn validate(&self) -> CoreResult<()> {
        for (name, value) in self.iter() {
            HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                RapidaError::Configuration(format!("invalid header name '{name}'"))
            })?;
            HeaderValue::from_str(value).map_err(|_| {
                RapidaError::Configuration(format!("invalid value for header '{name}'"))
            })?;
        }
        Ok(())
    }
}

pub struct HeaderBuilder<'a> {
    cfg: &'a RapidaConfig,
    headers: HeaderSet,
}

impl<'a> HeaderBuilder<'a> {
    /// Starts with the auth header, which is always present.
    pub fn new(cfg: &'a RapidaConfig) -> Self {
        let mut headers = HeaderSet::default();
        headers.insert(AUTH, cfg.bearer());
        Self { cfg, headers }
    }

    /// Every policy step applied.
    pub fn all(cfg: &'a RapidaConfig) -> HeaderSet {
        Self::new(cfg)
            .with_properties()
            .with_cache()
            .with_retry()
            .with_rate_limit_policy()
            .with_user()
            .with_node_id()
            .with_provider_api_base()
            .build()
    }

    pub fn with_properties(mut self) -> Self {
        for (name, value) in &self.cfg.properties {
            self.headers
                .insert(format!("{PROPERTY_PREFIX}{name}"), property_value(value));
        }
        self
    }

    pub fn with_cache(mut self) -> Self {
        if self.cfg.cache {
            self.headers.insert(CACHE_ENABLED, "true");
        }
        self
    }

    pub fn with_retry(mut self) -> Self {
        match &self.cfg.retry {
            RetrySetting::Toggle(false) => {}
            RetrySetting::Toggle(true) => self.headers.insert(RETRY_ENABLED, "true"),
            RetrySetting::Policy(p) => {
                self.headers.insert(RETRY_ENABLED, "true");
                // Zero means "unset", as with an absent field.
                if let Some(num) = p.num.filter(|n| *n != 0) {
                    self.headers.insert(RETRY_NUM, num.to_string());
                }
                if let Some(factor) = p.factor.filter(|f| *f != 0.0) {
                    self.headers.insert(RETRY_FACTOR, factor.to_string());
                }
                if let Some(min) = p.min_timeout.filter(|n| *n != 0) {
                    self.headers.insert(RETRY_MIN_TIMEOUT, min.to_string());
                }
                if let Some(max) = p.max_timeout.filter(|n| *n != 0) {
                    self.headers.insert(RETRY_MAX_TIMEOUT, max.to_string());
                }
            }
        }
        self
    }

    pub fn with_rate_limit_policy(mut self) -> Self {
        if let Some(policy) = &self.cfg.rate_limit_policy {
            let value = policy.header_value();
            if !value.is_empty() {
                self.headers.insert(RATE_LIMIT_POLICY, value);
            }
        }
        self
    }

    pub fn with_user(mut self) -> Self {
        if let Some(user) = self.cfg.user.as_deref().filter(|u| !u.is_empty()) {
            self.headers.insert(USER_ID, user);
        }
        self
    }

    pub fn with_node_id(mut self) -> Self {
        if let Some(node) = self.cfg.node_id.as_deref().filter(|n| !n.is_empty()) {
            self.headers.insert(NODE_ID, node);
        }
        self
    }

    /// Tells the gateway which upstream to forward to, unless it is the
    /// gateway itself.
    pub fn with_provider_api_base(mut self) -> Self {
        if let Some(api_base) = self.cfg.provider_api_base.as_deref().filter(|b| !b.is_empty())
            && self.cfg.base_url.as_deref() != Some(api_base)
        {
            self.headers.insert(PROVIDER_API_BASE, api_base);
        }
        self
    }

    pub fn build(self) -> HeaderSet {
        self.headers
    }
}

fn property_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
