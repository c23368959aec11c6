use std::{collections::BTreeMap, fs, path::Path};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{CoreResult, RapidaError};

/// Environment variable consulted for the API key when none is configured.
pub const API_KEY_ENV: &str = "RAPIDA_API_KEY";
/// Environment variable consulted for the base URL when none is configured.
pub const BASE_URL_ENV: &str = "RAPIDA_BASE_URL";

/// Explicit retry tuning forwarded to the backend as `Rapida-Retry-*` headers.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct RetryPolicy {
    #[serde(default)]
    pub num: Option<u64>,
    #[serde(default)]
    pub factor: Option<f64>,
    #[serde(default)]
    pub min_timeout: Option<u64>,
    #[serde(default)]
    pub max_timeout: Option<u64>,
}

/// `retry` accepts either a plain flag or a policy object.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum RetrySetting {
    Toggle(bool),
    Policy(RetryPolicy),
}

impl Default for RetrySetting {
    fn default() -> Self {
        Self::Toggle(false)
    }
}

impl RetrySetting {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Toggle(false))
    }
}

/// Rate-limit policy: either a preformatted policy string or a quota object.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(try_from = "Value")]
pub enum RateLimitPolicy {
    Raw(String),
    /// `quota` and `time_window` are kept as given (a number or a string);
    /// an empty segment counts as absent.
    Quota {
        quota: String,
        time_window: String,
        segment: Option<String>,
    },
}

impl RateLimitPolicy {
    /// Value of the `Rapida-RateLimit-Policy` header, e.g. `100;w=60;s=users`.
    pub fn header_value(&self) -> String {
        match self {
            Self::Raw(s) => s.clone(),
            Self::Quota {
                quota,
                time_window,
                segment,
            } => {
                let mut policy = format!("{quota};w={time_window}");
                if let Some(seg) = segment.as_deref().filter(|s| !s.is_empty()) {
                    policy.push_str(";s=");
                    policy.push_str(seg);
                }
                policy
            }
        }
    }
}

impl TryFrom<Value> for RateLimitPolicy {
    type Error = RapidaError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(s) => Ok(Self::Raw(s)),
            Value::Object(map) => {
                let field = |name: &str| match map.get(name) {
                    Some(Value::Number(n)) => Ok(n.to_string()),
                    Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
                    _ => Err(RapidaError::Configuration(format!(
                        "rate_limit_policy.{name} must be a number or a non-empty string"
                    ))),
                };
                let quota = field("quota")?;
                let time_window = field("time_window")?;
                let segment = match map.get("segment") {
                    None | Some(Value::Null) | Some(Value::Bool(false)) => None,
                    Some(Value::String(s)) if s.is_empty() => None,
                    Some(Value::String(s)) => Some(s.clone()),
                    Some(other) => Some(other.to_string()),
                };
                Ok(Self::Quota {
                    quota,
                    time_window,
                    segment,
                })
            }
            _ => Err(RapidaError::Configuration(
                "rate_limit_policy must be either a string or a dictionary".into(),
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct HttpCfg {
    /// TCP connect timeout in milliseconds (default 5000ms)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Total request timeout in milliseconds (default 60000ms)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Optional per-host idle connection pool cap (None = reqwest default)
    #[serde(default)]
    pub pool_max_idle_per_host: Option<usize>,
}

impl Default for HttpCfg {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            pool_max_idle_per_host: None,
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_request_timeout_ms() -> u64 {
    60_000
}

fn deserialize_secret<'de, D>(de: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(de)?.map(SecretString::from))
}

/// Read-only configuration shared by the header builder, log shipper,
/// feedback submitter and proxy client.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RapidaConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub api_key: Option<SecretString>,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    #[serde(default)]
    pub cache: bool,
    #[serde(default)]
    pub retry: RetrySetting,
    #[serde(default)]
    pub rate_limit_policy: Option<RateLimitPolicy>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub node_id: Option<String>,
    /// Upstream provider base URL the gateway should forward to.
    #[serde(default)]
    pub provider_api_base: Option<String>,
    /// HTTP client configuration (timeouts, pooling). Missing → defaults.
    #[serde(default)]
    pub http: HttpCfg,
}

impl RapidaConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            api_key: Some(SecretString::from(api_key.into())),
            ..Default::default()
        }
    }

    /// Load a config from a file path (JSON or TOML by extension). If the
    /// extension is missing or unrecognized, try JSON first, then TOML.
    pub fn from_path<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let s = std::str::from_utf8(&bytes).map_err(|e| RapidaError::Other(e.into()))?;
        let parse_json = |s: &str| {
            serde_json::from_str::<Self>(s)
                .map_err(|e| RapidaError::Configuration(format!("invalid json config: {e}")))
        };
        let parse_toml = |s: &str| {
            toml::from_str::<Self>(s)
                .map_err(|e| RapidaError::Configuration(format!("invalid toml config: {e}")))
        };
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => parse_json(s),
            Some("toml") => parse_toml(s),
            _ => parse_json(s).or_else(|_| parse_toml(s)),
        }
    }

    /// Tag proxied calls with a run node, see [`crate::runs::Node`].
    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    /// Fill in `api_key` and `base_url` from the environment when absent.
    /// Call once during setup; nothing downstream reads the environment.
    pub fn with_env_fallback(mut self) -> Self {
        if self.api_key.is_none()
            && let Ok(key) = std::env::var(API_KEY_ENV)
        {
            self.api_key = Some(SecretString::from(key));
        }
        if self.base_url.is_none()
            && let Ok(url) = std::env::var(BASE_URL_ENV)
        {
            self.base_url = Some(url);
        }
        self
    }

    /// `Bearer <key>`; an unset key renders as an empty token.
    pub fn bearer(&self) -> String {
        bearer(self.api_key.as_ref())
    }
}

pub(crate) fn bearer(key: Option<&SecretString>) -> String {
    format!(
        "Bearer {}",
        key.map(|k| k.expose_secret()).unwrap_or_default()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn load_from_json() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("rapida.json");
        let json = r#"{
          "base_url": "https://api.rapida.example",
          "api_key": "sk-test",
          "properties": {"app": "chat", "tier": 2},
          "cache": true,
          "retry": {"num": 3, "factor": 2, "min_timeout": 1000, "max_timeout": 3000},
          "rate_limit_policy": {"quota": 100, "time_window": 60, "segment": "user"},
          "user": "alice"
        }"#;
        fs::write(&file, json).unwrap();
        let cfg = RapidaConfig::from_path(&file).unwrap();
        assert_eq!(cfg.base_url.as_deref(), Some("https://api.rapida.example"));
        assert_eq!(cfg.bearer(), "Bearer sk-test");
        assert!(cfg.cache);
        assert_eq!(
            cfg.retry,
            RetrySetting::Policy(RetryPolicy {
                num: Some(3),
                factor: Some(2.0),
                min_timeout: Some(1000),
                max_timeout: Some(3000),
            })
        );
        assert_eq!(
            cfg.rate_limit_policy.unwrap().header_value(),
            "100;w=60;s=user"
        );
        assert_eq!(cfg.http.connect_timeout_ms, 5_000);
        assert_eq!(cfg.http.request_timeout_ms, 60_000);
    }

    #[test]
    fn load_from_toml() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("rapida.toml");
        let toml = r#"
base_url = "https://api.rapida.example"
retry = true
rate_limit_policy = "1000;w=3600"

[properties]
env = "staging"

[http]
connect_timeout_ms = 250
"#;
        fs::write(&file, toml).unwrap();
        let cfg = RapidaConfig::from_path(&file).unwrap();
        assert_eq!(cfg.retry, RetrySetting::Toggle(true));
        assert_eq!(
            cfg.rate_limit_policy,
            Some(RateLimitPolicy::Raw("1000;w=3600".into()))
        );
        assert_eq!(cfg.properties["env"], Value::String("staging".into()));
        assert_eq!(cfg.http.connect_timeout_ms, 250);
        assert_eq!(cfg.http.request_timeout_ms, 60_000);
        assert!(cfg.api_key.is_none());
    }

    #[test]
    fn unknown_extension_falls_back_to_json_then_toml() {
        let dir = tempdir().unwrap();
        let json_path = dir.path().join("rapida.conf");
        fs::write(&json_path, r#"{"user":"bob"}"#).unwrap();
        let cfg = RapidaConfig::from_path(&json_path).unwrap();
        assert_eq!(cfg.user.as_deref(), Some("bob"));

        let toml_path = dir.path().join("rapida2.conf");
        fs::write(&toml_path, "user = \"carol\"\ncache = true\n").unwrap();
        let cfg = RapidaConfig::from_path(&toml_path).unwrap();
        assert_eq!(cfg.user.as_deref(), Some("carol"));
        assert!(cfg.cache);
    }

    #[test]
    fn rate_limit_policy_of_wrong_type_is_configuration_error() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("bad.json");
        fs::write(&file, r#"{"rate_limit_policy": 42}"#).unwrap();
        let err = RapidaConfig::from_path(&file).unwrap_err();
        match err {
            RapidaError::Configuration(msg) => {
                assert!(msg.contains("either a string or a dictionary"), "{msg}")
            }
            other => panic!("expected Configuration error, got: {:?}", other),
        }
    }

    #[test]
    fn missing_file_returns_io_error() {
        let missing = std::path::PathBuf::from("/definitely/not/here/rapida-missing.json");
        let err = RapidaConfig::from_path(&missing).unwrap_err();
        assert!(matches!(err, RapidaError::Io(_)));
    }

    #[test]
    fn quota_policy_without_segment_drops_suffix() {
        let policy = RateLimitPolicy::try_from(serde_json::json!({"quota": 100, "time_window": 60}))
            .unwrap();
        assert_eq!(policy.header_value(), "100;w=60");
    }

    #[test]
    fn quota_policy_accepts_strings_and_skips_empty_segment() {
        let policy = RateLimitPolicy::try_from(
            serde_json::json!({"quota": "100", "time_window": 60, "segment": ""}),
        )
        .unwrap();
        assert_eq!(policy.header_value(), "100;w=60");

        let built = RateLimitPolicy::Quota {
            quota: "5".into(),
            time_window: "1".into(),
            segment: Some(String::new()),
        };
        assert_eq!(built.header_value(), "5;w=1");

        assert!(RateLimitPolicy::try_from(serde_json::json!({"quota": true, "time_window": 1})).is_err());
    }

    #[test]
    fn disabled_retry_is_default() {
        assert!(!RetrySetting::default().is_enabled());
        assert!(RetrySetting::Toggle(true).is_enabled());
        assert!(RetrySetting::Policy(RetryPolicy::default()).is_enabled());
    }

    #[test]
    fn missing_key_renders_empty_bearer() {
        assert_eq!(RapidaConfig::default().bearer(), "Bearer ");
    }
}
