use std::path::{Path, PathBuf};
use std::time::Duration;

use jsonschema::{validator_for, Validator};
use once_cell::sync::Lazy;
use relay_protocol::PollHint;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::bootstrap::{self, HttpConfig, HttpConfigError};
use crate::relay::{self, RelaySettings};

const DEFAULT_CONFIG_PATH: &str = "configs/relay.toml";
const DEFAULT_PORT: u16 = 3001;
const DEFAULT_BIND: &str = "127.0.0.1";
const DEFAULT_CONCURRENCY: usize = 256;
const DEFAULT_TIMEOUT_SECS: u64 = 20;
const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 30;

#[derive(Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub(crate) struct GatewaySection {
    /// Bearer credential for the gateway. Prefer `OPENAI_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub assistant_id: Option<String>,
    /// Thread used when a caller does not supply one.
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Extra run instructions sent with every run.
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub(crate) struct HttpSection {
    #[serde(default)]
    pub bind: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub concurrency_limit: Option<usize>,
    /// Allowed browser origins; `*` allows any.
    #[serde(default)]
    pub cors_origins: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub(crate) struct PollingSection {
    #[serde(default)]
    pub interval_ms: Option<u64>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

/// On-disk configuration; every field may be overridden from the environment.
#[derive(Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub(crate) struct FileConfig {
    #[serde(default)]
    pub gateway: GatewaySection,
    #[serde(default)]
    pub http: HttpSection,
    #[serde(default)]
    pub polling: PollingSection,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{path} does not match the config schema: {errors}")]
    Schema { path: PathBuf, errors: String },
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid {key}: {value}")]
    Invalid { key: &'static str, value: String },
    #[error(transparent)]
    Http(#[from] HttpConfigError),
}

#[derive(Clone)]
pub(crate) struct GatewaySettings {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for GatewaySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySettings")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Fully resolved process configuration, built once at startup.
#[derive(Debug)]
pub(crate) struct RelayConfig {
    pub gateway: GatewaySettings,
    pub relay: RelaySettings,
    pub http: HttpConfig,
}

static CONFIG_SCHEMA: Lazy<Result<Validator, String>> =
    Lazy::new(|| validator_for(&config_schema_json()).map_err(|err| err.to_string()));

pub(crate) fn config_schema_json() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(FileConfig)).unwrap_or_default()
}

pub(crate) fn load_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let parse_err = |source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    };
    let raw: toml::Value = toml::from_str(&content).map_err(parse_err)?;
    let json_value = serde_json::to_value(&raw).map_err(|err| ConfigError::Schema {
        path: path.to_path_buf(),
        errors: err.to_string(),
    })?;
    let validator = CONFIG_SCHEMA.as_ref().map_err(|err| ConfigError::Schema {
        path: path.to_path_buf(),
        errors: err.clone(),
    })?;
    let errors: Vec<String> = validator
        .iter_errors(&json_value)
        .map(|e| e.to_string())
        .collect();
    if !errors.is_empty() {
        return Err(ConfigError::Schema {
            path: path.to_path_buf(),
            errors: errors.join(", "),
        });
    }
    toml::from_str(&content).map_err(parse_err)
}

/// Load `RELAY_CONFIG` (or `configs/relay.toml` when present) and apply
/// environment overrides.
pub(crate) fn load() -> Result<RelayConfig, ConfigError> {
    let env = |key: &str| std::env::var(key).ok();
    let file = match env("RELAY_CONFIG").filter(|p| !p.trim().is_empty()) {
        Some(path) => load_file(Path::new(path.trim()))?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            load_file(Path::new(DEFAULT_CONFIG_PATH))?
        }
        None => FileConfig::default(),
    };
    resolve(file, env)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn pick(env: Option<String>, file: Option<String>) -> Option<String> {
    non_blank(env).or_else(|| non_blank(file))
}

fn parse_env<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match non_blank(env(key)) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(None),
    }
}

/// Merge file values with environment overrides; the environment wins.
pub(crate) fn resolve(
    file: FileConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<RelayConfig, ConfigError> {
    let FileConfig {
        gateway,
        http,
        polling,
    } = file;

    let api_key = pick(env("OPENAI_API_KEY"), gateway.api_key)
        .ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;
    let assistant_id = pick(env("OPENAI_ASSISTANT_ID"), gateway.assistant_id)
        .ok_or(ConfigError::Missing("OPENAI_ASSISTANT_ID"))?;
    let thread_id = pick(env("OPENAI_THREAD_ID"), gateway.thread_id)
        .map(|id| {
            relay::validate_id("threadId", &id).map_err(|_| ConfigError::Invalid {
                key: "OPENAI_THREAD_ID",
                value: id.clone(),
            })
        })
        .transpose()?;
    let base_url = pick(env("OPENAI_BASE_URL"), gateway.base_url)
        .unwrap_or_else(|| relay_gateway::DEFAULT_BASE_URL.to_string());
    let instructions = pick(env("RELAY_ASSISTANT_INSTRUCTIONS"), gateway.instructions);
    let timeout_secs = parse_env::<u64>(&env, "RELAY_HTTP_TIMEOUT_SECS")?
        .or(gateway.timeout_secs)
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(ConfigError::Invalid {
            key: "RELAY_HTTP_TIMEOUT_SECS",
            value: "0".into(),
        });
    }

    let interval_ms = parse_env::<u64>(&env, "RELAY_POLL_INTERVAL_MS")?
        .or(polling.interval_ms)
        .unwrap_or(DEFAULT_POLL_INTERVAL_MS);
    let max_attempts = parse_env::<u32>(&env, "RELAY_POLL_MAX_ATTEMPTS")?
        .or(polling.max_attempts)
        .unwrap_or(DEFAULT_POLL_MAX_ATTEMPTS);
    if interval_ms == 0 {
        return Err(ConfigError::Invalid {
            key: "RELAY_POLL_INTERVAL_MS",
            value: "0".into(),
        });
    }
    if max_attempts == 0 {
        return Err(ConfigError::Invalid {
            key: "RELAY_POLL_MAX_ATTEMPTS",
            value: "0".into(),
        });
    }

    let bind = pick(env("RELAY_BIND"), http.bind).unwrap_or_else(|| DEFAULT_BIND.into());
    let port = non_blank(env("RELAY_PORT"))
        .or_else(|| non_blank(env("PORT")))
        .unwrap_or_else(|| http.port.unwrap_or(DEFAULT_PORT).to_string());
    let concurrency = non_blank(env("RELAY_HTTP_MAX_CONC"))
        .unwrap_or_else(|| http.concurrency_limit.unwrap_or(DEFAULT_CONCURRENCY).to_string());
    let cors_origins: Vec<String> = match non_blank(env("RELAY_CORS_ORIGINS")) {
        Some(raw) => raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => http.cors_origins.unwrap_or_default(),
    };
    let http = bootstrap::http_config(&bind, &port, &concurrency, &cors_origins)?;

    Ok(RelayConfig {
        gateway: GatewaySettings {
            base_url,
            api_key,
            timeout: Duration::from_secs(timeout_secs),
        },
        relay: RelaySettings {
            assistant_id,
            thread_id,
            instructions,
            poll: PollHint {
                interval_ms,
                max_attempts,
            },
        },
        http,
    })
}
