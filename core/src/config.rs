use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use url::Url;

pub const HOME_ENV_VAR: &str = "IMAGESEARCH_HOME";
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("could not determine the home directory")]
    NoHome,
}

/// What to do with a response that arrives after the UI timeout already
/// fired while its request is still the latest one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LateResponsePolicy {
    /// Render it and repopulate the result index.
    #[default]
    Render,
    /// Keep showing "Timed out." and discard it.
    Drop,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchSettings {
    /// Quiet window for collapsing input events.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Client-side timeout for a search, independent of the call deadline.
    #[serde(default = "default_search_timeout_ms")]
    pub timeout_ms: u64,

    /// Shorter queries never reach the backend.
    #[serde(default = "default_min_query_chars")]
    pub min_query_chars: usize,

    #[serde(default)]
    pub late_response: LateResponsePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Refresh endpoint used together with `IMAGESEARCH_REFRESH_TOKEN`.
    #[serde(default)]
    pub token_endpoint: Option<String>,

    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    /// Per-attempt deadline for remote calls.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    #[serde(default)]
    pub search: SearchSettings,
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_retry_limit() -> u32 {
    crate::executor::DEFAULT_RETRY_LIMIT
}

fn default_call_timeout_ms() -> u64 {
    30_000
}

fn default_debounce_ms() -> u64 {
    250
}

fn default_search_timeout_ms() -> u64 {
    10_000
}

fn default_min_query_chars() -> usize {
    3
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            timeout_ms: default_search_timeout_ms(),
            min_query_chars: default_min_query_chars(),
            late_response: LateResponsePolicy::default(),
        }
    }
}

impl SearchSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce_ms == 0 {
            return Err(ConfigError::Invalid("search.debounce_ms must be > 0".into()));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid("search.timeout_ms must be > 0".into()));
        }
        if self.min_query_chars == 0 {
            return Err(ConfigError::Invalid(
                "search.min_query_chars must be > 0".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_endpoint: None,
            retry_limit: default_retry_limit(),
            call_timeout_ms: default_call_timeout_ms(),
            search: SearchSettings::default(),
        }
    }
}

impl ClientConfig {
    /// Loads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.base_url)
            .map_err(|err| ConfigError::Invalid(format!("base_url {:?}: {err}", self.base_url)))?;
        if let Some(endpoint) = &self.token_endpoint {
            Url::parse(endpoint).map_err(|err| {
                ConfigError::Invalid(format!("token_endpoint {endpoint:?}: {err}"))
            })?;
        }
        if self.call_timeout_ms == 0 {
            return Err(ConfigError::Invalid("call_timeout_ms must be > 0".into()));
        }
        self.search.validate()
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// `$IMAGESEARCH_HOME`, or `~/.imagesearch`.
pub fn find_home() -> Result<PathBuf, ConfigError> {
    if let Some(home) = std::env::var_os(HOME_ENV_VAR).filter(|value| !value.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    dirs::home_dir()
        .map(|home| home.join(".imagesearch"))
        .ok_or(ConfigError::NoHome)
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    Ok(find_home()?.join(CONFIG_FILE_NAME))
}
