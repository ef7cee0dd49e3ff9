use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::endpoint::Credentials;

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_TIME_THRESHOLD: Duration = Duration::from_millis(300_000);

const ENV_PREFIX: &str = "LOGBATCH_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required but not set")]
    Missing(&'static str),

    #[error("LOGBATCH_URL is not a valid URL: {0}")]
    InvalidUrl(String),

    #[error("{0} has invalid value: {1}")]
    InvalidNumeric(String, String),

    #[error("{0} has invalid value: {1} (expected \"true\" or \"false\")")]
    InvalidBool(String, String),

    #[error("batch size must be greater than zero")]
    ZeroBatchSize,

    #[error("failed to read config file {}: {source}", path.display())]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Dispatcher configuration. Immutable once built.
#[derive(Debug, Clone)]
pub struct Config {
    pub url: Url,
    pub organization: String,
    pub stream_name: String,
    pub auth: Credentials,
    pub batch_size: usize,
    pub time_threshold: Duration,
    pub silent_success: bool,
    pub silent_error: bool,
    /// Deadline for a single delivery request. `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
}

impl Config {
    /// Required options only; everything else takes its default.
    pub fn new(
        url: Url,
        organization: impl Into<String>,
        stream_name: impl Into<String>,
        auth: Credentials,
    ) -> Self {
        Self {
            url,
            organization: organization.into(),
            stream_name: stream_name.into(),
            auth,
            batch_size: DEFAULT_BATCH_SIZE,
            time_threshold: DEFAULT_TIME_THRESHOLD,
            silent_success: false,
            silent_error: false,
            request_timeout: None,
        }
    }

    /// Load from `LOGBATCH_CONFIG_FILE` when set, otherwise from `LOGBATCH_*`
    /// environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> = env::vars()
            .filter(|(k, _)| k.starts_with(ENV_PREFIX))
            .collect();

        match vars.get("LOGBATCH_CONFIG_FILE").filter(|s| !s.is_empty()) {
            Some(path) => Self::from_file(path),
            None => Self::parse(&vars),
        }
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let raw = std::fs::read_to_string(&path)
            .map_err(|source| ConfigError::ReadFile { path, source })?;
        Self::from_json(&raw)
    }

    /// Parse the JSON option surface (`url`, `organization`, `streamName`,
    /// `auth`, `batchSize`, `timeThreshold`, `silentSuccess`, `silentError`,
    /// `requestTimeout`).
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let opts: JsonOptions = serde_json::from_str(raw)?;

        let url = Url::parse(&opts.url).map_err(|_| ConfigError::InvalidUrl(opts.url.clone()))?;
        let organization = require_non_empty(opts.organization, "organization")?;
        let stream_name = require_non_empty(opts.stream_name, "streamName")?;
        let batch_size = non_zero(opts.batch_size.unwrap_or(DEFAULT_BATCH_SIZE))?;

        Ok(Self {
            url,
            organization,
            stream_name,
            auth: Credentials::new(opts.auth.username, opts.auth.password),
            batch_size,
            time_threshold: opts
                .time_threshold
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_TIME_THRESHOLD),
            silent_success: opts.silent_success.unwrap_or(false),
            silent_error: opts.silent_error.unwrap_or(false),
            request_timeout: opts.request_timeout.map(Duration::from_millis),
        })
    }

    fn parse(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let url = parse_url(vars)?;
        let organization = parse_required(vars, "LOGBATCH_ORGANIZATION")?;
        let stream_name = parse_required(vars, "LOGBATCH_STREAM_NAME")?;
        let username = parse_required(vars, "LOGBATCH_USERNAME")?;
        let password = vars
            .get("LOGBATCH_PASSWORD")
            .cloned()
            .ok_or(ConfigError::Missing("LOGBATCH_PASSWORD"))?;
        let batch_size = non_zero(parse_numeric(
            vars,
            "LOGBATCH_BATCH_SIZE",
            DEFAULT_BATCH_SIZE,
        )?)?;
        let time_threshold = Duration::from_millis(parse_numeric(
            vars,
            "LOGBATCH_TIME_THRESHOLD_MS",
            DEFAULT_TIME_THRESHOLD.as_millis() as u64,
        )?);
        let silent_success = parse_bool(vars, "LOGBATCH_SILENT_SUCCESS")?;
        let silent_error = parse_bool(vars, "LOGBATCH_SILENT_ERROR")?;
        let request_timeout = parse_timeout(vars, "LOGBATCH_REQUEST_TIMEOUT_MS")?;

        Ok(Self {
            url,
            organization,
            stream_name,
            auth: Credentials::new(username, password),
            batch_size,
            time_threshold,
            silent_success,
            silent_error,
            request_timeout,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonOptions {
    url: String,
    organization: String,
    stream_name: String,
    auth: JsonAuth,
    batch_size: Option<usize>,
    time_threshold: Option<u64>,
    silent_success: Option<bool>,
    silent_error: Option<bool>,
    request_timeout: Option<u64>,
}

#[derive(Deserialize)]
struct JsonAuth {
    username: String,
    password: String,
}

fn parse_url(vars: &HashMap<String, String>) -> Result<Url, ConfigError> {
    let raw = vars
        .get("LOGBATCH_URL")
        .filter(|s| !s.is_empty())
        .ok_or(ConfigError::Missing("LOGBATCH_URL"))?;

    Url::parse(raw).map_err(|_| ConfigError::InvalidUrl(raw.clone()))
}

fn parse_required(
    vars: &HashMap<String, String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    vars.get(name)
        .filter(|s| !s.is_empty())
        .cloned()
        .ok_or(ConfigError::Missing(name))
}

fn require_non_empty(value: String, name: &'static str) -> Result<String, ConfigError> {
    if value.is_empty() {
        Err(ConfigError::Missing(name))
    } else {
        Ok(value)
    }
}

fn non_zero(batch_size: usize) -> Result<usize, ConfigError> {
    if batch_size == 0 {
        Err(ConfigError::ZeroBatchSize)
    } else {
        Ok(batch_size)
    }
}

fn parse_numeric<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError> {
    match vars.get(name) {
        Some(val) => val
            .parse()
            .map_err(|_| ConfigError::InvalidNumeric(name.to_owned(), val.clone())),
        None => Ok(default),
    }
}

fn parse_bool(vars: &HashMap<String, String>, name: &str) -> Result<bool, ConfigError> {
    match vars.get(name).map(|s| s.as_str()) {
        None | Some("") | Some("false") | Some("0") => Ok(false),
        Some("true") | Some("1") => Ok(true),
        Some(other) => Err(ConfigError::InvalidBool(name.to_owned(), other.to_owned())),
    }
}

fn parse_timeout(
    vars: &HashMap<String, String>,
    name: &str,
) -> Result<Option<Duration>, ConfigError> {
    match vars.get(name).filter(|s| !s.is_empty()) {
        Some(val) => {
            let ms: u64 = val
                .parse()
                .map_err(|_| ConfigError::InvalidNumeric(name.to_owned(), val.clone()))?;
            Ok(Some(Duration::from_millis(ms)))
        }
        None => Ok(None),
    }
}
