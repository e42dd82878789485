use std::time::Duration;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "taxdesk";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
/// Status refetch interval for documents still being processed.
pub const DEFAULT_POLL_SECS: u64 = 10;
/// Dashboard refresh interval (5 minutes).
pub const DEFAULT_DASHBOARD_REFRESH_SECS: u64 = 300;
pub const DEFAULT_MAX_UPLOAD_MB: u64 = 25;
const BYTES_PER_MB: u64 = 1024 * 1024;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },

    #[error("{var} must be greater than zero")]
    Zero { var: &'static str },
}

/// Client configuration. Defaults suit a local development API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub workspace_id: String,
    /// Bearer token attached to every request, when present.
    pub api_token: Option<String>,
    pub request_timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub dashboard_refresh_secs: u64,
    pub max_upload_mb: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            workspace_id: "default".to_string(),
            api_token: None,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            poll_interval_secs: DEFAULT_POLL_SECS,
            dashboard_refresh_secs: DEFAULT_DASHBOARD_REFRESH_SECS,
            max_upload_mb: DEFAULT_MAX_UPLOAD_MB,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `TAXDESK_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("TAXDESK_API_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(ws) = lookup("TAXDESK_WORKSPACE") {
            config.workspace_id = ws;
        }
        config.api_token = lookup("TAXDESK_API_TOKEN").filter(|t| !t.is_empty());

        config.request_timeout_secs =
            parse_positive(&lookup, "TAXDESK_TIMEOUT_SECS", config.request_timeout_secs)?;
        config.poll_interval_secs =
            parse_positive(&lookup, "TAXDESK_POLL_SECS", config.poll_interval_secs)?;
        config.dashboard_refresh_secs = parse_positive(
            &lookup,
            "TAXDESK_DASHBOARD_REFRESH_SECS",
            config.dashboard_refresh_secs,
        )?;
        config.max_upload_mb = parse_positive(&lookup, "TAXDESK_MAX_UPLOAD_MB", config.max_upload_mb)?;
        if config.max_upload_mb.checked_mul(BYTES_PER_MB).is_none() {
            return Err(ConfigError::InvalidValue {
                var: "TAXDESK_MAX_UPLOAD_MB",
                value: config.max_upload_mb.to_string(),
            });
        }

        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn dashboard_refresh(&self) -> Duration {
        Duration::from_secs(self.dashboard_refresh_secs)
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb.saturating_mul(BYTES_PER_MB)
    }
}

fn parse_positive<F>(lookup: &F, var: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => {
            let value: u64 = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue { var, value: raw.clone() })?;
            if value == 0 {
                return Err(ConfigError::Zero { var });
            }
            Ok(value)
        }
    }
}

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "taxdesk=debug,reqwest=info"
    } else {
        "taxdesk=info,reqwest=warn"
    }
}
