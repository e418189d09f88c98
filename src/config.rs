//! Runner configuration parsing and validation.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::binary::LATEST_VERSION;
use crate::models::event::EventSink;
use crate::models::health::HealthCheck;
use crate::models::proxy_config::{default_auth_dir, ProxyConfig};
use crate::supervisor::{LoginProvider, LoginRequest, StartRequest};
use crate::{AppError, Result};

/// Login defaults used by the `login` command.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LoginSettings {
    /// Credentials directory; defaults to the proxy's `auth-dir`, then
    /// `$HOME/.cli-proxy-api`.
    #[serde(default)]
    pub auth_dir: Option<PathBuf>,
    /// Provider to authenticate against.
    #[serde(default)]
    pub provider: LoginProvider,
    /// Do not open a browser.
    #[serde(default)]
    pub no_browser: bool,
    /// Cloud project id.
    #[serde(default)]
    pub project_id: Option<String>,
}

fn default_version() -> String {
    LATEST_VERSION.into()
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".cliproxy-cache").join("bin")
}

fn default_stop_grace_seconds() -> u64 {
    5
}

/// Runner configuration parsed from a TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct RunnerConfig {
    /// Proxy release to download when `binary_path` is unset.
    #[serde(default = "default_version")]
    pub version: String,
    /// Use this executable instead of downloading one.
    #[serde(default)]
    pub binary_path: Option<PathBuf>,
    /// Download cache root.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Preferred listen port.
    #[serde(default)]
    pub port: Option<u16>,
    /// Environment overrides for the proxy process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Readiness probe parameters.
    #[serde(default)]
    pub health_check: HealthCheck,
    /// Seconds between `SIGTERM` and a hard kill on stop.
    #[serde(default = "default_stop_grace_seconds")]
    pub stop_grace_seconds: u64,
    /// Options rendered into the proxy's own config (kebab-case keys).
    #[serde(default)]
    pub proxy: ProxyConfig,
    /// Login command defaults.
    #[serde(default)]
    pub login: LoginSettings,
}

impl RunnerConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read, contains
    /// invalid TOML, or fails validation.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check semantic constraints serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(AppError::Config("version must not be empty".into()));
        }
        if self.port == Some(0) {
            return Err(AppError::Config(
                "port must be between 1 and 65535; omit it for an ephemeral port".into(),
            ));
        }
        if self.health_check.retries == 0 {
            return Err(AppError::Config(
                "health_check.retries must be at least 1".into(),
            ));
        }
        if self.health_check.request_timeout_ms == 0 {
            return Err(AppError::Config(
                "health_check.request_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.health_check.timeout_ms == Some(0) {
            return Err(AppError::Config(
                "health_check.timeout_ms must be greater than 0 when set".into(),
            ));
        }
        Ok(())
    }

    /// Stop grace period.
    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_seconds)
    }

    /// Build a start request for `binary` that reports to `events`.
    #[must_use]
    pub fn start_request(&self, binary: PathBuf, events: EventSink) -> StartRequest {
        StartRequest {
            binary,
            port: self.port,
            config: self.proxy.clone(),
            env: self.env.clone(),
            health: self.health_check.clone(),
            stop_grace: self.stop_grace(),
            events,
        }
    }

    /// Build a login request for `binary` that reports to `events`.
    #[must_use]
    pub fn login_request(&self, binary: PathBuf, events: EventSink) -> LoginRequest {
        let auth_dir = self
            .login
            .auth_dir
            .clone()
            .or_else(|| self.proxy.auth_dir.clone())
            .unwrap_or_else(default_auth_dir);
        LoginRequest {
            binary,
            auth_dir,
            provider: self.login.provider,
            no_browser: self.login.no_browser,
            project_id: self.login.project_id.clone(),
            env: self.env.clone(),
            events,
        }
    }
}
