//! Readiness probe parameters.

use std::time::Duration;

use serde::Deserialize;

/// Route probed when no path is configured; answers once the proxy has
/// finished initializing.
pub const DEFAULT_HEALTH_PATH: &str = "/v1/models";

/// Which HTTP statuses count as "ready".
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReadyPolicy {
    /// Any dispatched response: `200..500` or `101`. A 401 still proves the
    /// server is listening and routing.
    #[default]
    Listening,
    /// Only `2xx` responses.
    Success,
}

impl ReadyPolicy {
    /// Whether `status` satisfies this policy.
    #[must_use]
    pub fn accepts(self, status: u16) -> bool {
        match self {
            Self::Listening => is_ready(status),
            Self::Success => (200..300).contains(&status),
        }
    }
}

/// Default readiness predicate.
#[must_use]
pub fn is_ready(status: u16) -> bool {
    (200..500).contains(&status) || status == 101
}

/// Health-check configuration for one supervised run.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct HealthCheck {
    /// Request path appended to `http://127.0.0.1:{port}`.
    #[serde(default = "default_path")]
    pub path: String,
    /// Key sent as both `Authorization: Bearer` and `x-api-key`.
    ///
    /// Falls back to the first proxy `api-keys` entry when unset.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Status acceptance policy.
    #[serde(default)]
    pub policy: ReadyPolicy,
    /// Delay between probe attempts.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Maximum number of probe attempts.
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Overall deadline for the whole probe; `None` means attempts alone bound it.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Deadline for a single probe request.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_path() -> String {
    DEFAULT_HEALTH_PATH.into()
}

fn default_interval_ms() -> u64 {
    200
}

fn default_retries() -> u32 {
    60
}

fn default_request_timeout_ms() -> u64 {
    2000
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self {
            path: default_path(),
            api_key: None,
            policy: ReadyPolicy::default(),
            interval_ms: default_interval_ms(),
            retries: default_retries(),
            timeout_ms: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl HealthCheck {
    /// Delay between attempts.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Overall probe deadline, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Per-request deadline.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Request path with a guaranteed leading `/`.
    #[must_use]
    pub fn normalized_path(&self) -> String {
        if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        }
    }
}
