//! Interactive login flow.
//!
//! Runs the proxy binary once in login mode for a provider and waits for it
//! to finish. There is no readiness probe: exit code 0 is success, anything
//! else is `AppError::LoginFailed`. The temporary config is removed whatever
//! the outcome.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use tracing::{info, info_span, warn, Instrument};

use crate::models::event::EventSink;
use crate::models::proxy_config::{render_config, ProxyConfig};
use crate::process::launcher::{launch, LaunchSpec, DEFAULT_STOP_GRACE};
use crate::process::materialize::{MaterializedConfig, LOGIN_PREFIX};
use crate::supervisor::lifecycle::attach_log_pipes;
use crate::{AppError, Result};

/// Upstream provider to authenticate against.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum LoginProvider {
    /// Google Gemini (`--login`).
    #[default]
    Gemini,
    /// OpenAI Codex (`--codex-login`).
    Codex,
    /// Anthropic Claude (`--claude-login`).
    Claude,
    /// Qwen (`--qwen-login`).
    Qwen,
    /// iFlow OAuth (`--iflow-login`).
    Iflow,
    /// iFlow cookie import (`--iflow-cookie`).
    IflowCookie,
}

impl LoginProvider {
    /// Every provider, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Gemini,
        Self::Codex,
        Self::Claude,
        Self::Qwen,
        Self::Iflow,
        Self::IflowCookie,
    ];

    /// Command-line flag selecting this provider.
    #[must_use]
    pub fn flag(self) -> &'static str {
        match self {
            Self::Gemini => "--login",
            Self::Codex => "--codex-login",
            Self::Claude => "--claude-login",
            Self::Qwen => "--qwen-login",
            Self::Iflow => "--iflow-login",
            Self::IflowCookie => "--iflow-cookie",
        }
    }

    /// Stable kebab-case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::Codex => "codex",
            Self::Claude => "claude",
            Self::Qwen => "qwen",
            Self::Iflow => "iflow",
            Self::IflowCookie => "iflow-cookie",
        }
    }
}

impl Display for LoginProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoginProvider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|provider| provider.as_str() == s)
            .ok_or_else(|| AppError::Config(format!("unknown login provider: {s}")))
    }
}

/// Everything needed for one login run.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    /// Proxy executable.
    pub binary: PathBuf,
    /// Directory the proxy stores credentials in; created if missing.
    pub auth_dir: PathBuf,
    /// Provider to log in to.
    pub provider: LoginProvider,
    /// Print the auth URL instead of opening a browser.
    pub no_browser: bool,
    /// Cloud project to bind the credentials to.
    pub project_id: Option<String>,
    /// Environment overrides for the child only.
    pub env: BTreeMap<String, String>,
    /// Destination for relayed output.
    pub events: EventSink,
}

impl LoginRequest {
    /// A Gemini login storing credentials in `auth_dir`.
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>, auth_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            auth_dir: auth_dir.into(),
            provider: LoginProvider::default(),
            no_browser: false,
            project_id: None,
            env: BTreeMap::new(),
            events: EventSink::discard(),
        }
    }
}

/// `<flag> --config <path> [--no-browser] [--project_id <id>]`.
#[must_use]
pub fn login_args(
    provider: LoginProvider,
    config_path: &Path,
    no_browser: bool,
    project_id: Option<&str>,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        provider.flag().into(),
        "--config".into(),
        config_path.as_os_str().to_owned(),
    ];
    if no_browser {
        args.push("--no-browser".into());
    }
    if let Some(project_id) = project_id {
        args.push("--project_id".into());
        args.push(project_id.into());
    }
    args
}

/// Run the login flow to completion.
///
/// # Errors
///
/// - `AppError::Io`: the auth dir or config could not be created.
/// - `AppError::Spawn`: the binary could not be launched.
/// - `AppError::LoginFailed`: the login process exited non-zero.
pub async fn login(request: LoginRequest) -> Result<()> {
    let span = info_span!("login", provider = %request.provider);
    login_inner(request).instrument(span).await
}

async fn login_inner(request: LoginRequest) -> Result<()> {
    tokio::fs::create_dir_all(&request.auth_dir)
        .await
        .map_err(|err| {
            AppError::Io(format!(
                "failed to create auth dir {}: {err}",
                request.auth_dir.display()
            ))
        })?;

    let options = ProxyConfig {
        auth_dir: Some(request.auth_dir.clone()),
        ..ProxyConfig::default()
    };
    // The proxy does not listen in login mode.
    let rendered = render_config(&options, 0)?;
    let config = MaterializedConfig::write(LOGIN_PREFIX, &rendered).await?;

    let spec = LaunchSpec {
        binary: request.binary.clone(),
        args: login_args(
            request.provider,
            config.path(),
            request.no_browser,
            request.project_id.as_deref(),
        ),
        env: request.env.clone(),
        stop_grace: DEFAULT_STOP_GRACE,
    };
    let mut process = match launch(&spec) {
        Ok(process) => process,
        Err(err) => {
            config.remove();
            return Err(err);
        }
    };

    info!(pid = process.pid().unwrap_or(0), "login flow started");
    attach_log_pipes(&mut process, &request.events);

    let code = process.wait().await;
    config.remove();

    if code == 0 {
        info!("login flow completed");
        Ok(())
    } else {
        warn!(code, "login flow failed");
        Err(AppError::LoginFailed { code })
    }
}
