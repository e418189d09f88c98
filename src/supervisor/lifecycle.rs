//! Proxy lifecycle controller.
//!
//! [`start`] allocates a port, materializes the config, launches the proxy,
//! and then races the readiness probe against the process exiting:
//!
//! | First to finish     | Outcome                                                     |
//! |---------------------|-------------------------------------------------------------|
//! | readiness probe     | `Ready` emitted, [`RunningProxy`] returned                  |
//! | process exit        | `Exited` emitted, config removed, `PrematureExit` returned  |
//! | probe gives up      | `ReadinessTimeout` returned, carrying the running proxy     |
//!
//! `Exited` is emitted by a single exit reporter per process, so it is seen
//! exactly once whether the process crashes on its own or is stopped.
//! `Ready` and `Exited` both pass through one [`StatusGate`]: once an exit
//! is recorded, `Ready` is never emitted and a probe success that lost the
//! race becomes `PrematureExit`.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::models::event::{EventSink, LifecycleStatus, LogSource};
use crate::models::health::HealthCheck;
use crate::models::proxy_config::{render_config, ProxyConfig};
use crate::process::launcher::{
    launch, wait_for_exit, LaunchSpec, ProcessHandle, DEFAULT_STOP_GRACE, UNKNOWN_EXIT_CODE,
};
use crate::process::lines::spawn_pipe;
use crate::process::materialize::{MaterializedConfig, SERVER_PREFIX};
use crate::process::ports::allocate_port;
use crate::supervisor::readiness::{base_url, ReadinessProbe};
use crate::{AppError, Result};

/// Everything needed to start one supervised proxy run.
#[derive(Debug, Clone)]
pub struct StartRequest {
    /// Proxy executable.
    pub binary: PathBuf,
    /// Preferred listen port; falls back to `config.port`, then to an
    /// ephemeral port.
    pub port: Option<u16>,
    /// Proxy options rendered into the config file.
    pub config: ProxyConfig,
    /// Environment overrides for the child only.
    pub env: BTreeMap<String, String>,
    /// Readiness probe parameters.
    pub health: HealthCheck,
    /// Time between `SIGTERM` and a hard kill on stop.
    pub stop_grace: Duration,
    /// Destination for status and log events.
    pub events: EventSink,
}

impl StartRequest {
    /// A request with default health check, no overrides, and no sink.
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>, config: ProxyConfig) -> Self {
        Self {
            binary: binary.into(),
            port: None,
            config,
            env: BTreeMap::new(),
            health: HealthCheck::default(),
            stop_grace: DEFAULT_STOP_GRACE,
            events: EventSink::discard(),
        }
    }

    /// Prefer `port` for the proxy.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set one environment override.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Replace the health-check parameters.
    #[must_use]
    pub fn with_health(mut self, health: HealthCheck) -> Self {
        self.health = health;
        self
    }

    /// Replace the stop grace period.
    #[must_use]
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Deliver events to `events`.
    #[must_use]
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Health check with the API key defaulted from the proxy's first
    /// `api-keys` entry.
    fn effective_health(&self) -> HealthCheck {
        let mut health = self.health.clone();
        if health.api_key.is_none() {
            health.api_key = self.config.first_api_key().map(str::to_owned);
        }
        health
    }
}

/// A proxy that answered its readiness probe.
///
/// Owns the process and its config. [`RunningProxy::stop`] shuts it down and
/// cleans up; dropping it without stopping terminates the process and
/// removes the config without waiting.
#[derive(Debug)]
pub struct RunningProxy {
    url: String,
    port: u16,
    config: MaterializedConfig,
    process: ProcessHandle,
    exit: watch::Receiver<Option<i32>>,
}

impl RunningProxy {
    /// Base URL, `http://127.0.0.1:{port}`.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Listen port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Path of the materialized config file.
    #[must_use]
    pub fn config_path(&self) -> &Path {
        self.config.path()
    }

    /// OS process id.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.process.pid()
    }

    /// Exit code if the process has already exited and been reported.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        *self.exit.borrow()
    }

    /// Current lifecycle state: `Ready` until the exit is reported.
    #[must_use]
    pub fn state(&self) -> LifecycleStatus {
        match self.exit_code() {
            Some(code) => LifecycleStatus::Exited { code },
            None => LifecycleStatus::Ready,
        }
    }

    /// Wait for the process to exit on its own, without requesting it.
    pub async fn wait(&self) -> i32 {
        wait_for_exit(self.exit.clone()).await
    }

    /// Terminate the process, wait for it, and remove the config directory.
    ///
    /// `Exited` has been emitted by the time this returns. Termination and
    /// cleanup are best effort; the observed exit code is returned, or
    /// `-1` when unknown.
    pub async fn stop(self) -> i32 {
        info!(port = self.port, pid = self.pid().unwrap_or(0), "stopping proxy");
        self.process.terminate();
        let code = wait_for_exit(self.exit.clone()).await;
        self.config.remove();
        code
    }
}

/// Start the proxy and wait until it is ready or has failed.
///
/// # Errors
///
/// - `AppError::PortAllocation`: no port could be bound.
/// - `AppError::Config` / `AppError::Io`: the config could not be rendered or written.
/// - `AppError::Spawn`: the binary could not be launched.
/// - `AppError::PrematureExit`: the process exited before it was ready.
/// - `AppError::ReadinessTimeout`: the probe gave up; the proxy is still
///   running and can be reclaimed with [`ReadinessTimeout::take_proxy`](crate::errors::ReadinessTimeout::take_proxy).
pub async fn start(request: StartRequest) -> Result<RunningProxy> {
    let span = info_span!("start_proxy", binary = %request.binary.display());
    start_inner(request).instrument(span).await
}

async fn start_inner(request: StartRequest) -> Result<RunningProxy> {
    let events = request.events.clone();

    let port = allocate_port(request.port.or(request.config.port)).await?;
    let probe = ReadinessProbe::new(port, &request.effective_health())?;
    let rendered = render_config(&request.config, port)?;
    let config = MaterializedConfig::write(SERVER_PREFIX, &rendered).await?;

    events.status(LifecycleStatus::Starting);
    info!(port, config = %config.path().display(), "starting proxy");

    let spec = LaunchSpec {
        binary: request.binary.clone(),
        args: server_args(config.path()),
        env: request.env.clone(),
        stop_grace: request.stop_grace,
    };
    let mut process = match launch(&spec) {
        Ok(process) => process,
        Err(err) => {
            warn!(%err, "proxy failed to launch");
            events.status(LifecycleStatus::Exited {
                code: UNKNOWN_EXIT_CODE,
            });
            config.remove();
            return Err(err);
        }
    };

    attach_log_pipes(&mut process, &events);
    let gone = CancellationToken::new();
    let gate = StatusGate::new(events.clone());
    let exit = spawn_exit_reporter(process.exit_watch(), gate.clone(), gone.clone());

    let outcome = tokio::select! {
        biased;
        code = wait_for_exit(exit.clone()) => Err(code),
        ready = probe.wait_until_ready(&gone) => Ok(ready),
    };

    match outcome {
        Err(code) => premature_exit(code, config),
        Ok(Err(_)) if exit.borrow().is_some() => {
            let code = wait_for_exit(exit).await;
            premature_exit(code, config)
        }
        Ok(Ok(())) => {
            if !gate.ready().await {
                let code = wait_for_exit(exit).await;
                return premature_exit(code, config);
            }
            let url = base_url(port);
            info!(%url, pid = process.pid().unwrap_or(0), "proxy ready");
            Ok(RunningProxy {
                url,
                port,
                config,
                process,
                exit,
            })
        }
        Ok(Err(AppError::ReadinessTimeout(mut timeout))) => {
            warn!(
                url = %timeout.url,
                attempts = timeout.attempts,
                "proxy not ready, leaving it running for the caller"
            );
            timeout.proxy = Some(RunningProxy {
                url: base_url(port),
                port,
                config,
                process,
                exit,
            });
            Err(AppError::ReadinessTimeout(timeout))
        }
        Ok(Err(err)) => Err(err),
    }
}

fn premature_exit(code: i32, config: MaterializedConfig) -> Result<RunningProxy> {
    warn!(code, "proxy exited before it became ready");
    config.remove();
    Err(AppError::PrematureExit { code })
}

/// `--config <path>`.
#[must_use]
pub fn server_args(config_path: &Path) -> Vec<OsString> {
    vec!["--config".into(), config_path.as_os_str().to_owned()]
}

/// Relay stdout and stderr of `process` to `events` on their own tasks.
pub(crate) fn attach_log_pipes(
    process: &mut ProcessHandle,
    events: &EventSink,
) -> Vec<JoinHandle<usize>> {
    let mut pipes = Vec::with_capacity(2);
    if let Some(stdout) = process.take_stdout() {
        pipes.push(spawn_pipe(stdout, LogSource::Stdout, events.clone()));
    }
    if let Some(stderr) = process.take_stderr() {
        pipes.push(spawn_pipe(stderr, LogSource::Stderr, events.clone()));
    }
    pipes
}

/// Orders `Ready` against `Exited` for one process.
///
/// Both transitions take the same lock, so a listener never sees `Ready`
/// after `Exited`.
#[derive(Debug, Clone)]
struct StatusGate {
    exited: Arc<Mutex<bool>>,
    events: EventSink,
}

impl StatusGate {
    fn new(events: EventSink) -> Self {
        Self {
            exited: Arc::new(Mutex::new(false)),
            events,
        }
    }

    /// Emit `Ready` unless the exit was already recorded.
    async fn ready(&self) -> bool {
        let exited = self.exited.lock().await;
        if *exited {
            return false;
        }
        self.events.status(LifecycleStatus::Ready);
        true
    }

    async fn exited(&self, code: i32) {
        let mut exited = self.exited.lock().await;
        *exited = true;
        self.events.status(LifecycleStatus::Exited { code });
    }
}

/// Record the exit through `gate` once the process exits, then publish the
/// code and cancel `gone`.
///
/// The returned receiver only carries a code after `Exited` went out, so
/// anyone waiting on it observes `Exited` first.
fn spawn_exit_reporter(
    process_exit: watch::Receiver<Option<i32>>,
    gate: StatusGate,
    gone: CancellationToken,
) -> watch::Receiver<Option<i32>> {
    let (tx, rx) = watch::channel(None);
    tokio::spawn(async move {
        let code = wait_for_exit(process_exit).await;
        info!(code, "proxy exited");
        gate.exited(code).await;
        tx.send_replace(Some(code));
        gone.cancel();
    });
    rx
}
