#![forbid(unsafe_code)]

//! `cliproxy-runner`: run or log in to a supervised CLIProxyAPI instance.
//!
//! Loads the runner TOML, resolves the proxy binary (explicit path or cached
//! release download), and either keeps a proxy running until ctrl-c/SIGTERM
//! or performs the interactive login flow.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::mpsc;
use tracing::{info, info_span, warn, Instrument};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use cliproxy_runner::binary::{BinarySource, LocalBinary, ReleaseDownloader};
use cliproxy_runner::supervisor::{login, start, LoginProvider};
use cliproxy_runner::{AppError, EventSink, LifecycleStatus, Result, RunnerConfig, SupervisorEvent};

/// How long to keep relaying output after the command finished.
const RELAY_DRAIN: Duration = Duration::from_secs(2);

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "cliproxy-runner", about = "Supervise a CLIProxyAPI server", version, long_about = None)]
struct Cli {
    /// Path to the runner TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the proxy and keep it running until interrupted.
    Run,

    /// Run the interactive login flow for a provider.
    Login {
        /// Provider: gemini, codex, claude, qwen, iflow, or iflow-cookie.
        #[arg(long)]
        provider: Option<String>,

        /// Print the auth URL instead of opening a browser.
        #[arg(long)]
        no_browser: bool,

        /// Cloud project id to bind the credentials to.
        #[arg(long)]
        project_id: Option<String>,
    },
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = RunnerConfig::load_from_path(&args.config)?;
    info!(config = %args.config.display(), "configuration loaded");

    let binary = resolve_binary(&config).await?;
    let (events, rx) = EventSink::channel();
    let relay = tokio::spawn(relay_events(rx));

    let result = match args.command {
        Command::Run => serve(&config, binary, events).await,
        Command::Login {
            provider,
            no_browser,
            project_id,
        } => {
            if let Some(provider) = provider {
                config.login.provider = provider.parse::<LoginProvider>()?;
            }
            config.login.no_browser |= no_browser;
            if project_id.is_some() {
                config.login.project_id = project_id;
            }
            login(config.login_request(binary, events)).await
        }
    };

    // Output pipes can outlive the proxy if it left children behind.
    let _ = tokio::time::timeout(RELAY_DRAIN, relay).await;
    result
}

async fn resolve_binary(config: &RunnerConfig) -> Result<PathBuf> {
    match &config.binary_path {
        Some(path) => LocalBinary::new(path).ensure_binary(&config.version).await,
        None => {
            ReleaseDownloader::new(&config.cache_dir)?
                .ensure_binary(&config.version)
                .await
        }
    }
}

async fn serve(config: &RunnerConfig, binary: PathBuf, events: EventSink) -> Result<()> {
    let shutdown = shutdown_signal()?;
    let proxy = match start(config.start_request(binary, events)).await {
        Ok(proxy) => proxy,
        Err(AppError::ReadinessTimeout(mut timeout)) => {
            if let Some(proxy) = timeout.take_proxy() {
                proxy.stop().await;
            }
            return Err(AppError::ReadinessTimeout(timeout));
        }
        Err(err) => return Err(err),
    };

    let span = info_span!("proxy", url = proxy.url(), pid = proxy.pid().unwrap_or(0));
    async move {
        info!(config = %proxy.config_path().display(), "proxy running");
        tokio::select! {
            signal = shutdown => info!(%signal, "stopping proxy"),
            code = proxy.wait() => warn!(code, "proxy exited unexpectedly"),
        }
        let code = proxy.stop().await;
        info!(code, "proxy stopped");
    }
    .instrument(span)
    .await;
    Ok(())
}

async fn relay_events(mut rx: mpsc::UnboundedReceiver<SupervisorEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            SupervisorEvent::Log(line) => {
                info!(target: "proxy", source = %line.source, "{}", line.text);
            }
            SupervisorEvent::Status(LifecycleStatus::Exited { code }) if code != 0 => {
                warn!(code, "proxy status: exited");
            }
            SupervisorEvent::Status(status) => info!(?status, "proxy status"),
        }
    }
}

/// Signal that ended a `run`.
#[derive(Debug, Clone, Copy)]
enum StopSignal {
    Interrupt,
    Terminate,
}

impl std::fmt::Display for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
        })
    }
}

/// Resolves with the first of ctrl-c or, on unix, `SIGTERM`.
///
/// The `SIGTERM` handler is installed before the proxy starts, so a
/// terminate sent during startup stops the proxy once it is running.
fn shutdown_signal() -> Result<impl Future<Output = StopSignal>> {
    #[cfg(unix)]
    let mut sigterm =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .map_err(|err| AppError::Io(format!("failed to install SIGTERM handler: {err}")))?;
    #[cfg(not(unix))]
    let mut sigterm = ();

    Ok(async move {
        tokio::select! {
            () = interrupted() => StopSignal::Interrupt,
            () = terminated(&mut sigterm) => StopSignal::Terminate,
        }
    })
}

async fn interrupted() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminated(sigterm: &mut tokio::signal::unix::Signal) {
    if sigterm.recv().await.is_none() {
        std::future::pending::<()>().await;
    }
}

#[cfg(not(unix))]
async fn terminated(_: &mut ()) {
    std::future::pending::<()>().await;
}

/// Runner logs at `info`, relayed proxy output under the `proxy` target,
/// and dependencies only at `warn`. `RUST_LOG` replaces all of it.
const DEFAULT_LOG_FILTER: &str = "warn,cliproxy_runner=info,proxy=info";

fn init_tracing(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let output = match format {
        LogFormat::Text => fmt::layer().boxed(),
        LogFormat::Json => fmt::layer().json().with_current_span(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init()
        .map_err(|err| AppError::Config(format!("failed to install log subscriber: {err}")))
}
