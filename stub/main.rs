#![forbid(unsafe_code)]

//! `cliproxy-stub` stands in for the CLIProxyAPI server binary.
//!
//! It accepts the same flags, reads `port` from the YAML config, and serves
//! `GET /v1/models` on `127.0.0.1`. Behaviour is steered through environment
//! variables:
//!
//! | Variable               | Effect                                                  |
//! |------------------------|---------------------------------------------------------|
//! | `STUB_EXIT_CODE`       | exit with this code without listening                   |
//! | `STUB_EXIT_DELAY_MS`   | delay before `STUB_EXIT_CODE` takes effect              |
//! | `STUB_STARTUP_DELAY_MS`| delay before binding the port                           |
//! | `STUB_HEALTH_STATUS`   | status code returned by `/v1/models` (default 200)      |
//! | `STUB_CRASH_AFTER_MS`  | exit with code 3 this long after listening              |
//! | `STUB_EXIT_AFTER_FIRST_REQUEST` | exit with this code just after answering the first `/v1/models` |
//! | `STUB_IGNORE_SIGTERM`  | swallow `SIGTERM` so only a kill stops the process      |
//! | `STUB_LOGIN_EXIT_CODE` | exit code of a login run (default 0)                    |

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use serde_json::json;

use cliproxy_runner::{AppError, Result};

/// Exit code used when `STUB_CRASH_AFTER_MS` fires.
const CRASH_EXIT_CODE: i32 = 3;

#[derive(Debug, Parser)]
#[command(name = "cliproxy-stub", about = "Stand-in CLIProxyAPI server")]
#[allow(clippy::struct_excessive_bools)]
struct Args {
    /// Config file written by the supervisor.
    #[arg(long)]
    config: PathBuf,

    #[arg(long)]
    login: bool,
    #[arg(long = "codex-login")]
    codex_login: bool,
    #[arg(long = "claude-login")]
    claude_login: bool,
    #[arg(long = "qwen-login")]
    qwen_login: bool,
    #[arg(long = "iflow-login")]
    iflow_login: bool,
    #[arg(long = "iflow-cookie")]
    iflow_cookie: bool,

    #[arg(long = "no-browser")]
    no_browser: bool,
    #[arg(long = "project_id")]
    project_id: Option<String>,
}

impl Args {
    fn login_provider(&self) -> Option<&'static str> {
        [
            (self.login, "gemini"),
            (self.codex_login, "codex"),
            (self.claude_login, "claude"),
            (self.qwen_login, "qwen"),
            (self.iflow_login, "iflow"),
            (self.iflow_cookie, "iflow-cookie"),
        ]
        .into_iter()
        .find_map(|(set, name)| set.then_some(name))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    println!("config: {}", args.config.display());
    eprintln!("stub starting pid={}", std::process::id());

    if let Some(provider) = args.login_provider() {
        println!(
            "login provider={provider} no_browser={} project_id={}",
            args.no_browser,
            args.project_id.as_deref().unwrap_or("-")
        );
        std::process::exit(env_or("STUB_LOGIN_EXIT_CODE", 0));
    }

    let shutdown = shutdown_signal()?;

    if let Some(code) = env_value::<i32>("STUB_EXIT_CODE") {
        sleep_ms(env_or("STUB_EXIT_DELAY_MS", 0)).await;
        eprintln!("stub exiting early with code {code}");
        std::process::exit(code);
    }

    sleep_ms(env_or("STUB_STARTUP_DELAY_MS", 0)).await;

    let port = read_port(&args.config).await?;
    let status = StatusCode::from_u16(env_or("STUB_HEALTH_STATUS", 200))
        .map_err(|err| AppError::Config(format!("invalid STUB_HEALTH_STATUS: {err}")))?;

    let exit_after_first = env_value::<i32>("STUB_EXIT_AFTER_FIRST_REQUEST");
    let answered = Arc::new(AtomicBool::new(false));

    let app = Router::new().route(
        "/v1/models",
        get(move |headers: HeaderMap| {
            let answered = Arc::clone(&answered);
            async move {
                let key = headers
                    .get("x-api-key")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");
                println!("health request x-api-key={key}");
                if let Some(code) = exit_after_first {
                    if !answered.swap(true, Ordering::SeqCst) {
                        exit_after_response(code);
                    }
                }
                (status, Json(json!({ "object": "list", "data": [] })))
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
        .await
        .map_err(|err| AppError::Io(format!("failed to bind port {port}: {err}")))?;
    println!("listening on 127.0.0.1:{port}");

    if let Some(delay) = env_value::<u64>("STUB_CRASH_AFTER_MS") {
        tokio::spawn(async move {
            sleep_ms(delay).await;
            eprintln!("stub crashing");
            std::process::exit(CRASH_EXIT_CODE);
        });
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|err| AppError::Io(format!("server error: {err}")))?;

    println!("stub stopped");
    Ok(())
}

/// Exit with `code` right after the current response has been handed back.
fn exit_after_response(code: i32) {
    tokio::spawn(async move {
        sleep_ms(1).await;
        eprintln!("stub exiting after first request with code {code}");
        std::process::exit(code);
    });
}

async fn read_port(path: &Path) -> Result<u16> {
    let raw = tokio::fs::read_to_string(path).await?;
    let doc: serde_yaml::Value = serde_yaml::from_str(&raw)?;
    doc.get("port")
        .and_then(serde_yaml::Value::as_u64)
        .and_then(|port| u16::try_from(port).ok())
        .ok_or_else(|| AppError::Config("config has no usable port".into()))
}

/// Registers the `SIGTERM` handler immediately so a signal arriving before
/// the server is polled is not lost.
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let ignore = std::env::var_os("STUB_IGNORE_SIGTERM").is_some();
    Ok(async move {
        while sigterm.recv().await.is_some() {
            if ignore {
                eprintln!("stub ignoring SIGTERM");
                continue;
            }
            eprintln!("stub received SIGTERM");
            return;
        }
        std::future::pending::<()>().await;
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    Ok(async {
        let _ = tokio::signal::ctrl_c().await;
    })
}

fn env_value<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|raw| raw.parse().ok())
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env_value(name).unwrap_or(default)
}

async fn sleep_ms(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}
