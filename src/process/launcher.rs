//! Proxy process launcher.
//!
//! Spawns the proxy binary with:
//! - the caller's environment overrides merged over the inherited environment;
//! - stdin closed and stdout/stderr piped for the log multiplexer;
//! - `kill_on_drop(true)` so an abandoned child never outlives the runtime.
//!
//! The [`Child`] is moved into a watcher task that publishes the exit code on
//! a [`watch`] channel. Termination is requested through a
//! [`CancellationToken`]: the watcher sends `SIGTERM`, waits out the grace
//! period, then kills.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{AppError, Result};

/// Exit code reported when the real one cannot be determined (signal death,
/// wait failure, watcher gone).
pub const UNKNOWN_EXIT_CODE: i32 = -1;

/// Default time a process gets to exit after `SIGTERM` before it is killed.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

/// What to launch and how.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Executable to run.
    pub binary: PathBuf,
    /// Argument vector, excluding the program name.
    pub args: Vec<OsString>,
    /// Variables set on top of the inherited environment.
    pub env: BTreeMap<String, String>,
    /// Time between `SIGTERM` and a hard kill.
    pub stop_grace: Duration,
}

impl LaunchSpec {
    /// Launch `binary` with `args`, no overrides, and the default grace period.
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>, args: Vec<OsString>) -> Self {
        Self {
            binary: binary.into(),
            args,
            env: BTreeMap::new(),
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }
}

/// Control surface of a spawned process.
///
/// Dropping the handle requests termination.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: Option<u32>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    exit: watch::Receiver<Option<i32>>,
    terminate: CancellationToken,
}

impl ProcessHandle {
    /// OS process id, if the process was still running when spawned.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Take the piped stdout; `None` once taken.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Take the piped stderr; `None` once taken.
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.stderr.take()
    }

    /// Ask the process to terminate. Returns immediately; use
    /// [`ProcessHandle::wait`] to observe the exit.
    pub fn terminate(&self) {
        self.terminate.cancel();
    }

    /// Exit code if the process has already exited.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        *self.exit.borrow()
    }

    /// A receiver that observes the exit code once it is known.
    #[must_use]
    pub fn exit_watch(&self) -> watch::Receiver<Option<i32>> {
        self.exit.clone()
    }

    /// Wait for the process to exit. Never fails: an unknown outcome yields
    /// [`UNKNOWN_EXIT_CODE`].
    pub async fn wait(&self) -> i32 {
        wait_for_exit(self.exit.clone()).await
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.terminate.cancel();
    }
}

/// Wait until `exit` carries a code.
///
/// A closed channel without a code yields [`UNKNOWN_EXIT_CODE`].
pub async fn wait_for_exit(mut exit: watch::Receiver<Option<i32>>) -> i32 {
    match exit.wait_for(Option::is_some).await {
        Ok(code) => code.unwrap_or(UNKNOWN_EXIT_CODE),
        Err(_) => UNKNOWN_EXIT_CODE,
    }
}

/// Spawn the process described by `spec`.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns `AppError::Spawn` if the binary does not exist, is not
/// executable, or the OS refuses to start it.
pub fn launch(spec: &LaunchSpec) -> Result<ProcessHandle> {
    let mut cmd = Command::new(&spec.binary);
    cmd.args(&spec.args)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|err| spawn_error(spec, &err))?;

    let pid = child.id();
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    info!(
        pid = pid.unwrap_or(0),
        binary = %spec.binary.display(),
        "proxy process spawned"
    );

    let (exit_tx, exit_rx) = watch::channel(None);
    let terminate = CancellationToken::new();
    tokio::spawn(watch_exit(
        child,
        pid,
        spec.stop_grace,
        terminate.clone(),
        exit_tx,
    ));

    Ok(ProcessHandle {
        pid,
        stdout,
        stderr,
        exit: exit_rx,
        terminate,
    })
}

fn spawn_error(spec: &LaunchSpec, err: &io::Error) -> AppError {
    let binary = spec.binary.display();
    match err.kind() {
        io::ErrorKind::NotFound => AppError::Spawn(format!("binary not found: {binary}")),
        io::ErrorKind::PermissionDenied => {
            AppError::Spawn(format!("binary is not executable: {binary}"))
        }
        _ => AppError::Spawn(format!("failed to spawn {binary}: {err}")),
    }
}

/// Own `child` until it exits, terminating it first if `terminate` fires.
async fn watch_exit(
    mut child: Child,
    pid: Option<u32>,
    grace: Duration,
    terminate: CancellationToken,
    exit_tx: watch::Sender<Option<i32>>,
) {
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        () = terminate.cancelled() => None,
    };

    let status = match exited {
        Some(status) => status,
        None => shutdown(&mut child, pid, grace).await,
    };

    let code = match status {
        Ok(status) => exit_code(status),
        Err(err) => {
            warn!(pid = pid.unwrap_or(0), %err, "error waiting for proxy process");
            UNKNOWN_EXIT_CODE
        }
    };

    debug!(pid = pid.unwrap_or(0), code, "proxy process exited");
    exit_tx.send_replace(Some(code));
}

/// `SIGTERM`, wait up to `grace`, then kill.
async fn shutdown(child: &mut Child, pid: Option<u32>, grace: Duration) -> io::Result<ExitStatus> {
    if let Some(pid) = pid {
        if request_graceful_exit(pid) {
            if let Ok(status) = tokio::time::timeout(grace, child.wait()).await {
                return status;
            }
            warn!(pid, ?grace, "proxy ignored termination request, killing");
        }
    }

    if let Err(err) = child.start_kill() {
        debug!(%err, "kill failed, process likely already exited");
    }
    child.wait().await
}

#[cfg(unix)]
fn request_graceful_exit(pid: u32) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) => true,
        Err(err) => {
            debug!(pid, %err, "SIGTERM failed");
            false
        }
    }
}

#[cfg(not(unix))]
fn request_graceful_exit(_pid: u32) -> bool {
    false
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(UNKNOWN_EXIT_CODE)
}
