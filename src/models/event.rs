//! Lifecycle and log events emitted while a proxy process is supervised.

use std::fmt::{Display, Formatter};

use tokio::sync::mpsc;

/// Lifecycle status of a supervised proxy process.
///
/// Transitions are `Starting → Ready → Exited` or `Starting → Exited`.
/// `Exited` is terminal and is reported once per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStatus {
    /// Process is being launched and probed.
    Starting,
    /// Process answered the readiness probe.
    Ready,
    /// Process exited.
    Exited {
        /// Exit code, or `-1` when it could not be determined.
        code: i32,
    },
}

/// Output stream a log line was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogSource {
    /// Child standard output.
    Stdout,
    /// Child standard error.
    Stderr,
}

impl LogSource {
    /// Stable lower-case name of the stream.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

impl Display for LogSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of child output with trailing whitespace removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// Stream the line came from.
    pub source: LogSource,
    /// Line content.
    pub text: String,
}

/// Event delivered to the caller of a supervised run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// Lifecycle transition.
    Status(LifecycleStatus),
    /// Relayed child output.
    Log(LogLine),
}

/// Fire-and-forget destination for [`SupervisorEvent`]s.
///
/// Unbounded so a slow consumer never stalls the child's output pipes.
/// A detached sink (or one whose receiver was dropped) discards events.
#[derive(Debug, Clone, Default)]
pub struct EventSink(Option<mpsc::UnboundedSender<SupervisorEvent>>);

impl EventSink {
    /// Create a sink together with the receiver that observes it.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SupervisorEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(Some(tx)), rx)
    }

    /// A sink that drops every event.
    #[must_use]
    pub fn discard() -> Self {
        Self(None)
    }

    /// Whether a receiver is still listening.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.0.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Report a lifecycle transition.
    pub fn status(&self, status: LifecycleStatus) {
        self.send(SupervisorEvent::Status(status));
    }

    /// Relay one line of child output.
    pub fn log(&self, line: LogLine) {
        self.send(SupervisorEvent::Log(line));
    }

    fn send(&self, event: SupervisorEvent) {
        if let Some(tx) = &self.0 {
            // A closed receiver means nobody is listening any more.
            let _ = tx.send(event);
        }
    }
}

impl From<mpsc::UnboundedSender<SupervisorEvent>> for EventSink {
    fn from(tx: mpsc::UnboundedSender<SupervisorEvent>) -> Self {
        Self(Some(tx))
    }
}
