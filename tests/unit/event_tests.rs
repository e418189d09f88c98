//! Unit tests for supervisor events and the event sink.

use cliproxy_runner::{EventSink, LifecycleStatus, LogLine, LogSource, SupervisorEvent};

/// Events arrive in the order they were sent.
#[tokio::test]
async fn sink_delivers_in_order() {
    let (sink, mut rx) = EventSink::channel();

    sink.status(LifecycleStatus::Starting);
    sink.log(LogLine {
        source: LogSource::Stdout,
        text: "hello".into(),
    });
    sink.status(LifecycleStatus::Exited { code: 0 });
    drop(sink);

    assert_eq!(
        rx.recv().await,
        Some(SupervisorEvent::Status(LifecycleStatus::Starting))
    );
    assert!(matches!(
        rx.recv().await,
        Some(SupervisorEvent::Log(LogLine { source: LogSource::Stdout, ref text })) if text == "hello"
    ));
    assert_eq!(
        rx.recv().await,
        Some(SupervisorEvent::Status(LifecycleStatus::Exited { code: 0 }))
    );
    assert_eq!(rx.recv().await, None);
}

/// A detached sink swallows events without complaint.
#[test]
fn discard_sink_is_detached() {
    let sink = EventSink::discard();
    assert!(!sink.is_attached());
    sink.status(LifecycleStatus::Ready);
}

/// Dropping the receiver detaches the sink.
#[test]
fn dropped_receiver_detaches() {
    let (sink, rx) = EventSink::channel();
    assert!(sink.is_attached());

    drop(rx);

    assert!(!sink.is_attached());
    sink.status(LifecycleStatus::Ready);
}

/// Stream names are stable.
#[test]
fn log_source_names() {
    assert_eq!(LogSource::Stdout.to_string(), "stdout");
    assert_eq!(LogSource::Stderr.as_str(), "stderr");
}
