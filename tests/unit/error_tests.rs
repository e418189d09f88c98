//! Unit tests for `AppError` display formatting and conversions.

use std::time::Duration;

use cliproxy_runner::AppError;

/// Each variant renders as `area: detail`.
#[test]
fn display_prefixes_area() {
    let cases = [
        (AppError::Config("bad port".into()), "config: bad port"),
        (AppError::Spawn("binary not found: /x".into()), "spawn: binary not found: /x"),
        (
            AppError::PortAllocation("no ports".into()),
            "port allocation: no ports",
        ),
        (
            AppError::PrematureExit { code: 1 },
            "premature exit: proxy exited before ready (code 1)",
        ),
        (
            AppError::LoginFailed { code: 2 },
            "login failed: login flow exited with code 2",
        ),
        (AppError::Download("404".into()), "download: 404"),
        (AppError::Io("disk full".into()), "io: disk full"),
    ];

    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

/// The timeout message names the URL and attempt count.
#[test]
fn readiness_timeout_display() {
    let err = AppError::readiness_timeout(
        "http://127.0.0.1:8317/v1/models".into(),
        3,
        Duration::from_millis(25),
    );

    let text = err.to_string();
    assert!(text.starts_with("readiness timeout: http://127.0.0.1:8317/v1/models"));
    assert!(text.contains("after 3 attempts"));
}

/// A constructed timeout carries no proxy.
#[test]
fn readiness_timeout_without_proxy() {
    let AppError::ReadinessTimeout(mut timeout) =
        AppError::readiness_timeout("u".into(), 1, Duration::ZERO)
    else {
        panic!("constructor must build a ReadinessTimeout");
    };
    assert!(timeout.take_proxy().is_none());
}

/// I/O errors convert into `AppError::Io`.
#[test]
fn io_error_converts() {
    let err: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
    assert!(matches!(err, AppError::Io(ref msg) if msg == "gone"));
}

/// TOML parse errors convert into `AppError::Config`.
#[test]
fn toml_error_converts() {
    let parse = toml::from_str::<toml::Value>("= broken").expect_err("invalid toml");
    let err: AppError = parse.into();
    assert!(matches!(err, AppError::Config(ref msg) if msg.starts_with("invalid config")));
}

/// `AppError` works as a boxed standard error.
#[test]
fn is_std_error() {
    let boxed: Box<dyn std::error::Error> = Box::new(AppError::Spawn("x".into()));
    assert_eq!(boxed.to_string(), "spawn: x");
}
