//! Unit tests for login provider naming and argument construction.

use std::path::Path;

use cliproxy_runner::supervisor::lifecycle::server_args;
use cliproxy_runner::supervisor::login::login_args;
use cliproxy_runner::supervisor::LoginProvider;

fn strings(args: Vec<std::ffi::OsString>) -> Vec<String> {
    args.into_iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect()
}

/// Each provider maps to its own flag.
#[test]
fn provider_flags() {
    let flags: Vec<&str> = LoginProvider::ALL.iter().map(|p| p.flag()).collect();
    assert_eq!(
        flags,
        vec![
            "--login",
            "--codex-login",
            "--claude-login",
            "--qwen-login",
            "--iflow-login",
            "--iflow-cookie",
        ]
    );
}

/// Names parse back into providers.
#[test]
fn provider_names_round_trip() {
    for provider in LoginProvider::ALL {
        assert_eq!(provider.to_string().parse::<LoginProvider>().unwrap(), provider);
    }
    assert!("github".parse::<LoginProvider>().is_err());
}

/// Gemini is the default provider.
#[test]
fn default_provider_is_gemini() {
    assert_eq!(LoginProvider::default(), LoginProvider::Gemini);
}

/// Minimal login args: flag and config only.
#[test]
fn minimal_login_args() {
    let args = login_args(
        LoginProvider::Codex,
        Path::new("/tmp/c/config.yaml"),
        false,
        None,
    );
    assert_eq!(
        strings(args),
        vec!["--codex-login", "--config", "/tmp/c/config.yaml"]
    );
}

/// Optional flags are appended in a fixed order.
#[test]
fn full_login_args() {
    let args = login_args(
        LoginProvider::Gemini,
        Path::new("/tmp/c/config.yaml"),
        true,
        Some("my-project"),
    );
    assert_eq!(
        strings(args),
        vec![
            "--login",
            "--config",
            "/tmp/c/config.yaml",
            "--no-browser",
            "--project_id",
            "my-project",
        ]
    );
}

/// Server runs only pass the config.
#[test]
fn server_args_pass_config() {
    assert_eq!(
        strings(server_args(Path::new("/tmp/s/config.yaml"))),
        vec!["--config", "/tmp/s/config.yaml"]
    );
}
