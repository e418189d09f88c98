//! Unit tests for per-run config materialization.

use cliproxy_runner::process::materialize::{
    MaterializedConfig, CONFIG_FILE_NAME, LOGIN_PREFIX, SERVER_PREFIX,
};

/// The config lands in a fresh, prefixed directory.
#[tokio::test]
async fn writes_into_prefixed_dir() {
    let config = MaterializedConfig::write(SERVER_PREFIX, "port: 1\n")
        .await
        .expect("write config");

    assert_eq!(config.path(), config.dir().join(CONFIG_FILE_NAME));
    assert_eq!(std::fs::read_to_string(config.path()).unwrap(), "port: 1\n");
    let name = config.dir().file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with(SERVER_PREFIX), "{name}");

    config.remove();
}

/// Two runs never share a directory.
#[tokio::test]
async fn runs_are_isolated() {
    let first = MaterializedConfig::write(LOGIN_PREFIX, "a").await.unwrap();
    let second = MaterializedConfig::write(LOGIN_PREFIX, "b").await.unwrap();

    assert_ne!(first.dir(), second.dir());

    first.remove();
    second.remove();
}

/// Removal deletes the whole directory.
#[tokio::test]
async fn remove_deletes_directory() {
    let config = MaterializedConfig::write(SERVER_PREFIX, "x").await.unwrap();
    let dir = config.dir().to_path_buf();

    config.remove();

    assert!(!dir.exists());
}

/// Removal after the directory is already gone does not panic.
#[tokio::test]
async fn remove_tolerates_missing_directory() {
    let config = MaterializedConfig::write(SERVER_PREFIX, "x").await.unwrap();
    std::fs::remove_dir_all(config.dir()).unwrap();

    config.remove();
}

/// Dropping without an explicit removal also cleans up.
#[tokio::test]
async fn drop_cleans_up() {
    let config = MaterializedConfig::write(SERVER_PREFIX, "x").await.unwrap();
    let dir = config.dir().to_path_buf();

    drop(config);

    assert!(!dir.exists());
}
