//! Configuration layering across `cloudjobs.toml` and the environment.

use std::fs;
use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use cloudjobs::ClientConfig;
use cloudjobs::test_support::EnvGuard;
use rstest::rstest;
use tempfile::TempDir;

fn write_config(contents: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let path = tmp.path().join("cloudjobs.toml");
    fs::write(&path, contents).unwrap_or_else(|err| panic!("write config: {err}"));
    (tmp, path)
}

#[tokio::test]
async fn config_file_values_replace_defaults() {
    let (_tmp, path) = write_config(
        r#"
endpoint = "https://cloud.example/api"
poll_interval_ms = 2500
max_poll_attempts = 12
close_timeout_secs = 30
"#,
    );
    let path_str = path.to_string_lossy().into_owned();
    let _guard = EnvGuard::set_vars(&[("CLOUDJOBS_CONFIG_PATH", path_str.as_str())]).await;

    let config = ClientConfig::load_without_cli_args()
        .unwrap_or_else(|err| panic!("config should load: {err}"));

    assert_eq!(config.endpoint, "https://cloud.example/api");
    assert_eq!(config.poll_interval_ms, 2500);
    assert_eq!(config.max_poll_attempts, Some(12));
    assert_eq!(config.close_timeout_secs, Some(30));
    assert_eq!(config.request_retries, 5);
    config
        .validate()
        .unwrap_or_else(|err| panic!("file config should validate: {err}"));
}

#[tokio::test]
async fn config_file_enables_auth_retries_and_jitter() {
    let (_tmp, path) = write_config("retry_authorization_failures = true\npoll_jitter = true\n");
    let path_str = path.to_string_lossy().into_owned();
    let _guard = EnvGuard::set_vars(&[("CLOUDJOBS_CONFIG_PATH", path_str.as_str())]).await;

    let config = ClientConfig::load_without_cli_args()
        .unwrap_or_else(|err| panic!("config should load: {err}"));

    assert_eq!(config.retry_authorization_failures, Some(true));
    assert_eq!(config.poll_jitter, Some(true));
    assert!(config.retries_authorization_failures());
    assert!(config.jitter_enabled());
}

#[test]
fn environment_enables_auth_retries_for_the_cli() {
    let mut cmd = cargo_bin_cmd!("cloudjobs");
    cmd.env("CLOUDJOBS_RETRY_AUTHORIZATION_FAILURES", "true")
        .env_remove("CLOUDJOBS_CONFIG_PATH")
        .args(["classify", "Auth fail"])
        .assert()
        .success()
        .stdout("transient\n");
}

#[rstest]
#[case::file_only(None, "transient")]
#[case::environment_wins(Some("broken pipe"), "permanent")]
fn retryable_messages_layer_file_then_environment(
    #[case] env_messages: Option<&str>,
    #[case] expected: &str,
) {
    let (_tmp, path) = write_config("retryable_messages = \"socket is not established\"\n");
    let mut cmd = cargo_bin_cmd!("cloudjobs");
    cmd.env("CLOUDJOBS_CONFIG_PATH", &path)
        .env_remove("CLOUDJOBS_RETRYABLE_MESSAGES");
    if let Some(messages) = env_messages {
        cmd.env("CLOUDJOBS_RETRYABLE_MESSAGES", messages);
    }

    cmd.args(["classify", "upload failed", "socket is not established"])
        .assert()
        .success()
        .stdout(format!("{expected}\n"));
}
