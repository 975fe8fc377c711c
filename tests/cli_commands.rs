//! Operator commands run against the built binary with a throwaway store.
//!
//! None of these reach a transcription or summarization provider.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn write_config(dir: &Path) -> PathBuf {
    let config_path = dir.join("config.toml");
    let db_path = dir.join("jobs.db");
    let storage = dir.join("objects");
    std::fs::write(
        &config_path,
        format!(
            "database_path = {:?}\n\n[storage]\nroot_dir = {:?}\n",
            db_path.display().to_string(),
            storage.display().to_string()
        ),
    )
    .unwrap();
    config_path
}

fn minutia(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_minutia"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to run minutia")
}

#[test]
fn test_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_minutia"))
        .arg("version")
        .output()
        .expect("Failed to run minutia");

    assert!(output.status.success(), "Command failed: {:?}", output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_missing_explicit_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    let output = minutia(&dir.path().join("absent.toml"), &["jobs", "list"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Config file not found"), "stderr: {}", stderr);
}

#[test]
fn test_jobs_list_on_empty_store() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());

    let output = minutia(&config, &["jobs", "list"]);
    assert!(output.status.success(), "Command failed: {:?}", output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No jobs found"), "stdout: {}", stdout);

    let output = minutia(&config, &["jobs", "list", "--json"]);
    assert!(output.status.success());
    let jobs: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(jobs, serde_json::json!([]));
}

#[test]
fn test_redrive_unknown_job_fails() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());

    let output = minutia(&config, &["redrive", "nope", "--to", "pending"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not found"), "stderr: {}", stderr);
}

#[test]
fn test_reclaim_only_sweep_on_empty_store() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path());

    let output = minutia(&config, &["sweep", "--reclaim-only"]);
    assert!(output.status.success(), "Command failed: {:?}", output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Reclaimed 0 stale claim(s)"), "stdout: {}", stdout);
}
