//! End-to-end runs of the sample script binary.

use std::path::Path;
use std::process::{Command, Output};

use scriptharness::exit_codes;
use tempfile::TempDir;

fn run_script(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_scriptharness"))
        .args(args)
        .env("RUST_LOG", "info")
        .output()
        .expect("spawn sample script")
}

fn work_dir_override(dir: &Path) -> String {
    format!("work_dir={}", dir.display())
}

#[test]
fn fatal_action_exits_with_fatal_code() {
    let tmp = TempDir::new().expect("temp dir");
    let work_dir = tmp.path().join("never-built");

    let output = run_script(&["--actions", "package", "--set", &work_dir_override(&work_dir)]);

    assert_eq!(output.status.code(), Some(exit_codes::FATAL));
}

#[test]
fn log_file_is_appended_when_requested() {
    let tmp = TempDir::new().expect("temp dir");
    let work_dir = tmp.path().join("work");
    let log_file = tmp.path().join("script.log");
    std::fs::write(&log_file, "earlier run\n").expect("seed log");
    let log_arg = log_file.display().to_string();

    let output = run_script(&[
        "--actions",
        "build",
        "package",
        "--set",
        &work_dir_override(&work_dir),
        "--log-file",
        &log_arg,
        "--append",
    ]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(work_dir.join("manifest.json").exists());
    let log = std::fs::read_to_string(&log_file).expect("read log");
    assert!(log.starts_with("earlier run\n"), "{log}");
    assert!(log.contains("write_manifest completed."), "{log}");
}

#[test]
fn log_file_is_truncated_by_default() {
    let tmp = TempDir::new().expect("temp dir");
    let log_file = tmp.path().join("script.log");
    std::fs::write(&log_file, "earlier run\n").expect("seed log");
    let log_arg = log_file.display().to_string();

    let output = run_script(&[
        "--actions",
        "clobber",
        "--set",
        &work_dir_override(&tmp.path().join("work")),
        "--log-file",
        &log_arg,
    ]);

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let log = std::fs::read_to_string(&log_file).expect("read log");
    assert!(!log.contains("earlier run"), "{log}");
    assert!(log.contains("Running action clobber"), "{log}");
}
