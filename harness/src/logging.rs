//! Tracing setup for scripts.
//!
//! The harness itself only emits `tracing` events; a hosting binary calls one
//! of these once at startup to install a subscriber.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize a stderr subscriber.
///
/// Reads `RUST_LOG` env var. Defaults to `info` if unset.
///
/// # Example
/// ```bash
/// RUST_LOG=scriptharness=debug my-script --actions build
/// ```
pub fn init() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

/// Initialize a subscriber that writes to stderr and to `path`.
///
/// The log file is truncated unless `append` is set.
pub fn init_with_file(path: &Path, append: bool) -> Result<()> {
    let file = open_log_file(path, append)?;
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .try_init()
        .context("install tracing subscriber")?;
    Ok(())
}

/// Open `path` for logging, creating it if needed. Existing contents are kept
/// only when `append` is set.
pub fn open_log_file(path: &Path, append: bool) -> Result<File> {
    let mut options = OpenOptions::new();
    options.create(true);
    if append {
        options.append(true);
    } else {
        options.write(true).truncate(true);
    }
    options
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::test_support::temp_config_file;

    #[test]
    fn truncates_unless_appending() {
        let (_dir, path) = temp_config_file("run.log", "previous run\n").expect("log file");

        let mut file = open_log_file(&path, true).expect("append");
        writeln!(file, "second run").expect("write");
        drop(file);
        assert_eq!(
            std::fs::read_to_string(&path).expect("read"),
            "previous run\nsecond run\n"
        );

        let mut file = open_log_file(&path, false).expect("truncate");
        writeln!(file, "third run").expect("write");
        drop(file);
        assert_eq!(std::fs::read_to_string(&path).expect("read"), "third run\n");
    }

    #[test]
    fn creates_missing_file() {
        let (dir, _) = temp_config_file("unused", "").expect("temp dir");
        let path = dir.path().join("fresh.log");
        open_log_file(&path, true).expect("create");
        assert!(path.exists());
    }
}
