//! Test-only helpers for recording listener and action activity.

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use tempfile::TempDir;

use crate::action::ActionOutcome;
use crate::config::ConfigStore;
use crate::listener::ListenerContext;

/// Shared, ordered event log.
///
/// Listener events are recorded as `label:timing[:action]`, action calls as
/// `run:name`.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Listener that records each invocation under `label`.
    pub fn listener(
        &self,
        label: &str,
    ) -> impl FnMut(&ListenerContext<'_>) -> Result<()> + Send + use<> {
        let log = self.clone();
        let label = label.to_string();
        move |ctx: &ListenerContext<'_>| {
            match ctx.action {
                Some(action) => log.push(format!("{label}:{}:{}", ctx.timing, action.name())),
                None => log.push(format!("{label}:{}", ctx.timing)),
            }
            Ok(())
        }
    }

    /// Action function that records `run:name` and returns `outcome`.
    pub fn action(
        &self,
        name: &str,
        outcome: ActionOutcome,
    ) -> impl Fn(&ConfigStore) -> ActionOutcome + Send + Sync + use<> {
        let log = self.clone();
        let event = format!("run:{name}");
        move |_: &ConfigStore| {
            log.push(event.clone());
            outcome.clone()
        }
    }
}

/// Run `f` under a thread-local subscriber and return everything it logged.
pub fn capture_logs<F: FnOnce()>(f: F) -> String {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::TRACE)
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    buffer.contents()
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Write `contents` to `name` inside a fresh temp dir.
///
/// The returned [`TempDir`] must outlive any use of the path.
pub fn temp_config_file(name: &str, contents: &str) -> Result<(TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let path = dir.path().join(name);
    std::fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
    Ok((dir, path))
}
