//! Error taxonomy for the harness.
//!
//! - [`HarnessError`]: the API was used incorrectly (bad listener timing,
//!   unknown decorator option, unresolvable action). Raised at setup time and
//!   meant to be fixed by the integrator.
//! - [`OperationError`]: an action or decorated function failed, but the run
//!   continues.
//! - [`Fatal`]: the whole process must stop.

use serde_json::Value;
use thiserror::Error;
use tracing::error;

use crate::exit_codes;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(
        "invalid listener timing '{0}' \
         (expected one of pre_run, post_run, pre_action, post_action, post_fatal)"
    )]
    InvalidTiming(String),

    #[error("action names may only be given for pre_action/post_action listeners, not {0}")]
    ActionFilterNotAllowed(String),

    #[error("no function registered for action '{name}' (looked up '{key}')")]
    UnresolvedAction { name: String, key: String },

    #[error("action declared twice: {0}")]
    DuplicateAction(String),

    #[error("unknown action selected: {0}")]
    UnknownAction(String),

    #[error("invalid options:\n- {}", .0.join("\n- "))]
    InvalidOptions(Vec<String>),

    #[error("invalid {name} template: {source}")]
    InvalidTemplate {
        name: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("script config is already set")]
    ConfigAlreadySet,

    #[error("config is read-only: refused to {op} '{key}'")]
    ConfigReadOnly { op: &'static str, key: String },

    #[error("missing config key: {0}")]
    MissingConfigKey(String),

    #[error("invalid override '{0}': expected KEY=VALUE")]
    InvalidOverride(String),

    #[error("no script named '{0}' in registry")]
    UnknownScript(String),
}

/// Recoverable failure of a single action or decorated call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct OperationError(pub String);

impl OperationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Signal that the hosting process must stop.
///
/// Carries a human-readable message and an optional diagnostic payload.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct Fatal {
    pub message: String,
    pub payload: Option<Value>,
}

impl Fatal {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<Value>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Log the condition and terminate the process with [`exit_codes::FATAL`].
    pub fn exit(&self) -> ! {
        error!(critical = true, payload = ?self.payload, "{}", self.message);
        std::process::exit(exit_codes::FATAL)
    }
}
