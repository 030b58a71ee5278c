//! Actions: named, enable/disable-able units of work.
//!
//! An [`Action`] wraps a function taking the shared [`ConfigStore`] and
//! returning an [`ActionOutcome`]. Running it records an [`ActionHistory`]
//! and maps the outcome onto the [`ActionStatus`] taxonomy:
//!
//! - `Success(value)` → [`ActionStatus::Success`], value kept in history.
//! - `OperationError` → [`ActionStatus::Error`], logged and swallowed.
//! - `Fatal` (or a panic) → [`ActionStatus::Fatal`], logged and returned as
//!   `Err` so the script aborts.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use minijinja::context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, info_span};

use crate::config::ConfigStore;
use crate::error::{Fatal, HarnessError, OperationError};
use crate::template;

/// Function invoked by an action.
pub type ActionFn = Arc<dyn Fn(&ConfigStore) -> ActionOutcome + Send + Sync>;

/// Result of invoking an action's function.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Success(Value),
    OperationError(OperationError),
    Fatal(Fatal),
}

impl ActionOutcome {
    /// Success without a meaningful return value.
    pub fn ok() -> Self {
        Self::Success(Value::Null)
    }

    pub fn success(value: impl Into<Value>) -> Self {
        Self::Success(value.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::OperationError(OperationError::new(message))
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(Fatal::new(message))
    }
}

impl From<OperationError> for ActionOutcome {
    fn from(err: OperationError) -> Self {
        Self::OperationError(err)
    }
}

impl From<Fatal> for ActionOutcome {
    fn from(fatal: Fatal) -> Self {
        Self::Fatal(fatal)
    }
}

/// Outcome recorded by the most recent run. `NotRun` until the first run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    #[default]
    NotRun,
    Success,
    Error,
    Fatal,
}

impl ActionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotRun => "not_run",
            Self::Success => "success",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }

    pub fn has_run(self) -> bool {
        self != Self::NotRun
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution record of the most recent run; overwritten by each run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActionHistory {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub return_value: Option<Value>,
    pub status: ActionStatus,
}

/// Log message templates, rendered with `name` and (for errors) `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionStrings {
    pub run_message: String,
    pub skip_message: String,
    pub error_message: String,
    pub fatal_message: String,
    pub success_message: String,
}

impl Default for ActionStrings {
    fn default() -> Self {
        Self {
            run_message: "Running action {{ name }}".to_string(),
            skip_message: "Skipping action {{ name }}".to_string(),
            error_message: "Action {{ name }} error!".to_string(),
            fatal_message: "Fatal {{ name }} exception: {{ error }}".to_string(),
            success_message: "Action {{ name }}: finished successfully".to_string(),
        }
    }
}

impl ActionStrings {
    pub fn validate(&self) -> Result<(), HarnessError> {
        template::check("run_message", &self.run_message)?;
        template::check("skip_message", &self.skip_message)?;
        template::check("error_message", &self.error_message)?;
        template::check("fatal_message", &self.fatal_message)?;
        template::check("success_message", &self.success_message)?;
        Ok(())
    }
}

/// Key an action name resolves to in a [`FunctionRegistry`].
pub fn function_key(name: &str) -> String {
    name.replace('-', "_")
}

/// Explicit name → function map used to resolve actions declared by name.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, ActionFn>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `function` under `name` (hyphens are normalized to underscores).
    pub fn register<F>(&mut self, name: &str, function: F)
    where
        F: Fn(&ConfigStore) -> ActionOutcome + Send + Sync + 'static,
    {
        self.functions.insert(function_key(name), Arc::new(function));
    }

    pub fn with<F>(mut self, name: &str, function: F) -> Self
    where
        F: Fn(&ConfigStore) -> ActionOutcome + Send + Sync + 'static,
    {
        self.register(name, function);
        self
    }

    pub fn get(&self, name: &str) -> Option<ActionFn> {
        self.functions.get(&function_key(name)).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(&function_key(name))
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.functions.keys()).finish()
    }
}

pub struct Action {
    name: String,
    enabled: bool,
    function: ActionFn,
    strings: ActionStrings,
    history: ActionHistory,
}

impl Action {
    /// Create a disabled action wrapping `function`.
    pub fn new<F>(name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&ConfigStore) -> ActionOutcome + Send + Sync + 'static,
    {
        Self::with_function(name.into(), Arc::new(function))
    }

    /// Create a disabled action whose function is looked up in `registry`.
    pub fn from_registry(name: &str, registry: &FunctionRegistry) -> Result<Self, HarnessError> {
        let function = registry
            .get(name)
            .ok_or_else(|| HarnessError::UnresolvedAction {
                name: name.to_string(),
                key: function_key(name),
            })?;
        Ok(Self::with_function(name.to_string(), function))
    }

    fn with_function(name: String, function: ActionFn) -> Self {
        Self {
            name,
            enabled: false,
            function,
            strings: ActionStrings::default(),
            history: ActionHistory::default(),
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_strings(mut self, strings: ActionStrings) -> Result<Self, HarnessError> {
        strings.validate()?;
        self.strings = strings;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn strings(&self) -> &ActionStrings {
        &self.strings
    }

    pub fn history(&self) -> &ActionHistory {
        &self.history
    }

    pub fn status(&self) -> ActionStatus {
        self.history.status
    }

    /// Run the action against `config`, replacing any previous history.
    ///
    /// Operation errors are logged and reported as `Ok(ActionStatus::Error)`.
    /// A fatal outcome or a panic in the function is logged, recorded, and
    /// returned as `Err`. `end_time` is set on every path.
    pub fn run(&mut self, config: &ConfigStore) -> Result<ActionStatus, Fatal> {
        let span = info_span!("action", action = %self.name);
        let _enter = span.enter();

        self.history = ActionHistory {
            start_time: Some(Utc::now()),
            ..ActionHistory::default()
        };
        info!("{}", self.render(&self.strings.run_message, None));

        let function = Arc::clone(&self.function);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| function(config))).unwrap_or_else(
            |payload| {
                ActionOutcome::Fatal(Fatal::new(format!(
                    "action panicked: {}",
                    panic_message(payload.as_ref())
                )))
            },
        );

        let result = match outcome {
            ActionOutcome::Success(value) => {
                self.history.status = ActionStatus::Success;
                self.history.return_value = Some(value);
                info!("{}", self.render(&self.strings.success_message, None));
                Ok(ActionStatus::Success)
            }
            ActionOutcome::OperationError(err) => {
                self.history.status = ActionStatus::Error;
                let message = self.render(&self.strings.error_message, Some(err.message()));
                error!(error = %err, "{message}");
                Ok(ActionStatus::Error)
            }
            ActionOutcome::Fatal(fatal) => {
                self.history.status = ActionStatus::Fatal;
                error!(
                    critical = true,
                    payload = ?fatal.payload,
                    "{}",
                    self.render(&self.strings.fatal_message, Some(&fatal.message))
                );
                Err(fatal)
            }
        };
        self.history.end_time = Some(Utc::now());
        result
    }

    /// Log that this action is being skipped.
    pub fn skip(&self) {
        info!(action = %self.name, "{}", self.render(&self.strings.skip_message, None));
    }

    fn render(&self, template: &str, error: Option<&str>) -> String {
        template::render_or_raw(template, context! { name => self.name.as_str(), error => error })
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("strings", &self.strings)
            .field("history", &self.history)
            .finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
