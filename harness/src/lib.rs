//! Orchestration harness for multi-step scripts.
//!
//! A [`script::Script`] runs an ordered set of named [`action::Action`]s
//! against one shared, read-only [`config::ConfigStore`], records each
//! action's outcome, and fires listeners around the run and around each
//! action:
//!
//! - **[`action`]**: action lifecycle and the status taxonomy.
//! - **[`listener`]**: timing phases and the listener registry.
//! - **[`script`]**: builder, run loop, and fatal propagation.
//! - **[`log_method`]**: logging decorator usable around any function.
//!
//! [`config`], [`cli`] and [`logging`] are thin collaborators for building
//! the config store, parsing the common script options, and installing a
//! tracing subscriber.

pub mod action;
pub mod cli;
pub mod config;
pub mod error;
pub mod exit_codes;
pub mod listener;
pub mod log_method;
pub mod logging;
pub mod manager;
pub mod script;
pub mod template;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use action::{Action, ActionOutcome, ActionStatus, FunctionRegistry};
pub use config::{ConfigBuilder, ConfigStore};
pub use error::{Fatal, HarnessError, OperationError};
pub use listener::{ListenerContext, Timing};
pub use log_method::{LogMethod, LogMethodOptions, OptionValue};
pub use script::{RunError, RunSummary, Script, ScriptBuilder};
