//! Script orchestration: config + ordered actions + listeners.
//!
//! A [`ScriptBuilder`] assembles everything up front. Its config slot can be
//! filled exactly once, and the resulting [`Script`] only hands out shared
//! references to its config, so the config cannot change mid-run.
//!
//! [`Script::run`] dispatch order:
//!
//! 1. `pre_run` listeners.
//! 2. For each action in declaration order: disabled actions are skipped
//!    without listeners; otherwise matching `pre_action` listeners, the action,
//!    then matching `post_action` listeners. A fatal action fires `post_fatal`
//!    listeners instead and aborts the run.
//! 3. `post_run` listeners, unless the run was aborted.

use std::cell::OnceCell;
use std::collections::BTreeSet;

use anyhow::Result;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::action::{Action, ActionStatus, FunctionRegistry};
use crate::cli::ScriptArgs;
use crate::config::{ConfigBuilder, ConfigMap, ConfigStore};
use crate::error::{Fatal, HarnessError};
use crate::exit_codes;
use crate::listener::{ListenerContext, ListenerRegistry, Timing};

/// Why a run stopped early.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Fatal(#[from] Fatal),

    #[error("{timing} listener failed: {error:#}")]
    Listener { timing: Timing, error: anyhow::Error },
}

impl RunError {
    fn from_listener(timing: Timing, error: anyhow::Error) -> Self {
        match error.downcast::<Fatal>() {
            Ok(fatal) => Self::Fatal(fatal),
            Err(error) => Self::Listener { timing, error },
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Fatal(_) => exit_codes::FATAL,
            Self::Listener { .. } => exit_codes::INVALID,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionReport {
    pub name: String,
    pub enabled: bool,
    pub status: ActionStatus,
}

/// Per-action outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub script: String,
    pub actions: Vec<ActionReport>,
}

impl RunSummary {
    pub fn status_of(&self, name: &str) -> Option<ActionStatus> {
        self.actions
            .iter()
            .find(|report| report.name == name)
            .map(|report| report.status)
    }

    pub fn has_errors(&self) -> bool {
        self.actions
            .iter()
            .any(|report| report.status == ActionStatus::Error)
    }

    pub fn exit_code(&self) -> i32 {
        if self.has_errors() {
            exit_codes::ACTION_ERROR
        } else {
            exit_codes::OK
        }
    }
}

pub struct Script {
    name: String,
    config: ConfigStore,
    actions: Vec<Action>,
    listeners: ListenerRegistry,
}

impl Script {
    pub fn builder(name: impl Into<String>) -> ScriptBuilder {
        ScriptBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    /// Actions in execution order.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|action| action.name() == name)
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// Register a listener. See [`ListenerRegistry::add`].
    pub fn add_listener<F>(
        &mut self,
        timing: Timing,
        action_names: Option<&[&str]>,
        callback: F,
    ) -> Result<(), HarnessError>
    where
        F: FnMut(&ListenerContext<'_>) -> Result<()> + Send + 'static,
    {
        self.listeners.add(timing, action_names, callback)
    }

    /// Register a listener with the timing given by name.
    pub fn add_listener_named<F>(
        &mut self,
        timing: &str,
        action_names: Option<&[&str]>,
        callback: F,
    ) -> Result<(), HarnessError>
    where
        F: FnMut(&ListenerContext<'_>) -> Result<()> + Send + 'static,
    {
        self.listeners.add_named(timing, action_names, callback)
    }

    /// Run every enabled action in order.
    ///
    /// Recoverable action errors are reported in the summary. A fatal action
    /// or any listener error aborts the run; `post_run` listeners do not fire
    /// in that case.
    ///
    /// A `post_fatal` listener that itself fails replaces the action's fatal
    /// with its own error, so the run ends with [`RunError::Listener`] (exit
    /// code [`exit_codes::INVALID`]) rather than [`RunError::Fatal`].
    pub fn run(&mut self) -> Result<RunSummary, RunError> {
        info!(script = %self.name, actions = self.actions.len(), "starting run");
        self.dispatch(Timing::PreRun, None)?;

        for index in 0..self.actions.len() {
            if !self.actions[index].enabled() {
                self.actions[index].skip();
                continue;
            }
            self.dispatch(Timing::PreAction, Some(index))?;
            if let Err(fatal) = self.actions[index].run(&self.config) {
                warn!(
                    script = %self.name,
                    action = %self.actions[index].name(),
                    "fatal action; aborting run"
                );
                self.dispatch(Timing::PostFatal, Some(index))?;
                return Err(RunError::Fatal(fatal));
            }
            self.dispatch(Timing::PostAction, Some(index))?;
        }

        self.dispatch(Timing::PostRun, None)?;
        let summary = self.summary();
        info!(script = %self.name, errors = summary.has_errors(), "run finished");
        Ok(summary)
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            script: self.name.clone(),
            actions: self
                .actions
                .iter()
                .map(|action| ActionReport {
                    name: action.name().to_string(),
                    enabled: action.enabled(),
                    status: action.status(),
                })
                .collect(),
        }
    }

    fn dispatch(&mut self, timing: Timing, index: Option<usize>) -> Result<(), RunError> {
        let action = index.map(|index| &self.actions[index]);
        debug!(%timing, action = ?action.map(Action::name), "dispatching listeners");
        self.listeners
            .dispatch(timing, &self.config, action)
            .map_err(|error| RunError::from_listener(timing, error))
    }
}

impl std::fmt::Debug for Script {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Script")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("actions", &self.actions)
            .field("listeners", &self.listeners)
            .finish()
    }
}

enum Declaration {
    Named { name: String, enabled: bool },
    Action(Action),
}

impl Declaration {
    fn name(&self) -> &str {
        match self {
            Self::Named { name, .. } => name,
            Self::Action(action) => action.name(),
        }
    }
}

impl std::fmt::Debug for ScriptBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptBuilder")
            .field("name", &self.name)
            .field("config", &self.config.get())
            .field("functions", &self.functions)
            .field("actions", &self.declared_actions())
            .field("selection", &self.selection)
            .finish()
    }
}

/// Assembles a [`Script`].
pub struct ScriptBuilder {
    name: String,
    config: OnceCell<ConfigStore>,
    functions: FunctionRegistry,
    declarations: Vec<Declaration>,
    selection: Option<Vec<String>>,
}

impl ScriptBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: OnceCell::new(),
            functions: FunctionRegistry::new(),
            declarations: Vec::new(),
            selection: None,
        }
    }

    /// Registry used to resolve actions declared with [`action`](Self::action).
    pub fn functions(mut self, functions: FunctionRegistry) -> Self {
        self.functions = functions;
        self
    }

    /// Declare an action resolved from the function registry at build time.
    pub fn action(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.declarations.push(Declaration::Named {
            name: name.into(),
            enabled,
        });
        self
    }

    /// Declare a fully constructed action.
    pub fn push_action(mut self, action: Action) -> Self {
        self.declarations.push(Declaration::Action(action));
        self
    }

    /// Run exactly these actions, overriding every declared default.
    pub fn select_actions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selection = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Assign the script config. Only the first assignment succeeds.
    pub fn set_config(&mut self, config: ConfigStore) -> Result<(), HarnessError> {
        self.config
            .set(config)
            .map_err(|_| HarnessError::ConfigAlreadySet)
    }

    pub fn config(&self) -> Option<&ConfigStore> {
        self.config.get()
    }

    /// Build the config from parsed arguments and apply their action selection.
    ///
    /// Layers: `defaults`, then each `--config-file`, then each `--set`.
    pub fn apply_args(mut self, args: &ScriptArgs, defaults: ConfigMap) -> Result<Self> {
        let mut config = ConfigBuilder::new().defaults(defaults).strict(args.strict);
        for path in &args.config_files {
            config = config.file(path)?;
        }
        for pair in &args.overrides {
            config = config.override_pair(pair)?;
        }
        self.set_config(config.build())?;
        if let Some(actions) = &args.actions {
            self = self.select_actions(actions.iter().cloned());
        }
        Ok(self)
    }

    /// `(name, enabled)` for every declared action, before selection.
    pub fn declared_actions(&self) -> Vec<(String, bool)> {
        self.declarations
            .iter()
            .map(|declaration| match declaration {
                Declaration::Named { name, enabled } => (name.clone(), *enabled),
                Declaration::Action(action) => (action.name().to_string(), action.enabled()),
            })
            .collect()
    }

    pub fn build(self) -> Result<Script, HarnessError> {
        let mut seen = BTreeSet::new();
        for declaration in &self.declarations {
            if !seen.insert(declaration.name()) {
                return Err(HarnessError::DuplicateAction(declaration.name().to_string()));
            }
        }
        if let Some(selection) = &self.selection {
            if let Some(unknown) = selection.iter().find(|name| !seen.contains(name.as_str())) {
                return Err(HarnessError::UnknownAction(unknown.clone()));
            }
        }

        let mut actions = Vec::with_capacity(self.declarations.len());
        for declaration in self.declarations {
            let action = match declaration {
                Declaration::Named { name, enabled } => {
                    Action::from_registry(&name, &self.functions)?.with_enabled(enabled)
                }
                Declaration::Action(action) => action,
            };
            actions.push(action);
        }
        if let Some(selection) = &self.selection {
            for action in &mut actions {
                let enabled = selection.iter().any(|name| name == action.name());
                action.set_enabled(enabled);
            }
        }

        let config = self.config.into_inner().unwrap_or_default();
        debug!(
            script = %self.name,
            actions = ?actions.iter().map(|a| (a.name(), a.enabled())).collect::<Vec<_>>(),
            "script built"
        );
        Ok(Script {
            name: self.name,
            config,
            actions,
            listeners: ListenerRegistry::new(),
        })
    }
}
