//! Listener registry: callbacks keyed by timing phase.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::action::Action;
use crate::config::ConfigStore;
use crate::error::HarnessError;

/// Point in a run at which listeners fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timing {
    PreRun,
    PostRun,
    PreAction,
    PostAction,
    PostFatal,
}

impl Timing {
    pub const ALL: [Timing; 5] = [
        Timing::PreRun,
        Timing::PostRun,
        Timing::PreAction,
        Timing::PostAction,
        Timing::PostFatal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreRun => "pre_run",
            Self::PostRun => "post_run",
            Self::PreAction => "pre_action",
            Self::PostAction => "post_action",
            Self::PostFatal => "post_fatal",
        }
    }

    /// Whether listeners at this timing may be filtered by action name.
    pub fn is_action_scoped(self) -> bool {
        matches!(self, Self::PreAction | Self::PostAction)
    }
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timing {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timing::ALL
            .into_iter()
            .find(|timing| timing.as_str() == s)
            .ok_or_else(|| HarnessError::InvalidTiming(s.to_string()))
    }
}

/// What a listener sees when it fires.
#[derive(Debug, Clone, Copy)]
pub struct ListenerContext<'a> {
    pub timing: Timing,
    pub config: &'a ConfigStore,
    /// The current action for `pre_action`, `post_action` and `post_fatal`.
    pub action: Option<&'a Action>,
}

pub type ListenerFn = Box<dyn FnMut(&ListenerContext<'_>) -> Result<()> + Send>;

struct Registration {
    callback: ListenerFn,
    action_names: Option<BTreeSet<String>>,
}

impl Registration {
    fn matches(&self, action: Option<&Action>) -> bool {
        match (&self.action_names, action) {
            (None, _) => true,
            (Some(names), Some(action)) => names.contains(action.name()),
            (Some(_), None) => false,
        }
    }
}

/// Ordered listeners per timing. Append-only; dispatch order is
/// registration order.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: BTreeMap<Timing, Vec<Registration>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` at `timing`.
    ///
    /// `action_names` restricts a `pre_action`/`post_action` listener to
    /// those actions; an empty slice means no restriction. Giving names for
    /// any other timing is an error and leaves the registry unchanged.
    pub fn add<F>(
        &mut self,
        timing: Timing,
        action_names: Option<&[&str]>,
        callback: F,
    ) -> Result<(), HarnessError>
    where
        F: FnMut(&ListenerContext<'_>) -> Result<()> + Send + 'static,
    {
        let action_names = action_names
            .filter(|names| !names.is_empty())
            .map(|names| names.iter().map(|name| name.to_string()).collect::<BTreeSet<_>>());
        if action_names.is_some() && !timing.is_action_scoped() {
            return Err(HarnessError::ActionFilterNotAllowed(timing.to_string()));
        }
        debug!(%timing, ?action_names, "adding listener");
        self.listeners.entry(timing).or_default().push(Registration {
            callback: Box::new(callback),
            action_names,
        });
        Ok(())
    }

    /// Like [`add`](Self::add), with the timing given by name.
    pub fn add_named<F>(
        &mut self,
        timing: &str,
        action_names: Option<&[&str]>,
        callback: F,
    ) -> Result<(), HarnessError>
    where
        F: FnMut(&ListenerContext<'_>) -> Result<()> + Send + 'static,
    {
        let timing = timing.parse::<Timing>()?;
        self.add(timing, action_names, callback)
    }

    pub fn len(&self, timing: Timing) -> usize {
        self.listeners.get(&timing).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.values().all(Vec::is_empty)
    }

    /// Invoke every listener at `timing` that matches `action`, in
    /// registration order. The first listener error stops dispatch.
    pub(crate) fn dispatch(
        &mut self,
        timing: Timing,
        config: &ConfigStore,
        action: Option<&Action>,
    ) -> Result<()> {
        let Some(registrations) = self.listeners.get_mut(&timing) else {
            return Ok(());
        };
        let ctx = ListenerContext {
            timing,
            config,
            action,
        };
        for registration in registrations.iter_mut() {
            if registration.matches(action) {
                (registration.callback)(&ctx)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (timing, registrations) in &self.listeners {
            map.entry(timing, &registrations.len());
        }
        map.finish()
    }
}
