//! Named script registry for hosts that run more than one script context.

use std::collections::BTreeMap;

use crate::config::ConfigStore;
use crate::error::HarnessError;
use crate::script::Script;

pub const DEFAULT_SCRIPT: &str = "root";

#[derive(Debug, Default)]
pub struct ScriptRegistry {
    scripts: BTreeMap<String, Script>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `script` under its own name, returning any script it replaced.
    pub fn insert(&mut self, script: Script) -> Option<Script> {
        self.scripts.insert(script.name().to_string(), script)
    }

    /// Return the script named `name`, building it with `build` if absent.
    pub fn get_or_insert_with<F>(
        &mut self,
        name: &str,
        build: F,
    ) -> Result<&mut Script, HarnessError>
    where
        F: FnOnce() -> Result<Script, HarnessError>,
    {
        if !self.scripts.contains_key(name) {
            let script = build()?;
            self.scripts.insert(name.to_string(), script);
        }
        self.scripts
            .get_mut(name)
            .ok_or_else(|| HarnessError::UnknownScript(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&Script> {
        self.scripts.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Script> {
        self.scripts.get_mut(name)
    }

    pub fn config(&self, name: &str) -> Result<&ConfigStore, HarnessError> {
        self.scripts
            .get(name)
            .map(Script::config)
            .ok_or_else(|| HarnessError::UnknownScript(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scripts.keys().map(String::as_str)
    }
}
