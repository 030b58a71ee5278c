//! Config Store: the shared, read-only configuration handed to every action
//! and listener.
//!
//! A [`ConfigBuilder`] merges layers in order (defaults, config files,
//! command-line overrides; later layers win per top-level key) and produces a
//! locked [`ConfigStore`]. Mutation attempts on a locked store are refused:
//! a non-strict store logs a warning, a strict one logs an error and returns
//! [`HarnessError::ConfigReadOnly`].

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::error::HarnessError;

pub type ConfigMap = Map<String, Value>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigStore {
    values: ConfigMap,
    strict: bool,
}

impl ConfigStore {
    pub fn new(values: ConfigMap) -> Self {
        Self {
            values,
            strict: false,
        }
    }

    pub fn strict(values: ConfigMap) -> Self {
        Self {
            values,
            strict: true,
        }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Like [`get`](Self::get), but a missing key is an error.
    pub fn require(&self, key: &str) -> Result<&Value, HarnessError> {
        self.values
            .get(key)
            .ok_or_else(|| HarnessError::MissingConfigKey(key.to_string()))
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(Value::as_bool)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.values.get(key).and_then(Value::as_i64)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_map(&self) -> &ConfigMap {
        &self.values
    }

    /// Attempt to set `key`. Always refused; the store is locked once built.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<(), HarnessError> {
        let value = value.into();
        self.refuse_mutation("set", key, Some(&value))
    }

    /// Attempt to remove `key`. Always refused; the store is locked once built.
    pub fn remove(&self, key: &str) -> Result<(), HarnessError> {
        self.refuse_mutation("remove", key, None)
    }

    fn refuse_mutation(
        &self,
        op: &'static str,
        key: &str,
        value: Option<&Value>,
    ) -> Result<(), HarnessError> {
        if self.strict {
            error!(op, key, ?value, "refused to mutate read-only config");
            return Err(HarnessError::ConfigReadOnly {
                op,
                key: key.to_string(),
            });
        }
        warn!(op, key, ?value, "ignored mutation of read-only config");
        Ok(())
    }
}

/// Layered builder for [`ConfigStore`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    values: ConfigMap,
    strict: bool,
    sources: Vec<String>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn defaults(mut self, defaults: ConfigMap) -> Self {
        self.values.extend(defaults);
        self.sources.push("defaults".to_string());
        self
    }

    /// Merge a config file. `.json` files are parsed as JSON, anything else
    /// as TOML.
    pub fn file(mut self, path: &Path) -> Result<Self> {
        let layer = load_config_file(path)?;
        self.values.extend(layer);
        self.sources.push(path.display().to_string());
        Ok(self)
    }

    /// Merge a `KEY=VALUE` override from the command line.
    ///
    /// The value is parsed as a TOML value when possible (`3`, `true`,
    /// `["a", "b"]`) and kept as a plain string otherwise.
    pub fn override_pair(self, pair: &str) -> Result<Self, HarnessError> {
        let (key, raw) = pair
            .split_once('=')
            .filter(|(key, _)| !key.trim().is_empty())
            .ok_or_else(|| HarnessError::InvalidOverride(pair.to_string()))?;
        Ok(self.set(key.trim(), parse_override_value(raw)))
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        self.sources.push(format!("override:{key}"));
        self.values.insert(key, value.into());
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn build(self) -> ConfigStore {
        debug!(
            sources = ?self.sources,
            keys = self.values.len(),
            strict = self.strict,
            "config built"
        );
        ConfigStore {
            values: self.values,
            strict: self.strict,
        }
    }
}

fn load_config_file(path: &Path) -> Result<ConfigMap> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let layer: ConfigMap = if is_json {
        serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))?
    } else {
        let table: toml::Table =
            toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
        match serde_json::to_value(table)
            .with_context(|| format!("convert {}", path.display()))?
        {
            Value::Object(map) => map,
            _ => ConfigMap::new(),
        }
    };
    debug!(path = %path.display(), keys = layer.len(), "config file loaded");
    Ok(layer)
}

fn parse_override_value(raw: &str) -> Value {
    let raw = raw.trim();
    toml::from_str::<toml::Table>(&format!("value = {raw}"))
        .ok()
        .and_then(|mut table| table.remove("value"))
        .and_then(|value| serde_json::to_value(value).ok())
        .unwrap_or_else(|| Value::String(raw.to_string()))
}
