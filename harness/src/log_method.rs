//! Logging decorator for arbitrary functions.
//!
//! [`LogMethod::wrap`] turns `f: Fn(A) -> Result<R, E>` into a function with
//! the same signature that logs a pre-call message, runs an optional error
//! detector against the result, logs a success or failure message, and can
//! escalate detected errors into an [`OperationError`].
//!
//! Messages are minijinja templates rendered against the call metadata
//! ([`CallState`]): `func_name`, `args`, `kwargs` and, after the call,
//! `return_value`. Tuple arguments render as positional `args`; struct or map
//! arguments render as `kwargs`.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{Level, debug, error, info, trace, warn};

use crate::error::{HarnessError, OperationError};
use crate::template;

/// Error detector: receives the call state after a normal return and reports
/// whether the call should be treated as failed.
pub type DetectErrorFn = Arc<dyn Fn(&CallState) -> bool + Send + Sync>;

pub const RECOGNIZED_OPTIONS: [&str; 8] = [
    "level",
    "error_level",
    "logger_name",
    "pre_msg",
    "post_success_msg",
    "post_failure_msg",
    "raise_on_error",
    "detect_error_cb",
];

/// Per-call metadata exposed to templates and the error detector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallState {
    pub func_name: String,
    pub args: Value,
    pub kwargs: Value,
    pub return_value: Option<Value>,
}

impl CallState {
    fn new<A: Serialize>(func_name: &str, args: &A) -> Self {
        let (args, kwargs) = split_arguments(capture(func_name, "arguments", args));
        Self {
            func_name: func_name.to_string(),
            args,
            kwargs,
            return_value: None,
        }
    }
}

/// Serialize a call value for message templates. Values serde cannot
/// represent as JSON (e.g. maps with non-string keys) are logged as null.
fn capture<T: Serialize + ?Sized>(func_name: &str, what: &str, value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|err| {
        warn!(func_name, error = %err, "cannot capture {what}; logging null instead");
        Value::Null
    })
}

fn split_arguments(value: Value) -> (Value, Value) {
    match value {
        Value::Object(kwargs) => (Value::Array(Vec::new()), Value::Object(kwargs)),
        Value::Array(args) => (Value::Array(args), Value::Object(Map::new())),
        Value::Null => (Value::Array(Vec::new()), Value::Object(Map::new())),
        other => (Value::Array(vec![other]), Value::Object(Map::new())),
    }
}

/// Untyped option value, as supplied to [`LogMethodOptions::from_options`].
#[derive(Clone)]
pub enum OptionValue {
    Level(Level),
    Text(String),
    Flag(bool),
    Callback(DetectErrorFn),
}

impl OptionValue {
    pub fn callback<F>(callback: F) -> Self
    where
        F: Fn(&CallState) -> bool + Send + Sync + 'static,
    {
        Self::Callback(Arc::new(callback))
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Level(_) => "level",
            Self::Text(_) => "string",
            Self::Flag(_) => "bool",
            Self::Callback(_) => "callback",
        }
    }
}

impl fmt::Debug for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Level(level) => f.debug_tuple("Level").field(level).finish(),
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Flag(flag) => f.debug_tuple("Flag").field(flag).finish(),
            Self::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

impl From<Level> for OptionValue {
    fn from(level: Level) -> Self {
        Self::Level(level)
    }
}

impl From<&str> for OptionValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<bool> for OptionValue {
    fn from(flag: bool) -> Self {
        Self::Flag(flag)
    }
}

#[derive(Clone)]
pub struct LogMethodOptions {
    pub level: Level,
    pub error_level: Level,
    pub logger_name: String,
    pub pre_msg: String,
    pub post_success_msg: String,
    pub post_failure_msg: String,
    pub raise_on_error: bool,
    pub detect_error_cb: Option<DetectErrorFn>,
}

impl Default for LogMethodOptions {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            error_level: Level::ERROR,
            logger_name: "{{ func_name }}".to_string(),
            pre_msg: "{{ func_name }} arguments were: {{ args }} {{ kwargs }}".to_string(),
            post_success_msg: "{{ func_name }} completed.".to_string(),
            post_failure_msg: "{{ func_name }} failed.".to_string(),
            raise_on_error: false,
            detect_error_cb: None,
        }
    }
}

impl fmt::Debug for LogMethodOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogMethodOptions")
            .field("level", &self.level)
            .field("error_level", &self.error_level)
            .field("logger_name", &self.logger_name)
            .field("pre_msg", &self.pre_msg)
            .field("post_success_msg", &self.post_success_msg)
            .field("post_failure_msg", &self.post_failure_msg)
            .field("raise_on_error", &self.raise_on_error)
            .field("detect_error_cb", &self.detect_error_cb.is_some())
            .finish()
    }
}

impl LogMethodOptions {
    /// Build options from key/value pairs, starting from the defaults.
    ///
    /// Every pair is checked before failing, so the error lists all unknown
    /// keys and badly-typed values at once.
    pub fn from_options<I, K>(options: I) -> Result<Self, HarnessError>
    where
        I: IntoIterator<Item = (K, OptionValue)>,
        K: Into<String>,
    {
        let mut resolved = Self::default();
        let mut messages = Vec::new();
        for (key, value) in options {
            let key = key.into();
            if let Err(message) = resolved.apply(&key, value) {
                messages.push(message);
            }
        }
        for (name, text) in [
            ("logger_name", &resolved.logger_name),
            ("pre_msg", &resolved.pre_msg),
            ("post_success_msg", &resolved.post_success_msg),
            ("post_failure_msg", &resolved.post_failure_msg),
        ] {
            if let Err(err) = template::check(name, text) {
                messages.push(err.to_string());
            }
        }
        if !messages.is_empty() {
            return Err(HarnessError::InvalidOptions(messages));
        }
        Ok(resolved)
    }

    fn apply(&mut self, key: &str, value: OptionValue) -> Result<(), String> {
        match (key, value) {
            ("level", value) => self.level = level_option(key, value)?,
            ("error_level", value) => self.error_level = level_option(key, value)?,
            ("logger_name", OptionValue::Text(text)) => self.logger_name = text,
            ("pre_msg", OptionValue::Text(text)) => self.pre_msg = text,
            ("post_success_msg", OptionValue::Text(text)) => self.post_success_msg = text,
            ("post_failure_msg", OptionValue::Text(text)) => self.post_failure_msg = text,
            ("raise_on_error", OptionValue::Flag(flag)) => self.raise_on_error = flag,
            ("detect_error_cb", OptionValue::Callback(callback)) => {
                self.detect_error_cb = Some(callback);
            }
            ("detect_error_cb", _) => return Err("detect_error_cb not callable!".to_string()),
            (key, value) if RECOGNIZED_OPTIONS.contains(&key) => {
                return Err(format!("{key} does not accept a {} value", value.kind()));
            }
            (key, _) => return Err(format!("unknown key {key} in options!")),
        }
        Ok(())
    }
}

fn level_option(key: &str, value: OptionValue) -> Result<Level, String> {
    match value {
        OptionValue::Level(level) => Ok(level),
        OptionValue::Text(text) => {
            Level::from_str(&text).map_err(|_| format!("{key} has unknown level '{text}'"))
        }
        other => Err(format!("{key} does not accept a {} value", other.kind())),
    }
}

/// A configured logging decorator for one function.
#[derive(Debug, Clone)]
pub struct LogMethod {
    func_name: String,
    options: LogMethodOptions,
}

impl LogMethod {
    pub fn new(func_name: impl Into<String>, options: LogMethodOptions) -> Self {
        Self {
            func_name: func_name.into(),
            options,
        }
    }

    pub fn from_options<I, K>(
        func_name: impl Into<String>,
        options: I,
    ) -> Result<Self, HarnessError>
    where
        I: IntoIterator<Item = (K, OptionValue)>,
        K: Into<String>,
    {
        Ok(Self::new(func_name, LogMethodOptions::from_options(options)?))
    }

    pub fn func_name(&self) -> &str {
        &self.func_name
    }

    pub fn options(&self) -> &LogMethodOptions {
        &self.options
    }

    /// Wrap `function`, keeping its argument and result types.
    pub fn wrap<A, R, E, F>(self, function: F) -> impl Fn(A) -> Result<R, E>
    where
        A: Serialize,
        R: Serialize,
        E: From<OperationError>,
        F: Fn(A) -> Result<R, E>,
    {
        move |args| self.call(&function, args)
    }

    /// Invoke `function` once with logging and error detection.
    ///
    /// An `Err` returned by `function` is passed through untouched.
    pub fn call<A, R, E, F>(&self, function: F, args: A) -> Result<R, E>
    where
        A: Serialize,
        R: Serialize,
        E: From<OperationError>,
        F: FnOnce(A) -> Result<R, E>,
    {
        let mut state = CallState::new(&self.func_name, &args);
        let logger = template::render_or_raw(&self.options.logger_name, &state);
        log_at(
            self.options.level,
            &logger,
            &template::render_or_raw(&self.options.pre_msg, &state),
        );

        let value = function(args)?;
        state.return_value = Some(capture(&self.func_name, "return value", &value));

        let detected = self
            .options
            .detect_error_cb
            .as_ref()
            .is_some_and(|detect| detect(&state));
        if !detected {
            log_at(
                self.options.level,
                &logger,
                &template::render_or_raw(&self.options.post_success_msg, &state),
            );
            return Ok(value);
        }

        let message = template::render_or_raw(&self.options.post_failure_msg, &state);
        log_at(self.options.error_level, &logger, &message);
        if self.options.raise_on_error {
            return Err(E::from(OperationError::new(message)));
        }
        Ok(value)
    }
}

fn log_at(level: Level, logger: &str, message: &str) {
    match level {
        Level::ERROR => error!(logger = %logger, "{message}"),
        Level::WARN => warn!(logger = %logger, "{message}"),
        Level::INFO => info!(logger = %logger, "{message}"),
        Level::DEBUG => debug!(logger = %logger, "{message}"),
        _ => trace!(logger = %logger, "{message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Serialize)]
    struct Upload<'a> {
        path: &'a str,
        retries: u32,
    }

    fn add(args: (i32, i32)) -> Result<i32, OperationError> {
        Ok(args.0 + args.1)
    }

    #[test]
    fn unknown_keys_are_all_reported() {
        let err = LogMethodOptions::from_options([
            ("level", OptionValue::from(Level::DEBUG)),
            ("colour", OptionValue::from("red")),
            ("verbosity", OptionValue::from(true)),
        ])
        .expect_err("unknown keys");
        let HarnessError::InvalidOptions(messages) = err else {
            panic!("expected InvalidOptions");
        };
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("colour"));
        assert!(messages[1].contains("verbosity"));
    }

    #[test]
    fn non_callable_detector_is_rejected() {
        let err = LogMethodOptions::from_options([("detect_error_cb", OptionValue::from("yes"))])
            .expect_err("not callable");
        let HarnessError::InvalidOptions(messages) = err else {
            panic!("expected InvalidOptions");
        };
        assert_eq!(messages, vec!["detect_error_cb not callable!".to_string()]);
    }

    #[test]
    fn levels_parse_from_text() {
        let options = LogMethodOptions::from_options([
            ("level", OptionValue::from("debug")),
            ("error_level", OptionValue::from("warn")),
        ])
        .expect("options");
        assert_eq!(options.level, Level::DEBUG);
        assert_eq!(options.error_level, Level::WARN);
    }

    #[test]
    fn unserializable_values_are_captured_as_null() {
        let mut pairs = BTreeMap::new();
        pairs.insert((1, 2), "edge");
        let state = CallState::new("graph", &(pairs.clone(),));
        assert_eq!(state.args, Value::Array(Vec::new()));
        assert_eq!(state.kwargs, Value::Object(Map::new()));

        let method = LogMethod::new("graph", LogMethodOptions::default());
        let result: Result<_, OperationError> =
            method.call(|(pairs,)| Ok(pairs), (pairs.clone(),));
        assert_eq!(result, Ok(pairs));
    }

    #[test]
    fn wrapped_function_keeps_behavior() {
        let wrapped = LogMethod::new("add", LogMethodOptions::default()).wrap(add);
        assert_eq!(wrapped((2, 3)), Ok(5));
    }

    #[test]
    fn function_errors_pass_through_untouched() {
        let method = LogMethod::new("fail", LogMethodOptions::default());
        let result: Result<(), OperationError> =
            method.call(|_: ()| Err(OperationError::new("original")), ());
        assert_eq!(result, Err(OperationError::new("original")));
    }

    #[test]
    fn detected_error_raises_when_configured() {
        let method = LogMethod::from_options(
            "add",
            [
                ("raise_on_error", OptionValue::from(true)),
                (
                    "post_failure_msg",
                    OptionValue::from("{{ func_name }} returned {{ return_value }}"),
                ),
                (
                    "detect_error_cb",
                    OptionValue::callback(|state| state.return_value == Some(Value::from(5))),
                ),
            ],
        )
        .expect("options");
        let result = method.call(add, (2, 3));
        assert_eq!(result, Err(OperationError::new("add returned 5")));
    }

    #[test]
    fn detected_error_without_raise_returns_value() {
        let method = LogMethod::from_options(
            "add",
            [("detect_error_cb", OptionValue::callback(|_| true))],
        )
        .expect("options");
        assert_eq!(method.call(add, (2, 3)), Ok(5));
    }

    #[test]
    fn detector_sees_positional_and_keyword_arguments() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&seen);
        let method = LogMethod::from_options(
            "upload",
            [(
                "detect_error_cb",
                OptionValue::callback(move |state| {
                    recorder
                        .lock()
                        .expect("lock")
                        .push((state.args.clone(), state.kwargs.clone()));
                    false
                }),
            )],
        )
        .expect("options");

        method
            .call(|_: (i32, &str)| Ok::<_, OperationError>(()), (1, "a"))
            .expect("positional");
        method
            .call(
                |_: Upload<'_>| Ok::<_, OperationError>(()),
                Upload {
                    path: "dist.zip",
                    retries: 2,
                },
            )
            .expect("keyword");

        let seen = seen.lock().expect("lock").clone();
        assert_eq!(seen[0], (serde_json::json!([1, "a"]), serde_json::json!({})));
        assert_eq!(
            seen[1],
            (
                serde_json::json!([]),
                serde_json::json!({"path": "dist.zip", "retries": 2})
            )
        );
    }

    #[test]
    fn anyhow_callers_get_operation_errors() {
        let method = LogMethod::from_options(
            "check",
            [
                ("raise_on_error", OptionValue::from(true)),
                ("detect_error_cb", OptionValue::callback(|_| true)),
            ],
        )
        .expect("options");
        let err = method
            .call(|_: ()| Ok::<_, anyhow::Error>(false), ())
            .expect_err("raised");
        assert!(err.downcast_ref::<OperationError>().is_some());
        assert_eq!(err.to_string(), "check failed.");
    }
}
