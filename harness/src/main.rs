//! Sample script built on the harness.
//!
//! Declares `clobber`, `build` and `package` actions that operate on a
//! `work_dir` taken from config, and exits with one of the stable
//! [`exit_codes`]. A fatal action terminates the process through
//! [`Fatal::exit`](scriptharness::Fatal::exit).

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use scriptharness::cli::{list_actions, parse_args};
use scriptharness::config::ConfigMap;
use scriptharness::{
    ActionOutcome, ConfigStore, FunctionRegistry, LogMethod, LogMethodOptions, OperationError,
    RunError, Script, Timing, exit_codes, logging,
};
use serde_json::json;
use tracing::info;

const ACTIONS: &[&str] = &["clobber", "build", "package"];

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let args = match parse_args(ACTIONS, std::env::args_os()) {
        Ok(args) => args,
        Err(err) => err.exit(),
    };
    match &args.log_file {
        Some(path) => logging::init_with_file(path, args.append)?,
        None => logging::init(),
    }

    let builder = Script::builder("root")
        .functions(functions())
        .action("clobber", false)
        .action("build", true)
        .action("package", true);
    if args.list_actions {
        println!("{}", list_actions(&builder.declared_actions()));
        return Ok(exit_codes::OK);
    }

    let mut defaults = ConfigMap::new();
    defaults.insert("work_dir".to_string(), json!("build"));
    let mut script = builder.apply_args(&args, defaults)?.build()?;
    script.add_listener(Timing::PostRun, None, |ctx| {
        info!(work_dir = ?ctx.config.get_str("work_dir"), "all actions done");
        Ok(())
    })?;

    match script.run() {
        Ok(summary) => Ok(summary.exit_code()),
        Err(RunError::Fatal(fatal)) => fatal.exit(),
        Err(err) => {
            eprintln!("{err}");
            Ok(err.exit_code())
        }
    }
}

fn functions() -> FunctionRegistry {
    FunctionRegistry::new()
        .with("clobber", clobber)
        .with("build", build)
        .with("package", package)
}

fn work_dir(config: &ConfigStore) -> Result<PathBuf, OperationError> {
    config
        .get_str("work_dir")
        .map(PathBuf::from)
        .ok_or_else(|| OperationError::new("work_dir is not set"))
}

fn clobber(config: &ConfigStore) -> ActionOutcome {
    let dir = match work_dir(config) {
        Ok(dir) => dir,
        Err(err) => return err.into(),
    };
    if !dir.exists() {
        return ActionOutcome::ok();
    }
    match fs::remove_dir_all(&dir) {
        Ok(()) => ActionOutcome::ok(),
        Err(err) => ActionOutcome::error(format!("remove {}: {err}", dir.display())),
    }
}

fn build(config: &ConfigStore) -> ActionOutcome {
    let dir = match work_dir(config) {
        Ok(dir) => dir,
        Err(err) => return err.into(),
    };
    let write = LogMethod::new("write_manifest", LogMethodOptions::default());
    match write.call(write_manifest, (dir.display().to_string(),)) {
        Ok(path) => ActionOutcome::success(path),
        Err(err) => err.into(),
    }
}

fn write_manifest((dir,): (String,)) -> Result<String, OperationError> {
    let manifest = PathBuf::from(&dir).join("manifest.json");
    fs::create_dir_all(&dir)
        .and_then(|()| fs::write(&manifest, json!({ "actions": ACTIONS }).to_string()))
        .map_err(|err| OperationError::new(format!("write {}: {err}", manifest.display())))?;
    Ok(manifest.display().to_string())
}

fn package(config: &ConfigStore) -> ActionOutcome {
    let dir = match work_dir(config) {
        Ok(dir) => dir,
        Err(err) => return err.into(),
    };
    let manifest = dir.join("manifest.json");
    match fs::read_to_string(&manifest).context("read manifest") {
        Ok(contents) => ActionOutcome::success(json!({ "bytes": contents.len() })),
        Err(err) => ActionOutcome::fatal(format!("{}: {err:#}", manifest.display())),
    }
}
