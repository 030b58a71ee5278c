//! Command-line surface shared by scripts built on the harness.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};

/// Options every script accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Parser)]
#[command(name = "script", about = "Run a scriptharness script")]
pub struct ScriptArgs {
    /// Specify the actions to run.
    #[arg(long, num_args = 1.., value_name = "ACTION")]
    pub actions: Option<Vec<String>>,

    /// List all actions (default prepended with '*') and exit.
    #[arg(long)]
    pub list_actions: bool,

    /// Specify required config files (TOML, or JSON with a .json extension).
    #[arg(short = 'c', long = "config-file", visible_alias = "cfg", value_name = "CONFIG_FILE")]
    pub config_files: Vec<PathBuf>,

    /// Override a single config value.
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,

    /// Treat config mutation attempts as errors.
    #[arg(long)]
    pub strict: bool,

    /// Also write log output to this file.
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Append to `--log-file` instead of truncating it.
    #[arg(long, requires = "log_file")]
    pub append: bool,
}

/// Parse `argv`, rejecting `--actions` values that are not in `declared`.
pub fn parse_args<I, T>(declared: &[&str], argv: I) -> Result<ScriptArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = ScriptArgs::try_parse_from(argv)?;
    if let Some(selected) = &args.actions {
        if let Some(unknown) = selected
            .iter()
            .find(|name| !declared.contains(&name.as_str()))
        {
            let mut command = ScriptArgs::command();
            return Err(command.error(
                ErrorKind::InvalidValue,
                format!(
                    "invalid action '{unknown}' for '--actions' (possible values: {})",
                    declared.join(", ")
                ),
            ));
        }
    }
    Ok(args)
}

/// One line per action; enabled-by-default actions are prefixed with `* `.
pub fn list_actions(declared: &[(String, bool)]) -> String {
    declared
        .iter()
        .map(|(name, enabled)| {
            if *enabled {
                format!("* {name}")
            } else {
                format!("  {name}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const DECLARED: &[&str] = &["clobber", "build", "upload"];

    #[test]
    fn parse_without_actions() {
        let args = parse_args(DECLARED, ["script"]).expect("parse");
        assert_eq!(args, ScriptArgs::default());
    }

    #[test]
    fn parse_action_subset() {
        let args = parse_args(DECLARED, ["script", "--actions", "build", "upload"]).expect("parse");
        assert_eq!(
            args.actions,
            Some(vec!["build".to_string(), "upload".to_string()])
        );
    }

    #[test]
    fn parse_rejects_undeclared_action() {
        let err = parse_args(DECLARED, ["script", "--actions", "deploy"]).expect_err("invalid");
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
    }

    #[test]
    fn parse_config_files_and_overrides() {
        let args = parse_args(
            DECLARED,
            [
                "script",
                "-c",
                "base.toml",
                "--cfg",
                "local.json",
                "--set",
                "branch=main",
                "--strict",
            ],
        )
        .expect("parse");
        assert_eq!(
            args.config_files,
            vec![PathBuf::from("base.toml"), PathBuf::from("local.json")]
        );
        assert_eq!(args.overrides, vec!["branch=main".to_string()]);
        assert!(args.strict);
    }

    #[test]
    fn parse_log_file_options() {
        let args =
            parse_args(DECLARED, ["script", "--log-file", "run.log", "--append"]).expect("parse");
        assert_eq!(args.log_file, Some(PathBuf::from("run.log")));
        assert!(args.append);

        let err = parse_args(DECLARED, ["script", "--append"]).expect_err("needs log file");
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn list_marks_enabled_actions() {
        let listing = list_actions(&[("clobber".to_string(), false), ("build".to_string(), true)]);
        assert_eq!(listing, "  clobber\n* build");
    }
}
