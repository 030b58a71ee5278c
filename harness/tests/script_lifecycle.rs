//! Run-level tests for listener dispatch and fatal propagation.
//!
//! Each test builds a three-action script `[a, b, c]`, attaches recording
//! listeners at every timing, and checks the exact event sequence.

use scriptharness::action::ActionHistory;
use scriptharness::test_support::EventLog;
use scriptharness::{Action, ActionOutcome, ActionStatus, RunError, Script, Timing};

fn script_with(log: &EventLog, b_outcome: ActionOutcome, selection: Option<&[&str]>) -> Script {
    let mut builder = Script::builder("root")
        .push_action(Action::new("a", log.action("a", ActionOutcome::ok())).with_enabled(true))
        .push_action(Action::new("b", log.action("b", b_outcome)).with_enabled(true))
        .push_action(Action::new("c", log.action("c", ActionOutcome::ok())).with_enabled(true));
    if let Some(selection) = selection {
        builder = builder.select_actions(selection.iter().copied());
    }
    let mut script = builder.build().expect("build");
    for timing in Timing::ALL {
        script
            .add_listener(timing, None, log.listener("all"))
            .expect("add listener");
    }
    script
}

#[test]
fn all_actions_succeed() {
    let log = EventLog::new();
    let mut script = script_with(&log, ActionOutcome::success(42), None);

    let summary = script.run().expect("run");

    assert_eq!(
        log.events(),
        vec![
            "all:pre_run",
            "all:pre_action:a",
            "run:a",
            "all:post_action:a",
            "all:pre_action:b",
            "run:b",
            "all:post_action:b",
            "all:pre_action:c",
            "run:c",
            "all:post_action:c",
            "all:post_run",
        ]
    );
    assert!(!summary.has_errors());
    assert_eq!(
        script.action("b").expect("b").history().return_value,
        Some(serde_json::json!(42))
    );
}

#[test]
fn fatal_action_aborts_remaining_sequence() {
    let log = EventLog::new();
    let mut script = script_with(&log, ActionOutcome::fatal("b exploded"), None);

    let err = script.run().expect_err("fatal");

    assert!(matches!(&err, RunError::Fatal(fatal) if fatal.message == "b exploded"));
    assert_eq!(
        log.events(),
        vec![
            "all:pre_run",
            "all:pre_action:a",
            "run:a",
            "all:post_action:a",
            "all:pre_action:b",
            "run:b",
            "all:post_fatal:b",
        ]
    );
    let b = script.action("b").expect("b");
    assert_eq!(b.status(), ActionStatus::Fatal);
    assert!(b.history().end_time.is_some());
    let c = script.action("c").expect("c");
    assert_eq!(c.status(), ActionStatus::NotRun);
    assert_eq!(c.history(), &ActionHistory::default());
}

#[test]
fn recoverable_error_continues_run() {
    let log = EventLog::new();
    let mut script = script_with(&log, ActionOutcome::error("b failed"), None);

    let summary = script.run().expect("run");

    assert_eq!(
        log.events(),
        vec![
            "all:pre_run",
            "all:pre_action:a",
            "run:a",
            "all:post_action:a",
            "all:pre_action:b",
            "run:b",
            "all:post_action:b",
            "all:pre_action:c",
            "run:c",
            "all:post_action:c",
            "all:post_run",
        ]
    );
    assert_eq!(summary.status_of("a"), Some(ActionStatus::Success));
    assert_eq!(summary.status_of("b"), Some(ActionStatus::Error));
    assert_eq!(summary.status_of("c"), Some(ActionStatus::Success));
}

#[test]
fn deselected_action_is_skipped_silently() {
    let log = EventLog::new();
    let mut script = script_with(&log, ActionOutcome::ok(), Some(&["a", "c"]));

    let summary = script.run().expect("run");

    assert_eq!(
        log.events(),
        vec![
            "all:pre_run",
            "all:pre_action:a",
            "run:a",
            "all:post_action:a",
            "all:pre_action:c",
            "run:c",
            "all:post_action:c",
            "all:post_run",
        ]
    );
    assert_eq!(summary.status_of("b"), Some(ActionStatus::NotRun));
}

#[test]
fn filtered_listeners_fire_only_for_named_actions() {
    let log = EventLog::new();
    let mut script = Script::builder("root")
        .push_action(Action::new("a", log.action("a", ActionOutcome::ok())).with_enabled(true))
        .push_action(Action::new("b", log.action("b", ActionOutcome::ok())).with_enabled(true))
        .build()
        .expect("build");
    script
        .add_listener(Timing::PreAction, Some(&["b"][..]), log.listener("only-b"))
        .expect("add");
    script
        .add_listener_named("post_action", Some(&["a"][..]), log.listener("only-a"))
        .expect("add");

    script.run().expect("run");

    assert_eq!(
        log.events(),
        vec!["run:a", "only-a:post_action:a", "only-b:pre_action:b", "run:b"]
    );
}

#[test]
fn dispatch_order_is_stable_across_runs() {
    let log = EventLog::new();
    let mut script = Script::builder("root").build().expect("build");
    for label in ["first", "second", "third"] {
        script
            .add_listener(Timing::PreRun, None, log.listener(label))
            .expect("add");
    }

    script.run().expect("first run");
    script.run().expect("second run");

    assert_eq!(
        log.events(),
        vec![
            "first:pre_run",
            "second:pre_run",
            "third:pre_run",
            "first:pre_run",
            "second:pre_run",
            "third:pre_run",
        ]
    );
}

#[test]
fn listeners_read_shared_config() {
    let log = EventLog::new();
    let mut builder = Script::builder("root").push_action(
        Action::new("deploy", |config: &scriptharness::ConfigStore| {
            match config.get_str("target") {
                Some(target) => ActionOutcome::success(target),
                None => ActionOutcome::error("no target"),
            }
        })
        .with_enabled(true),
    );
    builder
        .set_config(
            scriptharness::ConfigBuilder::new()
                .set("target", "staging")
                .build(),
        )
        .expect("config");
    let mut script = builder.build().expect("build");
    let recorder = log.clone();
    script
        .add_listener(Timing::PostAction, None, move |ctx| {
            let target = ctx.config.get_str("target").unwrap_or("none");
            let status = ctx.action.map(Action::status).unwrap_or_default();
            recorder.push(format!("{target}:{status}"));
            Ok(())
        })
        .expect("add");

    script.run().expect("run");

    assert_eq!(log.events(), vec!["staging:success"]);
}
