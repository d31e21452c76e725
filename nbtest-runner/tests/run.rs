// Copyright (c) The nbtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end runs against the fixture workspace.
//!
//! The fixture config "executes" notebooks by copying them with `sh`, so these tests are Unix
//! only.

#![cfg(unix)]

use camino::Utf8PathBuf;
use camino_tempfile::Utf8TempDir;
use nbtest_runner::{
    config::{NbtestConfig, NbtestJunitConfig},
    discovery::NotebookDiscovery,
    list::{NotebookList, SelectionStatus, SkipReason},
    reporter::{CancelReason, NotebookEvent, NotebookReporterBuilder},
    runner::{ExecutionResult, NotebookRunnerBuilder},
    selection::SelectionConfig,
    signal::SignalHandlerKind,
    test_filter::TestFilter,
};
use pretty_assertions::assert_eq;

fn workspace_root() -> Utf8PathBuf {
    Utf8PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures/workspace")
}

fn config() -> NbtestConfig {
    NbtestConfig::from_sources(workspace_root(), None).expect("fixture config is valid")
}

fn make_list(config: &NbtestConfig, profile_name: &str, filter: &[&str]) -> NotebookList {
    let profile = config.profile(profile_name).expect("profile exists");
    let discovered = NotebookDiscovery::new(profile.notebook_dir())
        .discover()
        .expect("fixture notebooks discovered");
    let selection = SelectionConfig {
        fixed_ignore: profile.ignore(),
        random_exclusions: profile.random_exclusions(),
        sampling: profile.sampling(),
        seed: profile.seed(),
    }
    .select(&discovered)
    .expect("selection succeeded");
    let filter = TestFilter::new(filter).expect("filter built");
    NotebookList::new(discovered, selection, &filter)
}

#[test]
fn default_profile_selection() {
    let config = config();
    let list = make_list(&config, "default", &[]);

    assert_eq!(list.notebook_count(), 4, "checkpoints aren't discovered");
    assert_eq!(list.run_count(), 2);
    assert_eq!(list.selection().seed(), 7);

    let reasons: Vec<_> = list
        .iter()
        .filter_map(|instance| match instance.status {
            SelectionStatus::Run => None,
            SelectionStatus::Skipped { reason } => Some((instance.id, reason)),
        })
        .collect();
    assert_eq!(reasons.len(), 2);
    assert!(reasons.contains(&("3-stored-error.ipynb", SkipReason::FixedIgnore)));
    assert_eq!(
        reasons
            .iter()
            .filter(|(_, reason)| *reason == SkipReason::Random)
            .count(),
        1
    );

    // The same seed gives the same selection.
    let again = make_list(&config, "default", &[]);
    assert_eq!(
        list.iter().map(|nb| nb.status).collect::<Vec<_>>(),
        again.iter().map(|nb| nb.status).collect::<Vec<_>>(),
    );
}

#[test]
fn default_profile_passes() {
    let config = config();
    let profile = config.profile("default").expect("profile exists");
    let list = make_list(&config, "default", &[]);

    let mut finished = Vec::new();
    let mut skipped = Vec::new();
    let run_stats = NotebookRunnerBuilder::from_profile(&profile)
        .build(&list, SignalHandlerKind::Noop)
        .expect("runner built")
        .execute(|event| match event {
            NotebookEvent::NotebookFinished { instance, status } => {
                finished.push((instance.id.to_owned(), status.result.is_success()));
            }
            NotebookEvent::NotebookSkipped { instance, .. } => {
                skipped.push(instance.id.to_owned());
            }
            _ => {}
        });

    assert!(run_stats.is_success(), "run stats: {run_stats:?}");
    assert_eq!(run_stats.passed, 2);
    assert_eq!(run_stats.skipped, 2);
    assert_eq!(finished.len(), 2);
    assert!(finished.iter().all(|(_, success)| *success));
    assert_eq!(skipped.len(), 2);
}

#[test]
fn stored_error_fails_run() {
    let config = config();
    let profile = config.profile("all").expect("profile exists");
    let list = make_list(&config, "all", &[]);
    assert_eq!(list.run_count(), 4);

    let mut reporter_builder = NotebookReporterBuilder::from_profile(&profile);
    let junit_dir = Utf8TempDir::new().expect("created temp dir");
    let junit_path = junit_dir.path().join("junit.xml");
    reporter_builder.set_junit(NbtestJunitConfig::new(&junit_path, profile.junit_report_name()));
    let mut reporter = reporter_builder.build(&list);

    let mut output = Vec::new();
    let mut errors = Vec::new();
    let run_stats = NotebookRunnerBuilder::from_profile(&profile)
        .build(&list, SignalHandlerKind::Noop)
        .expect("runner built")
        .try_execute(|event| {
            if let NotebookEvent::NotebookFinished { instance, status } = &event {
                if let ExecutionResult::NotebookError { errors: cell_errors } = &status.result {
                    errors.push((instance.id.to_owned(), cell_errors.clone()));
                }
            }
            reporter.report_event(event, &mut output)
        })
        .expect("events reported");

    assert!(!run_stats.is_success());
    assert_eq!(run_stats.passed, 3);
    assert_eq!(run_stats.failed, 1);

    assert_eq!(errors.len(), 1);
    let (id, cell_errors) = &errors[0];
    assert_eq!(id, "3-stored-error.ipynb");
    assert_eq!(cell_errors[0].cell_index, 1);
    assert_eq!(cell_errors[0].ename, "ZeroDivisionError");

    let output = String::from_utf8(output).expect("valid UTF-8");
    assert!(output.contains("ERROR ["), "output: {output}");
    // The "all" profile shows failures at the end.
    let summary = output.find("Summary").expect("summary present");
    let cell = output
        .find("--- CELL 1: 3-stored-error.ipynb ---")
        .expect("cell error present");
    assert!(summary < cell, "output: {output}");

    let xml = std::fs::read_to_string(&junit_path).expect("junit written");
    assert!(xml.contains(r#"<testsuites name="nbtest-run""#), "xml: {xml}");
    assert!(xml.contains(r#"type="cell error""#), "xml: {xml}");
}

#[test]
fn fail_fast_cancels_run() {
    let config = config();
    let profile = config.profile("all").expect("profile exists");
    let list = make_list(&config, "all", &["stored-error"]);
    assert_eq!(list.run_count(), 1);

    let mut builder = NotebookRunnerBuilder::from_profile(&profile);
    builder.set_fail_fast(true);
    let mut cancel_reasons = Vec::new();
    let run_stats = builder
        .build(&list, SignalHandlerKind::Noop)
        .expect("runner built")
        .execute(|event| {
            if let NotebookEvent::RunBeginCancel { reason, .. } = event {
                cancel_reasons.push(reason);
            }
        });

    assert_eq!(cancel_reasons, vec![CancelReason::NotebookFailure]);
    assert_eq!(run_stats.cancel_reason, Some(CancelReason::NotebookFailure));
    assert_eq!(run_stats.skipped, 3);
    assert!(!run_stats.is_success());
}
