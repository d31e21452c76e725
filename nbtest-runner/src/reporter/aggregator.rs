// Copyright (c) The nbtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JUnit aggregation of notebook events.

use crate::{
    config::NbtestJunitConfig,
    errors::{DisplayErrorChain, WriteEventError},
    list::{NotebookInstance, NotebookList},
    reporter::NotebookEvent,
    runner::{ExecuteStatus, ExecutionResult},
};
use quick_junit::{NonSuccessKind, Report, TestCase, TestCaseStatus, TestSuite};
use std::fs::File;

#[derive(Debug)]
pub(crate) struct EventAggregator<'a> {
    junit: Option<MetadataJunit<'a>>,
}

impl<'a> EventAggregator<'a> {
    pub(crate) fn new(list: &NotebookList, junit: Option<NbtestJunitConfig<'a>>) -> Self {
        Self {
            junit: junit.map(|config| MetadataJunit::new(list, config)),
        }
    }

    pub(crate) fn write_event(&mut self, event: NotebookEvent<'a>) -> Result<(), WriteEventError> {
        if let Some(junit) = &mut self.junit {
            junit.write_event(event)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct MetadataJunit<'a> {
    config: NbtestJunitConfig<'a>,
    suite_name: String,
    test_suite: Option<TestSuite>,
}

impl<'a> MetadataJunit<'a> {
    fn new(list: &NotebookList, config: NbtestJunitConfig<'a>) -> Self {
        let suite_name = list.notebook_dir().to_string();
        Self {
            config,
            test_suite: Some(TestSuite::new(suite_name.as_str())),
            suite_name,
        }
    }

    fn write_event(&mut self, event: NotebookEvent<'a>) -> Result<(), WriteEventError> {
        match event {
            NotebookEvent::RunStarted { .. } | NotebookEvent::RunBeginCancel { .. } => {}
            NotebookEvent::NotebookSkipped { instance, reason } => {
                let mut status = TestCaseStatus::skipped();
                status.set_message(format!("skipped: {reason}"));
                let testcase = self.testcase(instance, status);
                self.add_testcase(testcase);
            }
            NotebookEvent::NotebookFinished { instance, status } => {
                let testcase_status = match &status.result {
                    ExecutionResult::Pass => TestCaseStatus::success(),
                    result => {
                        let (kind, ty) = kind_ty(result);
                        let mut testcase_status = TestCaseStatus::non_success(kind);
                        testcase_status.set_type(ty);
                        set_failure_details(&status, &mut testcase_status);
                        testcase_status
                    }
                };

                let mut testcase = self.testcase(instance, testcase_status);
                testcase.set_time(status.time_taken);
                // Escape codes aren't valid XML.
                if !status.result.is_success() {
                    if !status.stdout().is_empty() {
                        testcase.set_system_out(strip_output(status.stdout()));
                    }
                    if !status.stderr().is_empty() {
                        testcase.set_system_err(strip_output(status.stderr()));
                    }
                }
                self.add_testcase(testcase);
            }
            NotebookEvent::RunFinished { elapsed, .. } => {
                let mut report = Report::new(self.config.report_name());
                report
                    .set_time(elapsed)
                    .add_test_suites(self.test_suite.take());

                let junit_path = self.config.path();
                if let Some(junit_dir) = junit_path.parent() {
                    std::fs::create_dir_all(junit_dir).map_err(|error| WriteEventError::Fs {
                        file: junit_dir.to_path_buf(),
                        error,
                    })?;
                }

                let f = File::create(junit_path).map_err(|error| WriteEventError::Fs {
                    file: junit_path.to_path_buf(),
                    error,
                })?;
                report
                    .serialize(f)
                    .map_err(|error| WriteEventError::Junit {
                        file: junit_path.to_path_buf(),
                        error: Box::new(error),
                    })?;
            }
        }

        Ok(())
    }

    fn testcase(&self, instance: NotebookInstance<'_>, status: TestCaseStatus) -> TestCase {
        let mut testcase = TestCase::new(instance.id, status);
        testcase.set_classname(self.suite_name.as_str());
        testcase
    }

    fn add_testcase(&mut self, testcase: TestCase) {
        if let Some(suite) = &mut self.test_suite {
            suite.add_test_case(testcase);
        }
    }
}

fn strip_output(output: &[u8]) -> String {
    strip_ansi_escapes::strip_str(String::from_utf8_lossy(output))
}

fn kind_ty(result: &ExecutionResult) -> (NonSuccessKind, &'static str) {
    match result {
        ExecutionResult::Fail { .. } => (NonSuccessKind::Failure, "notebook failure"),
        ExecutionResult::NotebookError { .. } => (NonSuccessKind::Failure, "cell error"),
        ExecutionResult::Timeout => (NonSuccessKind::Failure, "notebook timeout"),
        ExecutionResult::ExecFail { .. } => (NonSuccessKind::Error, "execution failure"),
        ExecutionResult::Pass => unreachable!("this is a failure status"),
    }
}

fn set_failure_details(status: &ExecuteStatus, out: &mut TestCaseStatus) {
    match &status.result {
        ExecutionResult::Fail { exit_code } => {
            let message = match exit_code {
                Some(code) => format!("notebook command exited with code {code}"),
                None => "notebook command was terminated by a signal".to_owned(),
            };
            out.set_message(message);
        }
        ExecutionResult::NotebookError { errors } => {
            if let Some(first) = errors.first() {
                out.set_message(first.to_string());
            }
            let description = errors
                .iter()
                .map(|error| format!("{error}\n{}", error.traceback_text()))
                .collect::<Vec<_>>()
                .join("\n\n");
            out.set_description(description);
        }
        ExecutionResult::Timeout => {
            out.set_message(format!(
                "notebook ran for longer than {:.3}s",
                status.time_taken.as_secs_f64()
            ));
        }
        ExecutionResult::ExecFail { error } => {
            out.set_message(format!("notebook execution failed: {error}"));
            out.set_description(DisplayErrorChain::new(&**error).to_string());
        }
        ExecutionResult::Pass => {}
    }
}
