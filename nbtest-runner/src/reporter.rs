// Copyright (c) The nbtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prints out and aggregates notebook execution statuses.
//!
//! The main structure in this module is [`NotebookReporter`].

mod aggregator;

use crate::{
    config::{NbtestJunitConfig, NbtestProfile},
    errors::{DisplayErrorChain, WriteEventError},
    list::{NotebookInstance, NotebookList, SkipReason},
    reporter::aggregator::EventAggregator,
    runner::{ExecuteStatus, ExecutionResult, RunStats},
};
use owo_colors::{OwoColorize, Style};
use serde::Deserialize;
use std::{
    fmt,
    io::{self, Write},
    time::{Duration, SystemTime},
};

/// When to display the output of failing notebooks.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureOutput {
    /// Show output as soon as the notebook finishes.
    Immediate,

    /// Show output at the end of the run.
    Final,

    /// Never show output.
    Never,
}

impl FailureOutput {
    /// String representations of all known variants.
    pub fn variants() -> &'static [&'static str] {
        &["immediate", "final", "never"]
    }
}

impl fmt::Display for FailureOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureOutput::Immediate => write!(f, "immediate"),
            FailureOutput::Final => write!(f, "final"),
            FailureOutput::Never => write!(f, "never"),
        }
    }
}

/// Notebook reporter builder.
#[derive(Debug, Default)]
pub struct NotebookReporterBuilder<'cfg> {
    failure_output: Option<FailureOutput>,
    junit: Option<NbtestJunitConfig<'cfg>>,
}

impl<'cfg> NotebookReporterBuilder<'cfg> {
    /// Creates a builder with the settings from a profile.
    pub fn from_profile(profile: &NbtestProfile<'cfg>) -> Self {
        Self {
            failure_output: Some(profile.failure_output()),
            junit: profile.junit(),
        }
    }

    /// Sets the conditions under which notebook failures are output.
    pub fn set_failure_output(&mut self, failure_output: FailureOutput) -> &mut Self {
        self.failure_output = Some(failure_output);
        self
    }

    /// Writes a JUnit report at the end of the run.
    pub fn set_junit(&mut self, junit: NbtestJunitConfig<'cfg>) -> &mut Self {
        self.junit = Some(junit);
        self
    }

    /// Creates a new notebook reporter.
    pub fn build<'a>(&self, list: &'a NotebookList) -> NotebookReporter<'a>
    where
        'cfg: 'a,
    {
        NotebookReporter {
            failure_output: self.failure_output.unwrap_or(FailureOutput::Immediate),
            styles: Box::default(),
            cancel_status: None,
            final_outputs: Vec::new(),
            aggregator: EventAggregator::new(list, self.junit.clone()),
        }
    }
}

/// Reports notebook results to a writer (typically stdout) and to JUnit.
pub struct NotebookReporter<'a> {
    failure_output: FailureOutput,
    styles: Box<Styles>,
    cancel_status: Option<CancelReason>,
    final_outputs: Vec<(NotebookInstance<'a>, ExecuteStatus)>,
    aggregator: EventAggregator<'a>,
}

impl<'a> NotebookReporter<'a> {
    /// Colorizes output.
    pub fn colorize(&mut self) {
        self.styles.colorize();
    }

    /// Reports a notebook event.
    pub fn report_event(
        &mut self,
        event: NotebookEvent<'a>,
        writer: impl Write,
    ) -> Result<(), WriteEventError> {
        self.write_event_impl(&event, writer)
            .map_err(WriteEventError::Io)?;
        self.aggregator.write_event(event)?;
        Ok(())
    }

    // ---
    // Helper methods
    // ---

    fn write_event_impl(
        &mut self,
        event: &NotebookEvent<'a>,
        mut writer: impl Write,
    ) -> io::Result<()> {
        match event {
            NotebookEvent::RunStarted { list } => {
                write!(writer, "{:>12} ", "Starting".style(self.styles.pass))?;
                write!(
                    writer,
                    "{} notebooks",
                    list.run_count().style(self.styles.count)
                )?;
                let skip_count = list.skip_count();
                if skip_count > 0 {
                    write!(writer, " ({} skipped)", skip_count.style(self.styles.count))?;
                }
                writeln!(writer)?;
            }
            NotebookEvent::NotebookSkipped { instance, reason } => {
                write!(writer, "{:>12} ", "SKIP".style(self.styles.skip))?;
                // same spacing [   0.034s]
                write!(writer, "[         ] ")?;
                write!(writer, "{}", instance.id.style(self.styles.notebook_name))?;
                writeln!(writer, " ({reason})")?;
            }
            NotebookEvent::NotebookFinished { instance, status } => {
                let (label, style) = match &status.result {
                    ExecutionResult::Pass => ("PASS", self.styles.pass),
                    ExecutionResult::Fail { .. } => ("FAIL", self.styles.fail),
                    ExecutionResult::NotebookError { .. } => ("ERROR", self.styles.fail),
                    ExecutionResult::Timeout => ("TIMEOUT", self.styles.fail),
                    ExecutionResult::ExecFail { .. } => ("EXECFAIL", self.styles.fail),
                };
                write!(writer, "{:>12} ", label.style(style))?;
                self.write_duration(status.time_taken, &mut writer)?;
                write!(writer, "{}", instance.id.style(self.styles.notebook_name))?;
                if let ExecutionResult::Fail { exit_code } = status.result {
                    match exit_code {
                        Some(code) => write!(writer, " (exit code {code})")?,
                        None => write!(writer, " (terminated by signal)")?,
                    }
                }
                writeln!(writer)?;

                // Don't print out failures after Ctrl-C.
                if !status.result.is_success() && self.cancel_status < Some(CancelReason::Signal) {
                    match self.failure_output {
                        FailureOutput::Immediate => {
                            self.write_failure(instance, status, &mut writer)?;
                        }
                        FailureOutput::Final => {
                            self.final_outputs.push((*instance, status.clone()));
                        }
                        FailureOutput::Never => {}
                    }
                }
            }
            NotebookEvent::RunBeginCancel { running, reason } => {
                self.cancel_status = self.cancel_status.max(Some(*reason));

                write!(writer, "{:>12} ", "Canceling".style(self.styles.fail))?;
                writeln!(
                    writer,
                    "due to {}: {} notebooks still running",
                    reason.style(self.styles.fail),
                    running.style(self.styles.count)
                )?;
            }
            NotebookEvent::RunFinished { elapsed, run_stats, .. } => {
                let RunStats {
                    initial_run_count,
                    final_run_count,
                    passed,
                    failed,
                    timed_out,
                    exec_failed,
                    skipped,
                    ..
                } = run_stats;
                let summary_style = if run_stats.any_failed() {
                    self.styles.fail
                } else {
                    self.styles.pass
                };
                write!(writer, "{:>12} ", "Summary".style(summary_style))?;
                self.write_duration(*elapsed, &mut writer)?;

                write!(writer, "{}", final_run_count.style(self.styles.count))?;
                if final_run_count != initial_run_count {
                    write!(writer, "/{}", initial_run_count.style(self.styles.count))?;
                }
                write!(
                    writer,
                    " notebooks run: {} passed, ",
                    passed.style(self.styles.pass)
                )?;

                for (count, label) in [
                    (*failed, "failed"),
                    (*timed_out, "timed out"),
                    (*exec_failed, "exec failed"),
                ] {
                    if count > 0 {
                        write!(
                            writer,
                            "{} {}, ",
                            count.style(self.styles.count),
                            label.style(self.styles.fail),
                        )?;
                    }
                }

                writeln!(
                    writer,
                    "{} {}",
                    skipped.style(self.styles.count),
                    "skipped".style(self.styles.skip),
                )?;

                if self.cancel_status < Some(CancelReason::Signal) {
                    for (instance, status) in &self.final_outputs {
                        self.write_failure(instance, status, &mut writer)?;
                    }
                }
            }
        }

        Ok(())
    }

    fn write_duration(&self, duration: Duration, mut writer: impl Write) -> io::Result<()> {
        // * > means right-align.
        // * 8 is the number of characters to pad to.
        // * .3 means print three digits after the decimal point.
        write!(writer, "[{:>8.3?}s] ", duration.as_secs_f64())
    }

    fn write_failure(
        &self,
        instance: &NotebookInstance<'a>,
        status: &ExecuteStatus,
        mut writer: impl Write,
    ) -> io::Result<()> {
        let header_style = self.styles.fail;

        for (label, output) in [("STDOUT", status.stdout()), ("STDERR", status.stderr())] {
            if output.is_empty() {
                continue;
            }
            self.write_header(instance, label, &mut writer)?;
            {
                // Notebook tracebacks are colored regardless of whether output is a terminal.
                let mut no_color = strip_ansi_escapes::Writer::new(&mut writer);
                no_color.write_all(output)?;
            }
            if !output.ends_with(b"\n") {
                writeln!(writer)?;
            }
        }

        match &status.result {
            ExecutionResult::NotebookError { errors } => {
                for error in errors {
                    let label = format!("CELL {}", error.cell_index);
                    self.write_header(instance, &label, &mut writer)?;
                    writeln!(
                        writer,
                        "{}: {}",
                        error.ename.style(header_style),
                        error.evalue
                    )?;
                    let traceback = error.traceback_text();
                    if !traceback.is_empty() {
                        writeln!(writer, "{traceback}")?;
                    }
                }
            }
            ExecutionResult::ExecFail { error } => {
                self.write_header(instance, "EXECFAIL", &mut writer)?;
                writeln!(writer, "{}", DisplayErrorChain::new(&**error))?;
            }
            ExecutionResult::Pass | ExecutionResult::Fail { .. } | ExecutionResult::Timeout => {}
        }

        writeln!(writer)
    }

    fn write_header(
        &self,
        instance: &NotebookInstance<'a>,
        label: &str,
        mut writer: impl Write,
    ) -> io::Result<()> {
        let header_style = self.styles.fail;
        writeln!(
            writer,
            "\n{}{}: {}{}",
            "--- ".style(header_style),
            label.style(header_style),
            instance.id.style(self.styles.notebook_name),
            " ---".style(header_style),
        )
    }
}

impl fmt::Debug for NotebookReporter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotebookReporter")
            .field("failure_output", &self.failure_output)
            .field("cancel_status", &self.cancel_status)
            .finish_non_exhaustive()
    }
}

/// A notebook event.
///
/// Events are produced by a [`NotebookRunner`](crate::runner::NotebookRunner) and consumed by a
/// [`NotebookReporter`].
#[derive(Clone, Debug)]
pub enum NotebookEvent<'a> {
    /// The run started.
    RunStarted {
        /// The list of notebooks that will be run.
        list: &'a NotebookList,
    },

    /// A notebook was skipped.
    NotebookSkipped {
        /// The notebook that was skipped.
        instance: NotebookInstance<'a>,

        /// The reason this notebook was skipped.
        reason: SkipReason,
    },

    /// A notebook finished running.
    NotebookFinished {
        /// The notebook that finished running.
        instance: NotebookInstance<'a>,

        /// How the notebook ran.
        status: ExecuteStatus,
    },

    /// A cancellation notice was received.
    RunBeginCancel {
        /// The number of notebooks still running.
        running: usize,

        /// The reason this run was canceled.
        reason: CancelReason,
    },

    /// The run finished.
    RunFinished {
        /// The time at which the run was started.
        start_time: SystemTime,

        /// The amount of time it took for the notebooks to run.
        elapsed: Duration,

        /// Statistics for the run.
        run_stats: RunStats,
    },
}

// Note: the order here matters -- it indicates severity of cancellation
/// The reason why a run is being canceled.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum CancelReason {
    /// A notebook failed and fail-fast is enabled.
    NotebookFailure,

    /// An error occurred while reporting results.
    ReportError,

    /// A termination signal was received.
    Signal,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::NotebookFailure => write!(f, "notebook failure"),
            CancelReason::ReportError => write!(f, "error"),
            CancelReason::Signal => write!(f, "signal"),
        }
    }
}

#[derive(Debug, Default)]
struct Styles {
    count: Style,
    pass: Style,
    fail: Style,
    skip: Style,
    notebook_name: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.count = Style::new().bold();
        self.pass = Style::new().green().bold();
        self.fail = Style::new().red().bold();
        self.skip = Style::new().yellow().bold();
        self.notebook_name = Style::new().blue().bold();
    }
}
