// Copyright (c) The nbtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The notebook runner.
//!
//! The main structure in this module is [`NotebookRunner`].

use crate::{
    command::{CommandContext, CommandSpec, NotebookCommand},
    config::NbtestProfile,
    errors::{NotebookExecError, RunnerBuildError},
    list::{NotebookList, SelectionStatus},
    notebook::{CellError, Notebook},
    reporter::{CancelReason, NotebookEvent},
    signal::{SignalHandler, SignalHandlerKind},
};
use camino::Utf8Path;
use futures::prelude::*;
use std::{
    convert::Infallible,
    process::Stdio,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant, SystemTime},
};
use tokio::runtime::Runtime;
use tracing::{debug, warn};

/// Notebook runner options.
#[derive(Debug, Default)]
pub struct NotebookRunnerBuilder {
    jobs: Option<usize>,
    timeout: Option<Duration>,
    kernel: Option<String>,
    fail_fast: Option<bool>,
    command: Option<CommandSpec>,
}

impl NotebookRunnerBuilder {
    /// Creates a builder with the settings from a profile.
    pub fn from_profile(profile: &NbtestProfile<'_>) -> Self {
        let mut builder = Self::default();
        builder
            .set_jobs(profile.jobs())
            .set_timeout(profile.timeout())
            .set_kernel(profile.kernel())
            .set_fail_fast(profile.fail_fast());
        if let Some(command) = profile.command() {
            builder.set_command(command.clone());
        }
        builder
    }

    /// Sets the number of notebooks to run at the same time. Values below 1 are treated as 1.
    pub fn set_jobs(&mut self, jobs: usize) -> &mut Self {
        self.jobs = Some(jobs);
        self
    }

    /// Sets the per-notebook timeout.
    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the Jupyter kernel.
    pub fn set_kernel(&mut self, kernel: impl Into<String>) -> &mut Self {
        self.kernel = Some(kernel.into());
        self
    }

    /// Sets whether the run stops on the first failure.
    pub fn set_fail_fast(&mut self, fail_fast: bool) -> &mut Self {
        self.fail_fast = Some(fail_fast);
        self
    }

    /// Sets the command used to execute each notebook. Defaults to `jupyter nbconvert`.
    pub fn set_command(&mut self, command: CommandSpec) -> &mut Self {
        self.command = Some(command);
        self
    }

    /// Builds the [`NotebookExecutor`] for these settings, without a runtime.
    pub fn build_executor(&self) -> Result<NotebookExecutor, RunnerBuildError> {
        let command = match &self.command {
            Some(spec) => NotebookCommand::new(spec)?,
            None => NotebookCommand::jupyter_nbconvert(),
        };
        Ok(NotebookExecutor {
            command,
            timeout: self.timeout.unwrap_or(NotebookExecutor::DEFAULT_TIMEOUT),
            kernel: self
                .kernel
                .clone()
                .unwrap_or_else(|| NotebookExecutor::DEFAULT_KERNEL.to_owned()),
        })
    }

    /// Creates a new notebook runner.
    pub fn build(
        self,
        list: &NotebookList,
        handler_kind: SignalHandlerKind,
    ) -> Result<NotebookRunner<'_>, RunnerBuildError> {
        let executor = self.build_executor()?;
        let jobs = self.jobs.unwrap_or(1).max(1);
        debug!(
            command = %executor.command.display_template(),
            jobs,
            "building notebook runner"
        );

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("nbtest-runner-worker")
            .build()
            .map_err(RunnerBuildError::TokioRuntimeCreate)?;
        let _guard = runtime.enter();

        // Signal handlers must be installed from within the runtime.
        let signal_handler = handler_kind.build()?;

        Ok(NotebookRunner {
            list,
            executor,
            jobs,
            fail_fast: self.fail_fast.unwrap_or(false),
            signal_handler,
            runtime,
        })
    }
}

/// Context for running notebooks.
///
/// Created using [`NotebookRunnerBuilder::build`].
pub struct NotebookRunner<'a> {
    list: &'a NotebookList,
    executor: NotebookExecutor,
    jobs: usize,
    fail_fast: bool,
    signal_handler: SignalHandler,
    runtime: Runtime,
}

impl<'a> NotebookRunner<'a> {
    /// Executes the notebooks, calling `callback` for every event.
    pub fn execute<F>(self, mut callback: F) -> RunStats
    where
        F: FnMut(NotebookEvent<'a>),
    {
        let result: Result<RunStats, Infallible> = self.try_execute(|event| {
            callback(event);
            Ok(())
        });
        match result {
            Ok(stats) => stats,
            Err(never) => match never {},
        }
    }

    /// Executes the notebooks, calling `callback` for every event.
    ///
    /// If `callback` returns an error, the run is canceled and the first error is returned once
    /// the run has been wound down.
    pub fn try_execute<E, F>(self, mut callback: F) -> Result<RunStats, E>
    where
        F: FnMut(NotebookEvent<'a>) -> Result<(), E>,
    {
        let NotebookRunner {
            list,
            executor,
            jobs,
            fail_fast,
            mut signal_handler,
            runtime,
        } = self;

        let run_fut = async {
            let start_time = SystemTime::now();
            let stopwatch = Instant::now();
            let mut stats = RunStats {
                initial_run_count: list.run_count(),
                skipped: list.skip_count(),
                ..RunStats::default()
            };

            callback(NotebookEvent::RunStarted { list })?;
            for instance in list.iter() {
                if let SelectionStatus::Skipped { reason } = instance.status {
                    callback(NotebookEvent::NotebookSkipped { instance, reason })?;
                }
            }

            let running = AtomicUsize::new(0);
            let executor = &executor;
            let running_ref = &running;
            let mut finished = stream::iter(list.iter_run())
                .map(|instance| async move {
                    running_ref.fetch_add(1, Ordering::SeqCst);
                    let status = executor.run(instance.path).await;
                    running_ref.fetch_sub(1, Ordering::SeqCst);
                    (instance, status)
                })
                .buffer_unordered(jobs);

            let mut report_error = None;
            loop {
                let mut cancel_reason = None;
                tokio::select! {
                    next = finished.next() => {
                        let Some((instance, status)) = next else {
                            break;
                        };
                        stats.on_notebook_finished(&status);
                        let is_success = status.result.is_success();
                        match callback(NotebookEvent::NotebookFinished { instance, status }) {
                            Ok(()) if !is_success && fail_fast => {
                                cancel_reason = Some(CancelReason::NotebookFailure);
                            }
                            Ok(()) => {}
                            Err(error) => {
                                report_error = Some(error);
                                cancel_reason = Some(CancelReason::ReportError);
                            }
                        }
                    }
                    Some(event) = signal_handler.recv() => {
                        debug!(?event, "received shutdown signal");
                        cancel_reason = Some(CancelReason::Signal);
                    }
                }

                if let Some(reason) = cancel_reason {
                    stats.cancel_reason = Some(reason);
                    let running = running.load(Ordering::SeqCst);
                    if let Err(error) = callback(NotebookEvent::RunBeginCancel { running, reason })
                    {
                        report_error.get_or_insert(error);
                    }
                    break;
                }
            }

            // Dropping the stream kills any notebooks that are still running.
            drop(finished);

            let finish_result = callback(NotebookEvent::RunFinished {
                start_time,
                elapsed: stopwatch.elapsed(),
                run_stats: stats,
            });
            match report_error {
                Some(error) => Err(error),
                None => finish_result.map(|()| stats),
            }
        };

        runtime.block_on(run_fut)
    }
}

/// Runs a single notebook with the notebook command.
///
/// Cheap to clone, so it can be shared between libtest-mimic trials.
#[derive(Clone, Debug)]
pub struct NotebookExecutor {
    command: NotebookCommand,
    timeout: Duration,
    kernel: String,
}

impl NotebookExecutor {
    /// The timeout used if none is set.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

    /// The kernel used if none is set.
    pub const DEFAULT_KERNEL: &'static str = "python3";

    /// Returns the per-notebook timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs a notebook, returning its status.
    ///
    /// Must be called from within a tokio runtime with IO and time enabled.
    pub async fn run(&self, notebook: &Utf8Path) -> ExecuteStatus {
        let start_time = SystemTime::now();
        let stopwatch = Instant::now();

        let (result, stdout, stderr) = match self.run_inner(notebook).await {
            Ok(res) => res,
            Err(error) => (
                ExecutionResult::ExecFail {
                    error: Arc::new(error),
                },
                Vec::new(),
                Vec::new(),
            ),
        };

        ExecuteStatus::new(result, stdout, stderr, start_time, stopwatch.elapsed())
    }

    async fn run_inner(
        &self,
        notebook: &Utf8Path,
    ) -> Result<(ExecutionResult, Vec<u8>, Vec<u8>), NotebookExecError> {
        let output_dir = camino_tempfile::Builder::new()
            .prefix("nbtest-")
            .tempdir()
            .map_err(NotebookExecError::OutputDir)?;

        let (program, args) = self.command.expand(&CommandContext {
            notebook,
            output_dir: output_dir.path(),
            timeout: self.timeout,
            kernel: &self.kernel,
        });
        debug!(%notebook, %program, ?args, "executing notebook");

        let mut cmd = tokio::process::Command::new(&program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Notebooks usually load data relative to their own location. A relative notebook path
        // only resolves from the current directory, so it's left alone.
        if notebook.is_absolute() {
            if let Some(dir) = notebook.parent() {
                cmd.current_dir(dir);
            }
        }

        let child = cmd
            .spawn()
            .map_err(|error| NotebookExecError::Spawn { program, error })?;

        // On timeout, the child is dropped, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output.map_err(NotebookExecError::Wait)?,
            Err(_) => {
                warn!(%notebook, timeout = ?self.timeout, "notebook timed out");
                return Ok((ExecutionResult::Timeout, Vec::new(), Vec::new()));
            }
        };

        if !output.status.success() {
            let result = ExecutionResult::Fail {
                exit_code: output.status.code(),
            };
            return Ok((result, output.stdout, output.stderr));
        }

        // If the command wrote the executed notebook out, look for cells that raised.
        let executed = notebook
            .file_name()
            .map(|name| output_dir.path().join(name))
            .filter(|path| path.is_file());
        let result = match executed {
            Some(path) => {
                let output_notebook =
                    Notebook::from_path(&path).map_err(NotebookExecError::ReadOutput)?;
                debug!(%path, cells = output_notebook.cell_count(), "read executed notebook");
                let errors = output_notebook.errors();
                if errors.is_empty() {
                    ExecutionResult::Pass
                } else {
                    ExecutionResult::NotebookError { errors }
                }
            }
            None => ExecutionResult::Pass,
        };

        Ok((result, output.stdout, output.stderr))
    }
}

/// Information about the execution of a notebook.
#[derive(Clone, Debug)]
pub struct ExecuteStatus {
    /// The result of execution.
    pub result: ExecutionResult,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    /// The time at which the notebook started.
    pub start_time: SystemTime,
    /// The time it took for the notebook to run.
    pub time_taken: Duration,
}

impl ExecuteStatus {
    pub(crate) fn new(
        result: ExecutionResult,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
        start_time: SystemTime,
        time_taken: Duration,
    ) -> Self {
        Self {
            result,
            stdout,
            stderr,
            start_time,
            time_taken,
        }
    }

    /// Returns the standard output of the notebook command.
    pub fn stdout(&self) -> &[u8] {
        &self.stdout
    }

    /// Returns the standard error of the notebook command.
    pub fn stderr(&self) -> &[u8] {
        &self.stderr
    }
}

/// The result of executing a notebook.
#[derive(Clone, Debug)]
pub enum ExecutionResult {
    /// The notebook command exited successfully and no cell raised an error.
    Pass,

    /// The notebook command exited with a failure.
    Fail {
        /// The exit code, or `None` if the process was terminated by a signal.
        exit_code: Option<i32>,
    },

    /// The notebook command exited successfully, but the executed notebook has error outputs.
    NotebookError {
        /// The errors, in cell order. Never empty.
        errors: Vec<CellError>,
    },

    /// The notebook ran for longer than the timeout and was killed.
    Timeout,

    /// The notebook command couldn't be run, or its output couldn't be checked.
    ExecFail {
        /// The error.
        error: Arc<NotebookExecError>,
    },
}

impl ExecutionResult {
    /// Returns true if the notebook passed.
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Pass)
    }
}

/// Statistics for a notebook run.
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq)]
pub struct RunStats {
    /// The total number of notebooks that were expected to be run at the beginning.
    ///
    /// If the run is canceled, this will be more than `final_run_count`.
    pub initial_run_count: usize,

    /// The total number of notebooks that finished running.
    pub final_run_count: usize,

    /// The number of notebooks that passed.
    pub passed: usize,

    /// The number of notebooks whose command failed or that contain error outputs.
    pub failed: usize,

    /// The number of notebooks that timed out.
    pub timed_out: usize,

    /// The number of notebooks that couldn't be executed.
    pub exec_failed: usize,

    /// The number of notebooks that were skipped.
    pub skipped: usize,

    /// The reason the run was canceled, if it was.
    pub cancel_reason: Option<CancelReason>,
}

impl RunStats {
    /// Returns true if this run is considered a success.
    ///
    /// A run is marked as failed if any of the following are true:
    /// * the run was canceled
    /// * the initial run count is greater than the final run count
    /// * any notebooks failed, timed out or couldn't be executed
    pub fn is_success(&self) -> bool {
        if self.cancel_reason.is_some() || self.initial_run_count > self.final_run_count {
            return false;
        }
        !self.any_failed()
    }

    /// Returns true if any notebook failed in any way.
    pub fn any_failed(&self) -> bool {
        self.failed > 0 || self.timed_out > 0 || self.exec_failed > 0
    }

    fn on_notebook_finished(&mut self, status: &ExecuteStatus) {
        self.final_run_count += 1;
        match status.result {
            ExecutionResult::Pass => self.passed += 1,
            ExecutionResult::Fail { .. } | ExecutionResult::NotebookError { .. } => {
                self.failed += 1
            }
            ExecutionResult::Timeout => self.timed_out += 1,
            ExecutionResult::ExecFail { .. } => self.exec_failed += 1,
        }
    }
}
