// Copyright (c) The nbtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Running notebooks as tests under `cargo test`, through [`libtest_mimic`].
//!
//! A test target with `harness = false` can hand its `main` over to [`run_from_config`]:
//!
//! ```no_run
//! use camino::Utf8Path;
//! use libtest_mimic::Arguments;
//! use nbtest_runner::{errors::DisplayErrorChain, harness};
//! use std::process::ExitCode;
//!
//! fn main() -> ExitCode {
//!     let args = Arguments::from_args();
//!     let root = Utf8Path::new(env!("CARGO_MANIFEST_DIR"));
//!     match harness::run_from_config(&args, root, "default") {
//!         Ok(conclusion) => conclusion.exit_code(),
//!         Err(error) => {
//!             eprintln!("error: {}", DisplayErrorChain::new(error));
//!             ExitCode::FAILURE
//!         }
//!     }
//! }
//! ```
//!
//! Notebooks skipped by selection are reported as ignored tests, so `--include-ignored` runs
//! them as well.

use crate::{
    config::NbtestConfig,
    discovery::NotebookDiscovery,
    errors::HarnessSetupError,
    list::NotebookList,
    runner::{ExecuteStatus, ExecutionResult, NotebookExecutor, NotebookRunnerBuilder},
    selection::SelectionConfig,
    test_filter::TestFilter,
};
use camino::Utf8Path;
use libtest_mimic::{Arguments, Conclusion, Failed, Trial};
use swrite::{SWrite, swrite, swriteln};
use tracing::debug;

/// The environment variable used to set the selection seed.
pub const SEED_ENV: &str = "NBTEST_SEED";

/// Builds one trial per notebook in the list, in order.
///
/// Skipped notebooks become ignored trials.
pub fn trials(list: &NotebookList, executor: &NotebookExecutor) -> Vec<Trial> {
    list.iter()
        .map(|instance| {
            let path = instance.path.to_owned();
            let executor = executor.clone();
            let trial = Trial::test(instance.id, move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|error| {
                        Failed::from(format!("error creating tokio runtime: {error}"))
                    })?;
                let status = runtime.block_on(executor.run(&path));
                check_status(&status)
            });
            trial.with_ignored_flag(!instance.status.is_run())
        })
        .collect()
}

/// Reads the config under `workspace_root`, selects notebooks with `profile_name` and runs them
/// as libtest trials.
///
/// The seed is read from the profile, or the `NBTEST_SEED` environment variable if the profile
/// doesn't set one. Name filtering is done by libtest-mimic's own arguments.
pub fn run_from_config(
    args: &Arguments,
    workspace_root: &Utf8Path,
    profile_name: &str,
) -> Result<Conclusion, HarnessSetupError> {
    let config = NbtestConfig::from_sources(workspace_root, None)?;
    let profile = config.profile(profile_name)?;

    let discovered = NotebookDiscovery::new(profile.notebook_dir()).discover()?;
    let seed = match profile.seed() {
        Some(seed) => Some(seed),
        None => seed_from_env()?,
    };
    let selection = SelectionConfig {
        fixed_ignore: profile.ignore(),
        random_exclusions: profile.random_exclusions(),
        sampling: profile.sampling(),
        seed,
    }
    .select(&discovered)?;
    debug!(seed = selection.seed(), "selected notebooks");

    let list = NotebookList::new(discovered, selection, &TestFilter::any());
    let executor = NotebookRunnerBuilder::from_profile(&profile).build_executor()?;

    Ok(libtest_mimic::run(args, trials(&list, &executor)))
}

fn seed_from_env() -> Result<Option<u64>, HarnessSetupError> {
    match std::env::var(SEED_ENV) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|error| HarnessSetupError::InvalidSeed { value, error }),
        Err(_) => Ok(None),
    }
}

fn check_status(status: &ExecuteStatus) -> Result<(), Failed> {
    let mut message = match &status.result {
        ExecutionResult::Pass => return Ok(()),
        ExecutionResult::Fail {
            exit_code: Some(code),
        } => format!("notebook command exited with code {code}"),
        ExecutionResult::Fail { exit_code: None } => {
            "notebook command was terminated by a signal".to_owned()
        }
        ExecutionResult::NotebookError { errors } => {
            let mut message = String::new();
            for error in errors {
                swriteln!(message, "{error}");
                let traceback = error.traceback_text();
                if !traceback.is_empty() {
                    swriteln!(message, "{traceback}");
                }
            }
            message
        }
        ExecutionResult::Timeout => format!(
            "notebook timed out after {:.3}s",
            status.time_taken.as_secs_f64()
        ),
        ExecutionResult::ExecFail { error } => {
            format!("{}", crate::errors::DisplayErrorChain::new(&**error))
        }
    };

    let stderr = strip_ansi_escapes::strip_str(String::from_utf8_lossy(status.stderr()));
    if !stderr.trim().is_empty() {
        swrite!(message, "\n--- STDERR ---\n{stderr}");
    }

    Err(message.into())
}
