// Copyright (c) The nbtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, StderrStyles};
use camino::{FromPathBufError, Utf8PathBuf};
use nbtest_metadata::NbtestExitCode;
use nbtest_runner::errors::*;
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// Note that the #[error()] strings are mostly placeholder messages -- the expected way to print out
// errors is with the display_to_stderr method, which colorizes errors.

/// An expected error: a misconfiguration, or failing notebooks.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("could not read current directory")]
    CurrentDirFailed {
        #[source]
        err: std::io::Error,
    },
    #[error("current directory is not valid UTF-8")]
    CurrentDirInvalidUtf8 {
        #[source]
        err: FromPathBufError,
    },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("profile not found")]
    ProfileNotFound {
        #[from]
        err: ProfileNotFound,
    },
    #[error("notebook discovery error")]
    DiscoveryError {
        #[from]
        err: DiscoveryError,
    },
    #[error("notebook selection error")]
    SelectionError {
        #[from]
        err: SelectionError,
    },
    #[error("notebook filter build error")]
    TestFilterBuildError {
        #[from]
        err: TestFilterBuildError,
    },
    #[error("notebook runner build error")]
    RunnerBuildError {
        #[from]
        err: RunnerBuildError,
    },
    #[error("error writing notebook list")]
    WriteNotebookListError {
        #[from]
        err: WriteNotebookListError,
    },
    #[error("error writing event")]
    WriteEventError {
        #[from]
        err: WriteEventError,
    },
    #[error("notebook run failed")]
    NotebookRunFailed,
}

impl ExpectedError {
    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::CurrentDirFailed { .. }
            | Self::CurrentDirInvalidUtf8 { .. }
            | Self::ConfigParseError { .. }
            | Self::ProfileNotFound { .. }
            | Self::DiscoveryError { .. }
            | Self::TestFilterBuildError { .. }
            | Self::RunnerBuildError { .. } => NbtestExitCode::SETUP_ERROR,
            Self::SelectionError { .. } => NbtestExitCode::SELECTION_FAILED,
            Self::WriteNotebookListError { .. } | Self::WriteEventError { .. } => {
                NbtestExitCode::WRITE_OUTPUT_ERROR
            }
            Self::NotebookRunFailed => NbtestExitCode::TEST_RUN_FAILED,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match &self {
            Self::CurrentDirFailed { err } => {
                error!("could not read current directory");
                Some(err as &dyn Error)
            }
            Self::CurrentDirInvalidUtf8 { err } => {
                error!(
                    "current directory `{}` is not valid UTF-8",
                    err.as_path().display().style(styles.bold)
                );
                None
            }
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse nbtest config at `{}`",
                    err.config_file().style(styles.bold)
                );
                err.source()
            }
            Self::ProfileNotFound { err } => {
                error!("{}", err);
                err.source()
            }
            Self::DiscoveryError { err } => {
                error!("{}", err);
                err.source()
            }
            Self::SelectionError { err } => {
                error!("{}", err);
                error!(
                    target: NO_HEADING_TARGET,
                    "{}",
                    "(hint: lower --random-exclusions, or remove notebooks from the ignore list)"
                        .style(styles.warning_text)
                );
                err.source()
            }
            Self::TestFilterBuildError { err } => {
                error!("{}", err);
                err.source()
            }
            Self::RunnerBuildError { err } => {
                error!("failed to build notebook runner");
                Some(err as &dyn Error)
            }
            Self::WriteNotebookListError { err } => {
                error!("failed to write notebook list to output");
                Some(err as &dyn Error)
            }
            Self::WriteEventError { err } => {
                error!("failed to write event to output");
                Some(err as &dyn Error)
            }
            Self::NotebookRunFailed => {
                error!("notebook run failed");
                None
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}

pub(crate) fn current_dir_utf8() -> Result<Utf8PathBuf> {
    let current_dir =
        std::env::current_dir().map_err(|err| ExpectedError::CurrentDirFailed { err })?;
    Utf8PathBuf::try_from(current_dir).map_err(|err| ExpectedError::CurrentDirInvalidUtf8 { err })
}
