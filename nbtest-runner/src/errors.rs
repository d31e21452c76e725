// Copyright (c) The nbtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by nbtest.

use crate::selection::SamplingPolicy;
use camino::{FromPathBufError, Utf8PathBuf};
use config::ConfigError;
use std::{error, fmt};
use thiserror::Error;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse nbtest config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    err: ConfigError,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, err: ConfigError) -> Self {
        Self {
            config_file: config_file.into(),
            err,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }
}

/// An error which indicates that a profile was requested but not known to nbtest.
#[derive(Clone, Debug, Error)]
#[error("profile `{profile}` not found (known profiles: {})", .all_profiles.join(", "))]
pub struct ProfileNotFound {
    profile: String,
    all_profiles: Vec<String>,
}

impl ProfileNotFound {
    pub(crate) fn new(
        profile: impl Into<String>,
        all_profiles: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        let mut all_profiles: Vec<_> = all_profiles.into_iter().map(|s| s.into()).collect();
        all_profiles.sort_unstable();
        Self {
            profile: profile.into(),
            all_profiles,
        }
    }
}

/// An error that occurred while discovering notebooks.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiscoveryError {
    /// An error occurred while walking the notebook directory.
    #[error("error reading notebook directory `{dir}`")]
    Walk {
        /// The notebook directory.
        dir: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: walkdir::Error,
    },

    /// A path under the notebook directory is not valid UTF-8.
    #[error("path under the notebook directory is not valid UTF-8")]
    NonUtf8Path(#[source] FromPathBufError),

    /// The notebook directory doesn't contain any notebooks.
    #[error("no notebooks found in `{dir}`")]
    NoNotebooks {
        /// The notebook directory.
        dir: Utf8PathBuf,
    },
}

/// An error that occurred while computing the set of notebooks to exclude.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[non_exhaustive]
pub enum SelectionError {
    /// Random exclusions were requested, but not enough candidates remain after the fixed
    /// ignore list is applied.
    #[error(
        "cannot draw {requested} random exclusions ({policy}) from {candidates} candidate notebooks"
    )]
    InvalidSampleRange {
        /// The number of notebooks left after removing the fixed ignore list.
        candidates: usize,

        /// The number of random exclusions requested.
        requested: usize,

        /// The sampling policy in effect.
        policy: SamplingPolicy,
    },
}

/// An error that occurred while building a [`TestFilter`](crate::test_filter::TestFilter).
#[derive(Debug, Error)]
#[error("error building notebook name filter")]
pub struct TestFilterBuildError {
    #[from]
    error: aho_corasick::BuildError,
}

/// An error that occurred while building a runner command from its template.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[non_exhaustive]
pub enum CommandTemplateError {
    /// The command is empty.
    #[error("notebook command is empty")]
    Empty,

    /// The command string couldn't be split into arguments.
    #[error("failed to split notebook command `{command}` into arguments")]
    Split {
        /// The command string.
        command: String,

        /// The underlying error.
        #[source]
        error: shell_words::ParseError,
    },

    /// An argument references a placeholder that nbtest doesn't know about.
    #[error(
        "unknown placeholder `{{{placeholder}}}` in notebook command argument `{arg}` \
         (known placeholders: {})",
        crate::command::KNOWN_PLACEHOLDERS.join(", "),
    )]
    UnknownPlaceholder {
        /// The argument containing the placeholder.
        arg: String,

        /// The placeholder name, without braces.
        placeholder: String,
    },
}

/// An error that occurred while writing a notebook list.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WriteNotebookListError {
    /// An error occurred while writing human-readable output.
    #[error("error writing to output")]
    Io(#[source] std::io::Error),

    /// An error occurred while serializing the list.
    #[error("error serializing notebook list")]
    Json(#[source] serde_json::Error),
}

/// An error that occurred while setting up the signal handler.
#[derive(Debug, Error)]
#[error("error setting up signal handler")]
pub struct SignalHandlerSetupError(#[from] std::io::Error);

/// An error that occurred while reading an executed notebook.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NotebookReadError {
    /// The notebook couldn't be read.
    #[error("error reading notebook `{path}`")]
    Read {
        /// The notebook path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The notebook isn't valid notebook JSON.
    #[error("error parsing notebook `{path}`")]
    Parse {
        /// The notebook path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },
}

/// An error that prevented a notebook from being executed or its result from being checked.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum NotebookExecError {
    /// The temporary output directory couldn't be created.
    #[error("error creating temporary output directory")]
    OutputDir(#[source] std::io::Error),

    /// The notebook command couldn't be spawned.
    #[error("error spawning `{program}`")]
    Spawn {
        /// The program that was spawned.
        program: String,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// An error occurred while waiting for the notebook command to exit.
    #[error("error waiting for notebook command to exit")]
    Wait(#[source] std::io::Error),

    /// The executed notebook written by the command couldn't be read.
    #[error("error reading executed notebook")]
    ReadOutput(#[source] NotebookReadError),
}

/// An error that occurred while setting up a notebook run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunnerBuildError {
    /// The tokio runtime couldn't be created.
    #[error("error creating tokio runtime")]
    TokioRuntimeCreate(#[source] std::io::Error),

    /// The notebook command template is invalid.
    #[error("invalid notebook command")]
    CommandTemplate(#[from] CommandTemplateError),

    /// The signal handler couldn't be set up.
    #[error("error setting up signal handler")]
    SignalHandlerSetup(#[from] SignalHandlerSetupError),
}

/// An error that occurred while setting up a libtest-compatible notebook harness.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HarnessSetupError {
    /// The config couldn't be read.
    #[error(transparent)]
    ConfigParse(#[from] ConfigParseError),

    /// The requested profile doesn't exist.
    #[error(transparent)]
    ProfileNotFound(#[from] ProfileNotFound),

    /// Notebooks couldn't be discovered.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// The `NBTEST_SEED` environment variable isn't a valid seed.
    #[error("invalid seed `{value}` in NBTEST_SEED")]
    InvalidSeed {
        /// The value of the environment variable.
        value: String,

        /// The underlying error.
        #[source]
        error: std::num::ParseIntError,
    },

    /// Notebooks to exclude couldn't be selected.
    #[error(transparent)]
    Selection(#[from] SelectionError),

    /// The notebook executor couldn't be built.
    #[error(transparent)]
    RunnerBuild(#[from] RunnerBuildError),
}

/// An error that occurs while writing an event.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WriteEventError {
    /// An error occurred while writing the event to the provided output.
    #[error("error writing to output")]
    Io(#[from] std::io::Error),

    /// An error occurred while operating on the file system.
    #[error("error operating on path {file}")]
    Fs {
        /// The file being operated on.
        file: Utf8PathBuf,

        /// The underlying IO error.
        #[source]
        error: std::io::Error,
    },

    /// An error occurred while producing JUnit XML.
    #[error("error writing JUnit output to {file}")]
    Junit {
        /// The output file.
        file: Utf8PathBuf,

        /// The underlying serialization error.
        #[source]
        error: Box<dyn error::Error + Send + Sync>,
    },
}

/// Displays an error along with its chain of sources, one per line.
pub struct DisplayErrorChain<E> {
    error: E,
}

impl<E: error::Error> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain`.
    pub fn new(error: E) -> Self {
        Self { error }
    }
}

impl<E: error::Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        let mut source = self.error.source();
        while let Some(err) = source {
            write!(f, "\n  caused by:\n  - {err}")?;
            source = err.source();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_error_chain() {
        let err = DiscoveryError::Walk {
            dir: "notebooks".into(),
            error: walkdir::WalkDir::new("/nonexistent-nbtest-dir")
                .into_iter()
                .next()
                .expect("one entry")
                .expect_err("directory doesn't exist"),
        };
        let displayed = DisplayErrorChain::new(&err).to_string();
        assert!(
            displayed.starts_with("error reading notebook directory `notebooks`\n  caused by:\n"),
            "error chain displayed: {displayed}"
        );
    }

    #[test]
    fn invalid_sample_range_message() {
        let err = SelectionError::InvalidSampleRange {
            candidates: 0,
            requested: 1,
            policy: SamplingPolicy::WithReplacement,
        };
        assert_eq!(
            err.to_string(),
            "cannot draw 1 random exclusions (with-replacement) from 0 candidate notebooks"
        );
    }
}
