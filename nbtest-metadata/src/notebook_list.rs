// Copyright (c) The nbtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::ListCommandError;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, process::Command};

/// Command builder for `nbtest list`.
#[derive(Clone, Debug, Default)]
pub struct ListCommand {
    nbtest_path: Option<Utf8PathBuf>,
    current_dir: Option<Utf8PathBuf>,
    args: Vec<String>,
}

impl ListCommand {
    /// Creates a new `ListCommand`.
    ///
    /// This command runs `nbtest list`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Path to `nbtest`.
    ///
    /// If not set, `nbtest` is looked up in `PATH`.
    pub fn nbtest_path(&mut self, path: impl Into<Utf8PathBuf>) -> &mut Self {
        self.nbtest_path = Some(path.into());
        self
    }

    /// Sets the current directory of the `nbtest list` process.
    ///
    /// By default, the current directory of this process is used.
    pub fn current_dir(&mut self, path: impl Into<Utf8PathBuf>) -> &mut Self {
        self.current_dir = Some(path.into());
        self
    }

    /// Adds a command-line argument to `nbtest list`.
    pub fn add_arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    /// Adds command-line arguments to `nbtest list`.
    pub fn add_args(&mut self, args: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        for arg in args {
            self.add_arg(arg.into());
        }
        self
    }

    /// Builds a command for `nbtest list`. This is the first part of the work of [`Self::exec`].
    pub fn cmd(&self) -> Command {
        let mut command = Command::new(self.nbtest());
        if let Some(path) = &self.current_dir {
            command.current_dir(path);
        }
        command.args(["list", "--message-format", "json"]);
        command.args(&self.args);
        command
    }

    fn nbtest(&self) -> &Utf8Path {
        self.nbtest_path
            .as_deref()
            .unwrap_or_else(|| Utf8Path::new("nbtest"))
    }

    /// Executes `nbtest list` and parses the output into a [`NotebookListSummary`].
    pub fn exec(&self) -> Result<NotebookListSummary, ListCommandError> {
        let mut command = self.cmd();
        let output = command.output().map_err(|error| ListCommandError::Spawn {
            nbtest: self.nbtest().to_owned(),
            error,
        })?;

        if !output.status.success() {
            return Err(ListCommandError::Failed {
                exit_code: output.status.code(),
                stderr: output.stderr,
            });
        }

        NotebookListSummary::parse_json(&output.stdout)
    }
}

/// Root element for a serializable list of notebooks produced by `nbtest list`.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct NotebookListSummary {
    /// The directory notebooks were discovered in.
    pub notebook_dir: Utf8PathBuf,

    /// Number of notebooks discovered, including skipped ones.
    pub notebook_count: usize,

    /// Number of notebooks that will be run.
    pub run_count: usize,

    /// Number of notebooks that will be skipped.
    ///
    /// It is always the case that `run_count + skip_count == notebook_count`.
    pub skip_count: usize,

    /// How the exclusion set was computed.
    pub selection: SelectionSummary,

    /// All discovered notebooks, keyed by their identifier.
    pub notebooks: BTreeMap<String, NotebookSummary>,
}

impl NotebookListSummary {
    /// Parses JSON output from `nbtest list --message-format json`.
    pub fn parse_json(json: impl AsRef<[u8]>) -> Result<Self, ListCommandError> {
        serde_json::from_slice(json.as_ref()).map_err(ListCommandError::InvalidSummary)
    }
}

/// The inputs to the selection policy for a notebook list.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SelectionSummary {
    /// The sampling policy used to pick random exclusions.
    pub sampling: SamplingPolicySummary,

    /// The number of random exclusions requested.
    pub random_exclusions: usize,

    /// The seed of the random source.
    pub seed: u64,

    /// Entries in the fixed ignore list that didn't match any discovered notebook.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unmatched_ignores: Vec<String>,
}

/// Serializable form of a sampling policy.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SamplingPolicySummary {
    /// Indexes are drawn independently, so fewer notebooks than requested may be excluded.
    WithReplacement,

    /// Indexes are distinct.
    WithoutReplacement,
}

/// Information about a single notebook.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct NotebookSummary {
    /// The absolute path to the notebook.
    pub path: Utf8PathBuf,

    /// Whether the notebook will be run.
    pub selection: SelectionStatusSummary,
}

/// Whether a notebook will be run.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case", tag = "status")]
pub enum SelectionStatusSummary {
    /// The notebook will be run.
    Run,

    /// The notebook will be skipped.
    Skipped {
        /// Why the notebook is skipped.
        reason: SkipReasonSummary,
    },
}

impl SelectionStatusSummary {
    /// Returns true if the notebook will be run.
    pub fn is_run(&self) -> bool {
        matches!(self, Self::Run)
    }
}

/// The reason a notebook is skipped.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReasonSummary {
    /// The notebook is in the fixed ignore list.
    FixedIgnore,

    /// The notebook was picked at random to bound the run time.
    Random,

    /// The notebook doesn't match the name filters.
    Filter,
}

impl fmt::Display for SkipReasonSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FixedIgnore => write!(f, "fixed-ignore"),
            Self::Random => write!(f, "random"),
            Self::Filter => write!(f, "filter"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use test_case::test_case;

    #[test]
    fn parse_list_summary() {
        let json = indoc! {r#"
            {
              "notebook-dir": "/repo/notebooks",
              "notebook-count": 3,
              "run-count": 1,
              "skip-count": 2,
              "selection": {
                "sampling": "without-replacement",
                "random-exclusions": 1,
                "seed": 42
              },
              "notebooks": {
                "1-intro.ipynb": {
                  "path": "/repo/notebooks/1-intro.ipynb",
                  "selection": { "status": "run" }
                },
                "2-inversion.ipynb": {
                  "path": "/repo/notebooks/2-inversion.ipynb",
                  "selection": { "status": "skipped", "reason": "random" }
                },
                "3-inversion-3d.ipynb": {
                  "path": "/repo/notebooks/3-inversion-3d.ipynb",
                  "selection": { "status": "skipped", "reason": "fixed-ignore" }
                }
              }
            }
        "#};

        let summary = NotebookListSummary::parse_json(json).expect("valid JSON");
        assert_eq!(summary.notebook_count, 3);
        assert_eq!(
            summary.run_count + summary.skip_count,
            summary.notebook_count
        );
        assert_eq!(
            summary.selection.sampling,
            SamplingPolicySummary::WithoutReplacement
        );
        assert!(summary.selection.unmatched_ignores.is_empty());
        assert!(summary.notebooks["1-intro.ipynb"].selection.is_run());
        assert_eq!(
            summary.notebooks["3-inversion-3d.ipynb"].selection,
            SelectionStatusSummary::Skipped {
                reason: SkipReasonSummary::FixedIgnore
            }
        );
    }

    #[test_case(r#"{"status":"run"}"#, SelectionStatusSummary::Run ; "run")]
    #[test_case(
        r#"{"status":"skipped","reason":"filter"}"#,
        SelectionStatusSummary::Skipped { reason: SkipReasonSummary::Filter }
        ; "skipped by filter"
    )]
    #[test_case(
        r#"{"status":"skipped","reason":"random"}"#,
        SelectionStatusSummary::Skipped { reason: SkipReasonSummary::Random }
        ; "skipped at random"
    )]
    fn parse_selection_status(input: &str, expected: SelectionStatusSummary) {
        let status: SelectionStatusSummary =
            serde_json::from_str(input).expect("valid selection status");
        assert_eq!(status, expected);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let err = NotebookListSummary::parse_json("{").expect_err("truncated JSON");
        assert!(matches!(err, ListCommandError::InvalidSummary(_)));
    }
}
