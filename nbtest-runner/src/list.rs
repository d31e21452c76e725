// Copyright (c) The nbtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The list of notebooks for a run, and whether each one is run or skipped.

use crate::{
    discovery::{DiscoveredNotebook, DiscoveredNotebooks},
    errors::WriteNotebookListError,
    selection::{ExclusionReason, Selection},
    test_filter::TestFilter,
};
use camino::Utf8Path;
use nbtest_metadata::{
    NotebookListSummary, NotebookSummary, SelectionStatusSummary, SkipReasonSummary,
};
use owo_colors::{OwoColorize, Style};
use serde::Serialize;
use std::{fmt, io};

/// Output formats for a notebook list.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutputFormat {
    /// A human-readable output format.
    Human {
        /// Whether to produce verbose output.
        verbose: bool,
    },

    /// Machine-readable output format.
    Serializable(SerializableFormat),
}

/// A serialized, machine-readable output format.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SerializableFormat {
    /// JSON with no whitespace.
    Json,
    /// JSON, prettified.
    JsonPretty,
}

impl SerializableFormat {
    /// Write this data in the given format to the writer.
    pub fn to_writer(
        self,
        value: &impl Serialize,
        writer: impl io::Write,
    ) -> serde_json::Result<()> {
        match self {
            SerializableFormat::Json => serde_json::to_writer(writer, value),
            SerializableFormat::JsonPretty => serde_json::to_writer_pretty(writer, value),
        }
    }
}

/// The reason a notebook is skipped.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SkipReason {
    /// The notebook is in the fixed ignore list.
    FixedIgnore,

    /// The notebook was drawn as a random exclusion.
    Random,

    /// The notebook doesn't match the name filters.
    Filter,
}

impl SkipReason {
    pub(crate) fn to_summary(self) -> SkipReasonSummary {
        match self {
            SkipReason::FixedIgnore => SkipReasonSummary::FixedIgnore,
            SkipReason::Random => SkipReasonSummary::Random,
            SkipReason::Filter => SkipReasonSummary::Filter,
        }
    }
}

impl From<ExclusionReason> for SkipReason {
    fn from(reason: ExclusionReason) -> Self {
        match reason {
            ExclusionReason::FixedIgnore => SkipReason::FixedIgnore,
            ExclusionReason::Random => SkipReason::Random,
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_summary())
    }
}

/// Whether a notebook is run.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SelectionStatus {
    /// The notebook is run.
    Run,

    /// The notebook is skipped.
    Skipped {
        /// Why the notebook is skipped.
        reason: SkipReason,
    },
}

impl SelectionStatus {
    /// Returns true if the notebook is run.
    pub fn is_run(self) -> bool {
        matches!(self, SelectionStatus::Run)
    }

    fn to_summary(self) -> SelectionStatusSummary {
        match self {
            SelectionStatus::Run => SelectionStatusSummary::Run,
            SelectionStatus::Skipped { reason } => SelectionStatusSummary::Skipped {
                reason: reason.to_summary(),
            },
        }
    }
}

/// A notebook in a [`NotebookList`].
#[derive(Copy, Clone, Debug)]
pub struct NotebookInstance<'a> {
    /// The notebook's identifier.
    pub id: &'a str,

    /// The full path to the notebook.
    pub path: &'a Utf8Path,

    /// Whether the notebook is run.
    pub status: SelectionStatus,
}

/// Every discovered notebook, along with whether it is run.
#[derive(Clone, Debug)]
pub struct NotebookList {
    discovered: DiscoveredNotebooks,
    statuses: Vec<SelectionStatus>,
    selection: Selection,
    run_count: usize,
    styles: Box<Styles>,
}

impl NotebookList {
    /// Creates a new notebook list.
    ///
    /// A notebook is run if it isn't excluded by `selection` and it matches `filter`. Exclusion
    /// takes precedence when reporting why a notebook is skipped.
    pub fn new(discovered: DiscoveredNotebooks, selection: Selection, filter: &TestFilter) -> Self {
        let statuses: Vec<_> = discovered
            .iter()
            .map(|notebook| {
                match selection.exclusions().reason(&notebook.id) {
                    Some(reason) => SelectionStatus::Skipped {
                        reason: reason.into(),
                    },
                    None if !filter.is_match(&notebook.id) => SelectionStatus::Skipped {
                        reason: SkipReason::Filter,
                    },
                    None => SelectionStatus::Run,
                }
            })
            .collect();
        let run_count = statuses.iter().filter(|status| status.is_run()).count();

        Self {
            discovered,
            statuses,
            selection,
            run_count,
            styles: Box::default(),
        }
    }

    /// Colorizes human-readable output.
    pub fn colorize(&mut self) {
        self.styles.colorize();
    }

    /// Returns the directory the notebooks were discovered in.
    pub fn notebook_dir(&self) -> &Utf8Path {
        self.discovered.dir()
    }

    /// Returns the selection this list was built from.
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Returns the total number of notebooks, including skipped ones.
    pub fn notebook_count(&self) -> usize {
        self.discovered.len()
    }

    /// Returns the number of notebooks that are run.
    pub fn run_count(&self) -> usize {
        self.run_count
    }

    /// Returns the number of notebooks that are skipped.
    pub fn skip_count(&self) -> usize {
        self.notebook_count() - self.run_count
    }

    /// Iterates over the notebooks in order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = NotebookInstance<'_>> + '_ {
        self.discovered
            .iter()
            .zip(&self.statuses)
            .map(|(notebook, status)| Self::instance(notebook, *status))
    }

    /// Iterates over the notebooks that are run.
    pub fn iter_run(&self) -> impl Iterator<Item = NotebookInstance<'_>> + '_ {
        self.iter().filter(|instance| instance.status.is_run())
    }

    /// Returns the serializable summary of this list.
    pub fn to_summary(&self) -> NotebookListSummary {
        let notebooks = self
            .iter()
            .map(|instance| {
                let summary = NotebookSummary {
                    path: instance.path.to_owned(),
                    selection: instance.status.to_summary(),
                };
                (instance.id.to_owned(), summary)
            })
            .collect();

        NotebookListSummary {
            notebook_dir: self.notebook_dir().to_owned(),
            notebook_count: self.notebook_count(),
            run_count: self.run_count(),
            skip_count: self.skip_count(),
            selection: self.selection.to_summary(),
            notebooks,
        }
    }

    /// Outputs this list to the given writer.
    pub fn write(
        &self,
        output_format: OutputFormat,
        mut writer: impl io::Write,
    ) -> Result<(), WriteNotebookListError> {
        match output_format {
            OutputFormat::Human { verbose } => self
                .write_human(verbose, &mut writer)
                .map_err(WriteNotebookListError::Io),
            OutputFormat::Serializable(format) => {
                format
                    .to_writer(&self.to_summary(), &mut writer)
                    .map_err(WriteNotebookListError::Json)?;
                // Terminate the JSON with a newline.
                writeln!(writer).map_err(WriteNotebookListError::Io)
            }
        }
    }

    fn instance(notebook: &DiscoveredNotebook, status: SelectionStatus) -> NotebookInstance<'_> {
        NotebookInstance {
            id: &notebook.id,
            path: &notebook.path,
            status,
        }
    }

    fn write_human(&self, verbose: bool, mut writer: impl io::Write) -> io::Result<()> {
        writeln!(
            writer,
            "{}:",
            self.notebook_dir().style(self.styles.notebook_dir)
        )?;

        for instance in self.iter() {
            write!(writer, "    {}", instance.id.style(self.styles.notebook_name))?;
            if let SelectionStatus::Skipped { reason } = instance.status {
                write!(
                    writer,
                    " ({}: {})",
                    "skipped".style(self.styles.skip),
                    reason
                )?;
            }
            writeln!(writer)?;
            if verbose {
                writeln!(
                    writer,
                    "        {} {}",
                    "path:".style(self.styles.field),
                    instance.path
                )?;
            }
        }

        if verbose {
            writeln!(
                writer,
                "{} {} random exclusions ({}), seed {}",
                "selection:".style(self.styles.field),
                self.selection.random_exclusions(),
                self.selection.sampling(),
                self.selection.seed(),
            )?;
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Default)]
struct Styles {
    notebook_dir: Style,
    notebook_name: Style,
    field: Style,
    skip: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.notebook_dir = Style::new().magenta().bold();
        self.notebook_name = Style::new().blue().bold();
        self.field = Style::new().yellow().bold();
        self.skip = Style::new().yellow();
    }
}
