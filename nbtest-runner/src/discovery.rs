// Copyright (c) The nbtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Finding notebooks on disk.

use crate::errors::DiscoveryError;
use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// The file extension for Jupyter notebooks.
pub const NOTEBOOK_EXTENSION: &str = "ipynb";

/// Directories Jupyter writes autosaved copies of notebooks into.
const CHECKPOINTS_DIR: &str = ".ipynb_checkpoints";

/// Finds notebooks under a directory.
#[derive(Clone, Debug)]
pub struct NotebookDiscovery {
    dir: Utf8PathBuf,
}

impl NotebookDiscovery {
    /// Creates a new `NotebookDiscovery` rooted at `dir`.
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Walks the directory and returns the notebooks found, sorted by relative path.
    ///
    /// `.ipynb_checkpoints` and other hidden directories are not descended into.
    pub fn discover(&self) -> Result<DiscoveredNotebooks, DiscoveryError> {
        let walker = WalkDir::new(&self.dir)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_hidden_dir(entry));

        let mut notebooks = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|error| DiscoveryError::Walk {
                dir: self.dir.clone(),
                error,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = Utf8PathBuf::try_from(entry.into_path())
                .map_err(DiscoveryError::NonUtf8Path)?;
            if path.extension() != Some(NOTEBOOK_EXTENSION) {
                continue;
            }

            let relative = path
                .strip_prefix(&self.dir)
                .expect("walkdir only yields paths under the root");
            let id = relative
                .components()
                .map(|component| component.as_str())
                .collect::<Vec<_>>()
                .join("/");
            debug!(%id, %path, "discovered notebook");
            notebooks.push(DiscoveredNotebook { id, path });
        }

        if notebooks.is_empty() {
            return Err(DiscoveryError::NoNotebooks {
                dir: self.dir.clone(),
            });
        }

        // sort_by_file_name sorts siblings, which already sorts by relative path except across
        // nesting levels.
        notebooks.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(DiscoveredNotebooks {
            dir: self.dir.clone(),
            notebooks,
        })
    }
}

fn is_hidden_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name == CHECKPOINTS_DIR || name.starts_with('.'))
}

/// A notebook found on disk.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DiscoveredNotebook {
    /// The identifier of this notebook: its path relative to the notebook directory, with `/`
    /// as the separator.
    pub id: String,

    /// The full path to the notebook.
    pub path: Utf8PathBuf,
}

/// The notebooks in a directory, in a stable order.
#[derive(Clone, Debug)]
pub struct DiscoveredNotebooks {
    dir: Utf8PathBuf,
    notebooks: Vec<DiscoveredNotebook>,
}

impl DiscoveredNotebooks {
    /// Creates a new list from already-known notebooks, sorting them by identifier.
    pub fn new(dir: impl Into<Utf8PathBuf>, mut notebooks: Vec<DiscoveredNotebook>) -> Self {
        notebooks.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            dir: dir.into(),
            notebooks,
        }
    }

    /// Returns the directory the notebooks were found in.
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Returns the number of notebooks.
    pub fn len(&self) -> usize {
        self.notebooks.len()
    }

    /// Returns true if there are no notebooks.
    pub fn is_empty(&self) -> bool {
        self.notebooks.is_empty()
    }

    /// Iterates over the notebooks.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &DiscoveredNotebook> + '_ {
        self.notebooks.iter()
    }

    /// Returns the identifiers of the notebooks, in order.
    pub fn ids(&self) -> Vec<&str> {
        self.notebooks.iter().map(|nb| nb.id.as_str()).collect()
    }
}
