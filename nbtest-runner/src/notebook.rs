// Copyright (c) The nbtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Just enough of the Jupyter notebook format to find cells that raised errors.
//!
//! Executing a notebook is the notebook command's job. Once it has written the executed notebook
//! out, nbtest reads it back and looks for `error` outputs: some execution setups (e.g.
//! `--allow-errors`) exit successfully even though a cell raised.

use crate::errors::NotebookReadError;
use camino::Utf8Path;
use serde::Deserialize;
use std::fmt;

/// A notebook document (nbformat 4).
#[derive(Clone, Debug, Deserialize)]
pub struct Notebook {
    #[serde(default)]
    cells: Vec<Cell>,
}

#[derive(Clone, Debug, Deserialize)]
struct Cell {
    cell_type: String,
    #[serde(default)]
    source: CellSource,
    #[serde(default)]
    outputs: Vec<Output>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum CellSource {
    Lines(Vec<String>),
    Text(String),
}

impl Default for CellSource {
    fn default() -> Self {
        CellSource::Lines(Vec::new())
    }
}

impl CellSource {
    fn to_text(&self) -> String {
        match self {
            CellSource::Lines(lines) => lines.concat(),
            CellSource::Text(text) => text.clone(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
struct Output {
    output_type: String,
    #[serde(default)]
    ename: String,
    #[serde(default)]
    evalue: String,
    #[serde(default)]
    traceback: Vec<String>,
}

impl Notebook {
    /// Reads a notebook from a file.
    pub fn from_path(path: &Utf8Path) -> Result<Self, NotebookReadError> {
        let contents = std::fs::read_to_string(path).map_err(|error| NotebookReadError::Read {
            path: path.to_owned(),
            error,
        })?;
        serde_json::from_str(&contents).map_err(|error| NotebookReadError::Parse {
            path: path.to_owned(),
            error,
        })
    }

    /// Returns the number of cells in this notebook.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Returns the errors raised by code cells, in cell order.
    pub fn errors(&self) -> Vec<CellError> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.cell_type == "code")
            .flat_map(|(index, cell)| {
                cell.outputs
                    .iter()
                    .filter(|output| output.output_type == "error")
                    .map(move |output| CellError {
                        cell_index: index,
                        source: cell.source.to_text(),
                        ename: output.ename.clone(),
                        evalue: output.evalue.clone(),
                        traceback: output.traceback.clone(),
                    })
            })
            .collect()
    }
}

/// An error raised while executing a code cell.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CellError {
    /// The 0-based index of the cell in the notebook.
    pub cell_index: usize,

    /// The source code of the cell.
    pub source: String,

    /// The name of the exception, e.g. `ZeroDivisionError`.
    pub ename: String,

    /// The value of the exception.
    pub evalue: String,

    /// Traceback lines, which usually contain ANSI color codes.
    pub traceback: Vec<String>,
}

impl CellError {
    /// Returns the traceback with ANSI escapes removed.
    pub fn traceback_text(&self) -> String {
        strip_ansi_escapes::strip_str(self.traceback.join("\n"))
    }
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cell {} raised {}: {}",
            self.cell_index, self.ename, self.evalue
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn parse(json: &str) -> Notebook {
        serde_json::from_str(json).expect("valid notebook JSON")
    }

    #[test]
    fn no_errors() {
        let notebook = parse(indoc! {r##"
            {
              "cells": [
                {"cell_type": "markdown", "metadata": {}, "source": ["# Intro"]},
                {
                  "cell_type": "code",
                  "execution_count": 1,
                  "metadata": {},
                  "source": "print(1 + 1)",
                  "outputs": [{"output_type": "stream", "name": "stdout", "text": ["2\n"]}]
                }
              ],
              "metadata": {},
              "nbformat": 4,
              "nbformat_minor": 5
            }
        "##});
        assert_eq!(notebook.cell_count(), 2);
        assert!(notebook.errors().is_empty());
    }

    #[test]
    fn error_output() {
        let notebook = parse(indoc! {r#"
            {
              "cells": [
                {"cell_type": "code", "source": ["x = 1\n"], "outputs": []},
                {
                  "cell_type": "code",
                  "source": ["x / 0"],
                  "outputs": [{
                    "output_type": "error",
                    "ename": "ZeroDivisionError",
                    "evalue": "division by zero",
                    "traceback": [
                      "\u001b[0;31mZeroDivisionError\u001b[0m  Traceback (most recent call last)",
                      "\u001b[0;31mZeroDivisionError\u001b[0m: division by zero"
                    ]
                  }]
                }
              ],
              "nbformat": 4,
              "nbformat_minor": 5
            }
        "#});

        let errors = notebook.errors();
        assert_eq!(errors.len(), 1);
        let error = &errors[0];
        assert_eq!(error.cell_index, 1);
        assert_eq!(error.source, "x / 0");
        assert_eq!(
            error.to_string(),
            "cell 1 raised ZeroDivisionError: division by zero"
        );
        assert_eq!(
            error.traceback_text(),
            "ZeroDivisionError  Traceback (most recent call last)\n\
             ZeroDivisionError: division by zero"
        );
    }

    #[test]
    fn invalid_notebook() {
        let err = serde_json::from_str::<Notebook>(r#"{"cells": 3}"#)
            .expect_err("cells must be a list");
        assert!(err.is_data());
    }
}
