// Copyright (c) The nbtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The command used to execute a single notebook.
//!
//! The command is a template: arguments may contain placeholders such as `{notebook}`, which are
//! filled in for every notebook that is run.

use crate::errors::CommandTemplateError;
use camino::Utf8Path;
use serde::Deserialize;
use std::time::Duration;

/// The placeholders that can appear in a notebook command.
pub const KNOWN_PLACEHOLDERS: &[&str] = &["notebook", "output-dir", "timeout-secs", "kernel"];

/// The command as written in configuration: either a single string, split with shell quoting
/// rules, or a list of arguments.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    /// A command line, e.g. `"jupyter nbconvert --execute {notebook}"`.
    String(String),

    /// A list of arguments, the first of which is the program.
    Args(Vec<String>),
}

/// A validated notebook command template.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NotebookCommand {
    program: String,
    args: Vec<String>,
}

impl NotebookCommand {
    /// Validates a command spec.
    pub fn new(spec: &CommandSpec) -> Result<Self, CommandTemplateError> {
        let argv = match spec {
            CommandSpec::String(command) => {
                shell_words::split(command).map_err(|error| CommandTemplateError::Split {
                    command: command.clone(),
                    error,
                })?
            }
            CommandSpec::Args(args) => args.clone(),
        };

        let mut argv = argv.into_iter();
        let program = argv.next().ok_or(CommandTemplateError::Empty)?;
        let args: Vec<_> = argv.collect();

        for arg in std::iter::once(&program).chain(&args) {
            expand_placeholders(arg, |name| {
                KNOWN_PLACEHOLDERS.contains(&name).then(String::new)
            })?;
        }

        Ok(Self { program, args })
    }

    /// The command that executes a notebook in place with `jupyter nbconvert`, writing the
    /// executed copy into the output directory.
    pub fn jupyter_nbconvert() -> Self {
        let args = [
            "nbconvert",
            "--to",
            "notebook",
            "--execute",
            "--ExecutePreprocessor.timeout={timeout-secs}",
            "--ExecutePreprocessor.kernel_name={kernel}",
            "--output-dir",
            "{output-dir}",
            "{notebook}",
        ];
        Self {
            program: "jupyter".to_owned(),
            args: args.iter().map(|s| (*s).to_owned()).collect(),
        }
    }

    /// Returns the program, unexpanded.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Fills in the placeholders for one notebook, returning the program and its arguments.
    pub fn expand(&self, cx: &CommandContext<'_>) -> (String, Vec<String>) {
        let lookup = |name: &str| cx.lookup(name);
        // Placeholders were validated in `new`.
        let program = expand_placeholders(&self.program, lookup)
            .expect("placeholders in program are known");
        let args = self
            .args
            .iter()
            .map(|arg| expand_placeholders(arg, lookup).expect("placeholders in args are known"))
            .collect();
        (program, args)
    }

    /// Returns the template as a shell-quoted command line.
    pub fn display_template(&self) -> String {
        shell_words::join(std::iter::once(&self.program).chain(&self.args))
    }
}

/// Values for the placeholders of a [`NotebookCommand`].
#[derive(Clone, Copy, Debug)]
pub struct CommandContext<'a> {
    /// The notebook to execute.
    pub notebook: &'a Utf8Path,

    /// A fresh directory the executed notebook can be written to.
    pub output_dir: &'a Utf8Path,

    /// The per-notebook timeout.
    pub timeout: Duration,

    /// The Jupyter kernel to use.
    pub kernel: &'a str,
}

impl CommandContext<'_> {
    fn lookup(&self, name: &str) -> Option<String> {
        match name {
            "notebook" => Some(self.notebook.to_string()),
            "output-dir" => Some(self.output_dir.to_string()),
            "timeout-secs" => Some(self.timeout.as_secs().to_string()),
            "kernel" => Some(self.kernel.to_owned()),
            _ => None,
        }
    }
}

/// Replaces every `{name}` in `arg` with `lookup(name)`.
///
/// Braces that don't enclose a placeholder-like name (letters, digits and `-`) are kept as-is, so
/// arguments like `--config={"a": 1}` pass through unchanged.
fn expand_placeholders(
    arg: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, CommandTemplateError> {
    let mut out = String::with_capacity(arg.len());
    let mut rest = arg;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let name_len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
            .unwrap_or(after.len());
        let name = &after[..name_len];

        if name.is_empty() || !after[name_len..].starts_with('}') {
            out.push('{');
            rest = after;
            continue;
        }

        let value = lookup(name).ok_or_else(|| CommandTemplateError::UnknownPlaceholder {
            arg: arg.to_owned(),
            placeholder: name.to_owned(),
        })?;
        out.push_str(&value);
        rest = &after[name_len + 1..];
    }

    out.push_str(rest);
    Ok(out)
}
