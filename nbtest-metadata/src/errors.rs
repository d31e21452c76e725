// Copyright (c) The nbtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::Utf8PathBuf;
use std::{error, fmt, io};

/// An error returned by [`ListCommand::exec`](crate::ListCommand::exec).
#[derive(Debug)]
pub enum ListCommandError {
    /// The `nbtest` binary couldn't be started.
    Spawn {
        /// The path `nbtest` was run from.
        nbtest: Utf8PathBuf,

        /// The underlying error.
        error: io::Error,
    },

    /// `nbtest list` ran but didn't succeed.
    Failed {
        /// The exit code, or `None` if the process was killed by a signal. Exit codes can be
        /// cross-referenced against [`NbtestExitCode`](crate::NbtestExitCode).
        exit_code: Option<i32>,

        /// Standard error for the process. Setup errors such as a missing notebook directory
        /// are reported here.
        stderr: Vec<u8>,
    },

    /// The notebook list printed by `nbtest list` couldn't be parsed.
    InvalidSummary(serde_json::Error),
}

impl fmt::Display for ListCommandError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Spawn { nbtest, .. } => write!(f, "failed to run `{nbtest} list`"),
            Self::Failed { exit_code, stderr } => {
                match exit_code {
                    Some(code) => write!(f, "`nbtest list` exited with code {code}")?,
                    None => write!(f, "`nbtest list` was terminated by a signal")?,
                }
                let stderr = String::from_utf8_lossy(stderr);
                let stderr = stderr.trim_end();
                if !stderr.is_empty() {
                    write!(f, ":\n{stderr}")?;
                }
                Ok(())
            }
            Self::InvalidSummary(_) => write!(f, "`nbtest list` printed an invalid notebook list"),
        }
    }
}

impl error::Error for ListCommandError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Spawn { error, .. } => Some(error),
            Self::Failed { .. } => None,
            Self::InvalidSummary(error) => Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_includes_stderr() {
        let error = ListCommandError::Failed {
            exit_code: Some(96),
            stderr: b"error: notebook directory `nb` not found\n".to_vec(),
        };
        assert_eq!(
            error.to_string(),
            "`nbtest list` exited with code 96:\nerror: notebook directory `nb` not found"
        );
    }

    #[test]
    fn failed_without_stderr() {
        let error = ListCommandError::Failed {
            exit_code: None,
            stderr: Vec::new(),
        };
        assert_eq!(error.to_string(), "`nbtest list` was terminated by a signal");
    }

    #[test]
    fn spawn_names_binary() {
        let error = ListCommandError::Spawn {
            nbtest: "/opt/bin/nbtest".into(),
            error: io::Error::from(io::ErrorKind::NotFound),
        };
        assert_eq!(error.to_string(), "failed to run `/opt/bin/nbtest list`");
        assert!(error::Error::source(&error).is_some());
    }
}
