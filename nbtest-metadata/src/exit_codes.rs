// Copyright (c) The nbtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `nbtest` failures.
///
/// `nbtest` runs may fail for a variety of reasons. This structure documents the exit codes
/// that may occur in case of expected failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum NbtestExitCode {}

impl NbtestExitCode {
    /// No errors occurred and nbtest exited normally.
    pub const OK: i32 = 0;

    /// No notebooks were selected to run, but no other errors occurred.
    pub const NO_NOTEBOOKS_RUN: i32 = 4;

    /// A user issue happened while setting up an nbtest invocation: for example, the config
    /// file failed to parse or the notebook directory contains no notebooks.
    pub const SETUP_ERROR: i32 = 96;

    /// One or more notebooks failed.
    pub const TEST_RUN_FAILED: i32 = 100;

    /// Computing the set of notebooks to exclude produced an error.
    pub const SELECTION_FAILED: i32 = 104;

    /// Writing data to stdout, stderr or a report file produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;
}
