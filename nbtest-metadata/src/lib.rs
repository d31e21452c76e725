// Copyright (c) The nbtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Machine-readable output for [nbtest](https://crates.io/crates/nbtest).
//!
//! `nbtest list --message-format json` produces a [`NotebookListSummary`], and every `nbtest`
//! invocation exits with one of the codes documented in [`NbtestExitCode`].

mod errors;
mod exit_codes;
mod notebook_list;

pub use errors::*;
pub use exit_codes::*;
pub use notebook_list::*;
