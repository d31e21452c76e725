// Copyright (c) The nbtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run Jupyter notebooks as integration tests.
//!
//! `nbtest list` shows the notebooks that a run would execute, and `nbtest run` executes them,
//! each in its own process, with a per-notebook timeout. Some notebooks can be skipped on every
//! run, and a number of others at random; the random seed is logged so that any run can be
//! repeated with `--seed`.
//!
//! Settings are read from `.config/nbtest.toml` in the workspace root. For the library that
//! does the work, see [`nbtest_runner`].

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::{Color, OutputContext, StderrStyles};
