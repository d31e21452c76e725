// Copyright (c) The nbtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for [nbtest](https://crates.io/crates/nbtest), a runner that executes
//! Jupyter notebooks as integration tests.
//!
//! The flow of a run is:
//!
//! 1. [`discovery`] finds the notebooks under a directory.
//! 2. [`selection`] picks the notebooks to skip: a fixed ignore list, plus a number of random
//!    exclusions drawn from a seeded random source.
//! 3. [`list`] combines the two, along with any name filters from [`test_filter`].
//! 4. [`runner`] executes the remaining notebooks in child processes and [`reporter`] prints
//!    out the results.
//!
//! [`harness`] offers the same flow as a set of libtest trials, for use under `cargo test`.

pub mod command;
pub mod config;
pub mod discovery;
pub mod errors;
pub mod harness;
pub mod list;
pub mod notebook;
pub mod reporter;
pub mod runner;
pub mod selection;
pub mod signal;
pub mod test_filter;
