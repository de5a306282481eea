// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Structured access to tongs machine-readable output.
//!
//! This crate is used by the `tongs` binary to document its exit codes and to
//! write a JSON summary of a run. Tools consuming that summary can depend on
//! this crate to deserialize it.

mod exit_codes;
mod summary;

pub use exit_codes::*;
pub use summary::*;
