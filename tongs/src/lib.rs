// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Distributes a suite of test cases across pools of devices, retrying failures within a bounded
//! budget.
//!
//! The core logic lives in the `tongs-runner` crate. This crate is the command-line interface.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
