// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Running a test suite across pools of devices.
//!
//! The main structure in this module is [`TongsRunner`].

mod attempt;
mod device;
mod imp;
mod pool;
mod retry;

pub use imp::*;
