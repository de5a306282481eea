// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for tongs: distributing a suite of test cases across pools of devices,
//! retrying failures within a bounded budget, and compiling a consistent summary.
//!
//! The basic flow is:
//!
//! 1. A [`DeviceProvider`](device::DeviceProvider) yields devices, and a
//!    [`PoolLoader`](pool::PoolLoader) groups them into pools.
//! 2. [`TongsRunner`](runner::TongsRunner) seeds one
//!    [`TestCaseEventQueue`](queue::TestCaseEventQueue) per pool and runs every pool concurrently,
//!    with one worker thread per device.
//! 3. Failing attempts go through the retry gate owned by the
//!    [`OverallProgressReporter`](progress::OverallProgressReporter).
//! 4. Once every pool is done, [`SummaryCompiler`](reporter::SummaryCompiler) reconciles the
//!    recorded results against the scheduled test cases.

pub mod config;
pub mod device;
pub mod errors;
pub mod executor;
pub mod pool;
pub mod progress;
pub mod queue;
pub mod reporter;
pub mod runner;
pub mod test_case;
mod time;
