// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run-wide progress and retry accounting, shared by every device worker.
//!
//! The main structure in this module is [`OverallProgressReporter`]. It owns the failure counts
//! used for retry admission ([`PoolTestCaseAccumulator`]), the run-wide retry budget
//! ([`RetryWatchdog`]) and one [`PoolProgressTracker`] per pool.

mod accumulator;
mod imp;
mod retry_watchdog;

pub use accumulator::*;
pub use imp::*;
pub use retry_watchdog::*;
