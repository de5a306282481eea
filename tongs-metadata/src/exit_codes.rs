// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `tongs` failures.
///
/// `tongs` runs may fail for a variety of reasons. This structure documents the exit codes
/// that may occur in case of expected failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum TongsExitCode {}

impl TongsExitCode {
    /// No errors occurred and tongs exited normally.
    pub const OK: i32 = 0;

    /// One or more tests failed, or a scheduled test never produced a result.
    pub const TEST_RUN_FAILED: i32 = 100;

    /// A user issue happened while setting up a tongs invocation: invalid configuration,
    /// unreadable test list or a pool that could not be formed.
    pub const SETUP_ERROR: i32 = 96;

    /// No devices were available to build pools from.
    pub const NO_DEVICES: i32 = 97;

    /// Writing data to stdout, stderr or a report file produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;
}
