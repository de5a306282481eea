// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Bounds on how many times failing test cases are re-executed.
///
/// A retry is admitted only if both bounds allow it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RetryQuota {
    /// The maximum number of retries for a single test case within a pool.
    pub per_test_case: usize,

    /// The maximum number of retries across the whole run.
    pub total: usize,
}

impl RetryQuota {
    /// A quota that never admits a retry.
    pub const NONE: Self = Self {
        per_test_case: 0,
        total: 0,
    };

    /// Creates a new quota.
    pub fn new(per_test_case: usize, total: usize) -> Self {
        Self {
            per_test_case,
            total,
        }
    }
}

impl Default for RetryQuota {
    fn default() -> Self {
        Self::new(1, 20)
    }
}
