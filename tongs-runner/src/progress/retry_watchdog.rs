// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::config::RetryQuota;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Enforces the per-test-case and run-wide retry quotas.
#[derive(Debug)]
pub struct RetryWatchdog {
    quota: RetryQuota,
    retries_left: AtomicUsize,
}

impl RetryWatchdog {
    /// Creates a new watchdog with the full run-wide budget available.
    pub fn new(quota: RetryQuota) -> Self {
        Self {
            quota,
            retries_left: AtomicUsize::new(quota.total),
        }
    }

    /// Returns the quota this watchdog enforces.
    pub fn quota(&self) -> RetryQuota {
        self.quota
    }

    /// Decides whether a test case that has failed `failures` times may be retried.
    ///
    /// The per-test-case quota is checked first; only if it allows a retry is one unit of the
    /// run-wide budget consumed.
    pub fn request_retry(&self, failures: usize) -> RetryDecision {
        if failures > self.quota.per_test_case {
            return RetryDecision::PerTestCaseQuotaExceeded {
                failures,
                quota: self.quota.per_test_case,
            };
        }

        match self
            .retries_left
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |left| left.checked_sub(1))
        {
            Ok(left) => RetryDecision::Admitted {
                retries_left: left - 1,
            },
            Err(_) => RetryDecision::TotalQuotaExceeded {
                quota: self.quota.total,
            },
        }
    }

    /// Returns the number of retries admitted so far.
    pub fn retries_used(&self) -> usize {
        self.quota.total - self.retries_left.load(Ordering::Acquire)
    }
}

/// The result of a retry request.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RetryDecision {
    /// The retry was admitted.
    Admitted {
        /// The run-wide retries remaining after this one.
        retries_left: usize,
    },

    /// The test case has already been retried as often as the per-test-case quota allows.
    PerTestCaseQuotaExceeded {
        /// The number of failures recorded for the test case.
        failures: usize,
        /// The per-test-case quota.
        quota: usize,
    },

    /// The run-wide retry budget is used up.
    TotalQuotaExceeded {
        /// The run-wide quota.
        quota: usize,
    },
}

impl RetryDecision {
    /// Returns true if the retry was admitted.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted { .. })
    }
}
