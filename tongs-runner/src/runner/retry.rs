// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    device::DeviceId,
    errors::UnservableEvent,
    pool::Pool,
    progress::{OverallProgressReporter, RetryDecision},
    queue::TestCaseEventQueue,
    reporter::TestCaseRunResult,
    test_case::TestCaseEvent,
};
use tracing::{debug, info, warn};

/// The retry gate for failed attempts in a pool.
#[derive(Clone, Copy, Debug)]
pub(super) struct TestRetryer<'a> {
    pool: &'a Pool,
    queue: &'a TestCaseEventQueue,
    progress: &'a OverallProgressReporter,
    retry_on_other_device: bool,
}

impl<'a> TestRetryer<'a> {
    pub(super) fn new(
        pool: &'a Pool,
        queue: &'a TestCaseEventQueue,
        progress: &'a OverallProgressReporter,
        retry_on_other_device: bool,
    ) -> Self {
        Self {
            pool,
            queue,
            progress,
            retry_on_other_device,
        }
    }

    /// Records the failure in `result` and, if the quotas allow it, offers `event` back to the
    /// queue.
    ///
    /// Returns true if the event was requeued. In that case `result` is not the final result for
    /// the test case.
    pub(super) fn rerun_test_if_allowed(
        &self,
        mut event: TestCaseEvent,
        result: &TestCaseRunResult,
    ) -> bool {
        let pool = self.pool.name();
        let failures = self.progress.record_failed_test_case(pool, event.id());

        match self.progress.request_retry(pool, event.id()) {
            RetryDecision::Admitted { retries_left } => {
                if self.retry_on_other_device {
                    if let Some(device) = &result.device {
                        self.exclude_failing_device(&mut event, device);
                    }
                }
                let id = event.id().clone();
                match self.queue.offer(event) {
                    Ok(()) => {
                        info!(
                            "[{pool}] retrying {id} after {} on {} \
                             (failure {failures}, {retries_left} retries left in run)",
                            result.status,
                            result.device_name(),
                        );
                        true
                    }
                    Err(UnservableEvent { event, .. }) => {
                        warn!(
                            "[{pool}] cannot retry {}: it is excluded from every device",
                            event.id(),
                        );
                        false
                    }
                }
            }
            RetryDecision::PerTestCaseQuotaExceeded { failures, quota } => {
                info!(
                    "[{pool}] not retrying {}: failed {failures} times, \
                     at most {quota} retries per test",
                    event.id(),
                );
                false
            }
            RetryDecision::TotalQuotaExceeded { quota } => {
                warn!(
                    "[{pool}] not retrying {}: all {quota} retries for the run are used up",
                    event.id(),
                );
                false
            }
        }
    }

    fn exclude_failing_device(&self, event: &mut TestCaseEvent, device: &DeviceId) {
        let others_available = self
            .pool
            .device_ids()
            .any(|id| id != device && !event.is_excluded_from(id));
        if others_available {
            event.exclude_device(device.clone());
            debug!("[{}] retry of {} excludes {device}", self.pool.name(), event.id());
        } else {
            debug!(
                "[{}] retry of {} stays eligible for {device}: no other device can run it",
                self.pool.name(),
                event.id(),
            );
        }
    }
}
