// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{attempt::run_attempt, imp::RunContext, retry::TestRetryer};
use crate::{
    device::Device,
    executor::ExecutionRequest,
    pool::Pool,
    queue::TestCaseEventQueue,
    reporter::{TestCaseRunResult, TestStatus},
    test_case::TestCaseEvent,
};
use chrono::Local;
use std::{collections::BTreeMap, time::Duration};
use tracing::{debug, info, trace};

/// Releases a device's claimed event when dropped.
struct ClaimGuard<'a> {
    queue: &'a TestCaseEventQueue,
    device: &'a Device,
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        self.queue.complete(self.device.id());
    }
}

/// The worker loop for a single device.
pub(super) struct DeviceTestRunner<'a> {
    device: &'a Device,
    pool: &'a Pool,
    queue: &'a TestCaseEventQueue,
    ctx: &'a RunContext<'a>,
    retryer: TestRetryer<'a>,
}

impl<'a> DeviceTestRunner<'a> {
    pub(super) fn new(
        device: &'a Device,
        pool: &'a Pool,
        queue: &'a TestCaseEventQueue,
        ctx: &'a RunContext<'a>,
    ) -> Self {
        let retryer = TestRetryer::new(
            pool,
            queue,
            ctx.progress,
            ctx.settings.retry_on_other_device(),
        );
        Self {
            device,
            pool,
            queue,
            ctx,
            retryer,
        }
    }

    /// Claims and runs test cases until no work is left that this device could ever run.
    pub(super) fn run(&self) {
        info!(
            "[{}] starting tests on {}",
            self.pool.name(),
            self.device.long_name()
        );
        let mut attempts = 0;

        loop {
            let Some(event) = self
                .queue
                .poll_for_device(self.device.id(), self.ctx.settings.poll_timeout())
            else {
                if self.queue.has_no_potential_events_for(self.device.id()) {
                    break;
                }
                trace!(
                    "[{}] {} waiting for in-flight tests on other devices",
                    self.pool.name(),
                    self.device.serial(),
                );
                continue;
            };

            attempts += 1;
            self.run_test_case(event);
        }

        info!(
            "[{}] {} finished after {attempts} attempts",
            self.pool.name(),
            self.device.serial(),
        );
    }

    fn run_test_case(&self, event: TestCaseEvent) {
        // Any retry is offered before the guard drops, so other devices never see the pool as
        // drained while this attempt's event is in between. The guard also completes the claim
        // if anything below unwinds.
        let _claim = ClaimGuard {
            queue: self.queue,
            device: self.device,
        };

        let attempt = self
            .ctx
            .progress
            .failure_count(self.pool.name(), event.id())
            + 1;

        let result = if event.is_ignored() {
            debug!("[{}] {} is ignored", self.pool.name(), event);
            self.ignored_result(&event, attempt)
        } else {
            info!(
                "[{}] running {} on {} (attempt {attempt})",
                self.pool.name(),
                event,
                self.device.serial(),
            );
            let request = ExecutionRequest {
                pool: self.pool.name().clone(),
                device: self.device.clone(),
                test_case: event.clone(),
                attempt,
                output_timeout: self.ctx.settings.test_output_timeout(),
            };
            run_attempt(
                self.ctx.executor,
                request,
                self.ctx.settings.listener_settle_timeout(),
            )
        };

        if result.status.is_failure() && self.retryer.rerun_test_if_allowed(event, &result) {
            self.ctx.record_retried(&result);
        } else {
            if result.status.is_failure() {
                info!(
                    "[{}] {} {} on {}",
                    self.pool.name(),
                    result.test_case,
                    result.status,
                    self.device.serial(),
                );
            }
            self.ctx.record_final(&result);
        }
    }

    fn ignored_result(&self, event: &TestCaseEvent, attempt: usize) -> TestCaseRunResult {
        TestCaseRunResult {
            pool: self.pool.name().clone(),
            device: Some(self.device.id().clone()),
            test_case: event.id().clone(),
            status: TestStatus::Ignored,
            trace: None,
            attempt,
            start_time: Local::now(),
            time_taken: Duration::ZERO,
            metrics: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{pool::PoolName, test_case::TestIdentifier};
    use std::panic::{self, AssertUnwindSafe};

    #[test]
    fn claim_is_released_when_recording_unwinds() {
        let device = Device::new("d1", 33);
        let pool = Pool::new(PoolName::new("default"), vec![device.clone()])
            .expect("pool is non-empty");
        let queue = TestCaseEventQueue::new(&pool);
        queue
            .offer(TestCaseEvent::new(TestIdentifier::new("com.example.A", "b")))
            .expect("offer succeeds");
        queue
            .poll_for_device(device.id(), Duration::ZERO)
            .expect("d1 claims the event");

        let unwound = panic::catch_unwind(AssertUnwindSafe(|| {
            let _claim = ClaimGuard {
                queue: &queue,
                device: &device,
            };
            panic!("recording failed");
        }));

        assert!(unwound.is_err());
        assert_eq!(queue.in_flight_count(), 0);
        assert!(queue.has_no_potential_events_for(device.id()));
    }
}
