// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{device::DeviceTestRunner, imp::RunContext};
use crate::{
    errors::{RunSetupError, UnservableEvent},
    pool::Pool,
    queue::TestCaseEventQueue,
    reporter::{TestCaseRunResult, TestStatus},
    test_case::TestSuite,
};
use chrono::Local;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::{collections::BTreeMap, time::Duration};
use tracing::{info, warn};

/// Runs a test suite on every device in a pool, with one worker thread per device.
pub(super) struct PoolTestRunner<'a> {
    pool: &'a Pool,
    queue: TestCaseEventQueue,
    thread_pool: ThreadPool,
}

impl<'a> PoolTestRunner<'a> {
    pub(super) fn new(pool: &'a Pool) -> Result<Self, RunSetupError> {
        let name = pool.name().clone();
        let thread_pool = ThreadPoolBuilder::new()
            .num_threads(pool.size())
            .thread_name(move |idx| format!("tongs-{name}-{idx}"))
            .build()
            .map_err(|err| RunSetupError::ThreadPoolBuild {
                name: format!("pool `{}`", pool.name()),
                err,
            })?;

        Ok(Self {
            pool,
            queue: TestCaseEventQueue::new(pool),
            thread_pool,
        })
    }

    /// Seeds the queue with `suite` and blocks until every device worker has exited.
    pub(super) fn run(&self, suite: &TestSuite, ctx: &RunContext<'_>) {
        for event in suite.iter() {
            if let Err(unservable) = self.queue.offer(event.clone()) {
                self.record_unservable(unservable, ctx);
            }
        }
        info!(
            "[{}] running {} tests on {} devices",
            self.pool.name(),
            self.queue.pending_count(),
            self.pool.size(),
        );

        // The scope returns once every device worker has returned.
        self.thread_pool.scope(|s| {
            for device in self.pool.devices() {
                let queue = &self.queue;
                let pool = self.pool;
                s.spawn(move |_| DeviceTestRunner::new(device, pool, queue, ctx).run());
            }
        });

        info!("[{}] all devices finished", self.pool.name());
    }

    fn record_unservable(&self, unservable: UnservableEvent, ctx: &RunContext<'_>) {
        let test_case = unservable.event.id().clone();
        warn!("[{}] {unservable}", self.pool.name());
        ctx.progress
            .record_failed_test_case(self.pool.name(), &test_case);
        ctx.record_final(&TestCaseRunResult {
            pool: self.pool.name().clone(),
            device: None,
            test_case,
            status: TestStatus::Error,
            trace: Some(unservable.to_string()),
            attempt: 1,
            start_time: Local::now(),
            time_taken: Duration::ZERO,
            metrics: BTreeMap::new(),
        });
    }
}
