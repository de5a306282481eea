// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The work queue shared by the devices of a pool.

use crate::{
    device::DeviceId,
    errors::UnservableEvent,
    pool::{Pool, PoolName},
    test_case::TestCaseEvent,
};
use std::{
    collections::{HashMap, VecDeque},
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};
use tracing::{debug, trace, warn};

/// A thread-safe queue of pending test cases for one pool.
///
/// Every event handed out by [`poll_for_device`](Self::poll_for_device) is tracked as in flight on
/// the polling device until [`complete`](Self::complete) is called for that device. An event is
/// therefore always either pending, in flight or finished: it is never lost between a failed
/// attempt and its retry as long as the retry is [offered](Self::offer) before the failed attempt
/// is completed.
#[derive(Debug)]
pub struct TestCaseEventQueue {
    pool: PoolName,
    devices: Vec<DeviceId>,
    state: Mutex<QueueState>,
    changed: Condvar,
}

impl TestCaseEventQueue {
    /// Creates an empty queue for `pool`.
    pub fn new(pool: &Pool) -> Self {
        Self {
            pool: pool.name().clone(),
            devices: pool.device_ids().cloned().collect(),
            state: Mutex::new(QueueState::default()),
            changed: Condvar::new(),
        }
    }

    /// Returns the name of the pool this queue belongs to.
    pub fn pool(&self) -> &PoolName {
        &self.pool
    }

    /// Adds an event to the pending set, either as initial seeding or as a retry.
    ///
    /// Returns the event back as an error if every device in the pool is excluded for it, since
    /// no device would ever claim it.
    pub fn offer(&self, event: TestCaseEvent) -> Result<(), UnservableEvent> {
        if event.excludes_all(self.devices.iter()) {
            return Err(UnservableEvent {
                pool: self.pool.clone(),
                event,
            });
        }

        trace!("[{}] offered {event}", self.pool);
        self.lock().pending.push_back(event);
        self.changed.notify_all();
        Ok(())
    }

    /// Claims one pending event that is not excluded for `device`.
    ///
    /// Waits up to `timeout` for an eligible event to show up. Returns `None` if the timeout
    /// elapses, or earlier if [`has_no_potential_events_for`](Self::has_no_potential_events_for)
    /// becomes true for `device`. The claimed event stays in flight on `device` until
    /// [`complete`](Self::complete) is called.
    pub fn poll_for_device(&self, device: &DeviceId, timeout: Duration) -> Option<TestCaseEvent> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();

        if let Some(stale) = state.in_flight.remove(device) {
            warn!(
                "[{}] device {device} polled while {stale} was still in flight, requeueing it",
                self.pool
            );
            state.pending.push_front(stale);
        }

        loop {
            if let Some(event) = state.claim(device) {
                debug!("[{}] device {device} claimed {event}", self.pool);
                return Some(event);
            }
            if state.has_no_potential_events_for(device) {
                return None;
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            state = self
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Marks the event in flight on `device` as finished, returning it.
    ///
    /// If the event is being retried, it must have been [offered](Self::offer) again before this
    /// is called.
    pub fn complete(&self, device: &DeviceId) -> Option<TestCaseEvent> {
        let event = self.lock().in_flight.remove(device);
        if let Some(event) = &event {
            trace!("[{}] device {device} completed {event}", self.pool);
        }
        self.changed.notify_all();
        event
    }

    /// Returns true if no pending or in-flight event could still be served to `device`.
    ///
    /// Events in flight on other devices count as potential work, since a failure may put them
    /// back in the queue. A device worker may stop once this returns true.
    pub fn has_no_potential_events_for(&self, device: &DeviceId) -> bool {
        self.lock().has_no_potential_events_for(device)
    }

    /// Returns the number of pending events.
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Returns the number of events currently in flight.
    pub fn in_flight_count(&self) -> usize {
        self.lock().in_flight.len()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // Every critical section leaves the state consistent, so a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<TestCaseEvent>,
    in_flight: HashMap<DeviceId, TestCaseEvent>,
}

impl QueueState {
    fn claim(&mut self, device: &DeviceId) -> Option<TestCaseEvent> {
        let index = self
            .pending
            .iter()
            .position(|event| !event.is_excluded_from(device))?;
        let event = self.pending.remove(index)?;
        self.in_flight.insert(device.clone(), event.clone());
        Some(event)
    }

    fn has_no_potential_events_for(&self, device: &DeviceId) -> bool {
        let pending = self
            .pending
            .iter()
            .any(|event| !event.is_excluded_from(device));
        let in_flight_elsewhere = self
            .in_flight
            .iter()
            .any(|(owner, event)| owner != device && !event.is_excluded_from(device));
        !pending && !in_flight_elsewhere
    }
}
