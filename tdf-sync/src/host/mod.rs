/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Boundary to the host event-driven kernel.
//!
//! The scheduler never owns the thread of control.  The host calls
//! [`crate::Session::resume`] for a cluster, the cluster runs as far as it
//! can, and hands back a [`WaitCondition`] telling the host when to call
//! again.  Everything the cluster needs from the host goes through
//! [`HostKernel`].

pub mod local;

pub use local::{LocalKernel, RunSummary};

use crate::sync::ClusterId;
use crate::time::Time;

/// Index of a host-kernel signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(pub usize);

/// Index of a host-kernel event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub usize);

/// Services of the host kernel a running cluster relies on.
pub trait HostKernel {
    /// Current simulated time.
    fn time(&self) -> Time;

    /// Value of a host signal at the current time.
    fn read_signal(&mut self, signal: SignalId) -> f64;

    /// Drive a host signal at the current time.
    fn write_signal(&mut self, signal: SignalId, value: f64);

    /// Whether `event` fired at the current instant.
    fn triggered(&self, event: EventId) -> bool;

    /// One-time trace setup, called once per cluster at its first
    /// PRE_SCHEDULING.
    fn trace_init(&mut self, _cluster: ClusterId) {}
}

/// When the host should resume a suspended cluster: after `delay`, on any
/// of `events`, or whichever comes first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WaitCondition {
    pub delay: Option<Time>,
    pub events: Vec<EventId>,
}

impl WaitCondition {
    pub fn after(delay: Time) -> Self {
        Self {
            delay: Some(delay),
            events: Vec::new(),
        }
    }

    pub fn on_events(events: Vec<EventId>) -> Self {
        Self {
            delay: None,
            events,
        }
    }

    pub fn after_or_on(delay: Option<Time>, events: Vec<EventId>) -> Self {
        Self { delay, events }
    }

    /// Absolute wake-up time, if the condition has a timeout.
    pub fn deadline(&self, now: Time) -> Option<Time> {
        self.delay.map(|d| now.saturating_add(d))
    }

    /// A condition with neither a timeout nor events never fires.
    pub fn is_forever(&self) -> bool {
        self.delay.is_none() && self.events.is_empty()
    }
}
