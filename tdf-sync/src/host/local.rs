/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! A small reference host kernel.
//!
//! [`LocalKernel`] keeps a time, a set of scalar signals (optionally driven
//! by a stimulus function of time) and a queue of timed event notifications.
//! [`LocalKernel::run`] resumes every cluster of a [`Session`] whenever its
//! wait condition holds, with delta cycles inside one instant.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use tracing::{debug, info};

use crate::error::SyncError;
use crate::host::{EventId, HostKernel, SignalId, WaitCondition};
use crate::session::Session;
use crate::sync::ClusterId;
use crate::time::Time;

/// Maximum delta cycles per instant before [`LocalKernel::run`] gives up.
const DEFAULT_MAX_DELTAS: u32 = 10_000;

type Stimulus = Box<dyn Fn(Time) -> f64>;

struct Signal {
    name: String,
    value: f64,
    stimulus: Option<Stimulus>,
    history: Vec<(Time, f64)>,
}

/// A cluster suspended in the kernel.
#[derive(Debug, Clone)]
struct Pending {
    at: Option<Time>,
    events: Vec<EventId>,
}

impl Pending {
    fn from_condition(cond: WaitCondition, now: Time) -> Option<Self> {
        if cond.is_forever() {
            return None;
        }
        Some(Self {
            at: cond.deadline(now),
            events: cond.events,
        })
    }

    fn is_due(&self, now: Time, triggered: &HashSet<EventId>) -> bool {
        self.at.is_some_and(|t| t <= now) || self.events.iter().any(|e| triggered.contains(e))
    }
}

/// Statistics of one [`LocalKernel::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub end_time: Time,
    pub resumptions: u64,
    pub deltas: u64,
}

/// Reference host kernel used by the binary and the tests.
pub struct LocalKernel {
    now: Time,
    signals: Vec<Signal>,
    event_names: Vec<String>,
    notifications: BinaryHeap<Reverse<(Time, EventId)>>,
    triggered: HashSet<EventId>,
    trace_inits: Vec<ClusterId>,
    max_deltas: u32,
}

impl Default for LocalKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalKernel {
    pub fn new() -> Self {
        Self {
            now: Time::ZERO,
            signals: Vec::new(),
            event_names: Vec::new(),
            notifications: BinaryHeap::new(),
            triggered: HashSet::new(),
            trace_inits: Vec::new(),
            max_deltas: DEFAULT_MAX_DELTAS,
        }
    }

    pub fn set_max_deltas(&mut self, max: u32) {
        self.max_deltas = max;
    }

    // ── Signals ───────────────────────────────────────────────────────────────

    pub fn add_signal(&mut self, name: impl Into<String>, initial: f64) -> SignalId {
        self.signals.push(Signal {
            name: name.into(),
            value: initial,
            stimulus: None,
            history: Vec::new(),
        });
        SignalId(self.signals.len() - 1)
    }

    /// Drive `signal` from a function of time.  Reads evaluate it at the
    /// current time.
    pub fn drive(&mut self, signal: SignalId, stimulus: impl Fn(Time) -> f64 + 'static) {
        if let Some(sig) = self.signals.get_mut(signal.0) {
            sig.stimulus = Some(Box::new(stimulus));
        }
    }

    pub fn find_signal(&self, name: &str) -> Option<SignalId> {
        self.signals.iter().position(|s| s.name == name).map(SignalId)
    }

    pub fn signal_value(&self, signal: SignalId) -> Option<f64> {
        self.signals.get(signal.0).map(|s| match &s.stimulus {
            Some(f) => f(self.now),
            None => s.value,
        })
    }

    /// Every value written to `signal`, with its write time.
    pub fn writes(&self, signal: SignalId) -> &[(Time, f64)] {
        self.signals
            .get(signal.0)
            .map(|s| s.history.as_slice())
            .unwrap_or(&[])
    }

    // ── Events ────────────────────────────────────────────────────────────────

    pub fn new_event(&mut self, name: impl Into<String>) -> EventId {
        self.event_names.push(name.into());
        EventId(self.event_names.len() - 1)
    }

    pub fn notify_at(&mut self, event: EventId, at: Time) {
        self.notifications.push(Reverse((at, event)));
    }

    /// Clusters whose trace setup ran, in call order.
    pub fn trace_inits(&self) -> &[ClusterId] {
        &self.trace_inits
    }

    fn fire_notifications(&mut self) {
        while let Some(Reverse((at, event))) = self.notifications.peek().copied() {
            if at > self.now {
                break;
            }
            self.notifications.pop();
            debug!(event = event.0, time = %self.now, "event fired");
            self.triggered.insert(event);
        }
    }

    // ── Driver loop ───────────────────────────────────────────────────────────

    /// Resume the clusters of `session` until no activity is left or the
    /// next activity lies beyond `until`.
    pub fn run(&mut self, session: &mut Session, until: Time) -> Result<RunSummary, SyncError> {
        let clusters = session.cluster_count();
        let mut waits: Vec<Option<Pending>> = vec![
            Some(Pending {
                at: Some(self.now),
                events: Vec::new(),
            });
            clusters
        ];
        let mut summary = RunSummary::default();

        info!(clusters, until = %until, "local kernel run started");
        self.fire_notifications();

        loop {
            // ── Delta cycles at the current instant ──────────────────────────
            let mut deltas = 0u32;
            loop {
                let due: Vec<usize> = (0..clusters)
                    .filter(|&c| {
                        waits[c]
                            .as_ref()
                            .is_some_and(|w| w.is_due(self.now, &self.triggered))
                    })
                    .collect();
                if due.is_empty() {
                    break;
                }
                deltas += 1;
                if deltas > self.max_deltas {
                    return Err(SyncError::DeltaCycleLimit {
                        time: self.now,
                        max_deltas: self.max_deltas,
                    });
                }
                for c in due {
                    let cond = session.resume(ClusterId(c), self)?;
                    summary.resumptions += 1;
                    waits[c] = Pending::from_condition(cond, self.now);
                }
                // Notifications only wake processes already waiting on them.
                self.triggered.clear();
            }
            summary.deltas += u64::from(deltas);

            // ── Advance time ─────────────────────────────────────────────────
            let next_wait = waits.iter().flatten().filter_map(|w| w.at).min();
            let next_event = self.notifications.peek().map(|Reverse((t, _))| *t);
            let next = match (next_wait, next_event) {
                (Some(a), Some(b)) => a.min(b),
                (Some(a), None) => a,
                (None, Some(b)) => b,
                (None, None) => break,
            };
            if next > until {
                self.now = until;
                break;
            }
            self.now = next;
            self.fire_notifications();
        }

        summary.end_time = self.now;
        info!(
            end = %summary.end_time,
            resumptions = summary.resumptions,
            "local kernel run finished"
        );
        Ok(summary)
    }
}

impl HostKernel for LocalKernel {
    fn time(&self) -> Time {
        self.now
    }

    fn read_signal(&mut self, signal: SignalId) -> f64 {
        self.signal_value(signal).unwrap_or(0.0)
    }

    fn write_signal(&mut self, signal: SignalId, value: f64) {
        let now = self.now;
        if let Some(sig) = self.signals.get_mut(signal.0) {
            sig.value = value;
            sig.history.push((now, value));
        }
    }

    fn triggered(&self, event: EventId) -> bool {
        self.triggered.contains(&event)
    }

    fn trace_init(&mut self, cluster: ClusterId) {
        self.trace_inits.push(cluster);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
