/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The per-period action program a cluster executes.
//!
//! Host reads, runs of scheduled calls and host writes are keyed by their
//! scaled offset inside the period.  Within one offset the order is always
//! reads, then calls, then writes.

use std::collections::BTreeMap;
use std::ops::Range;

use crate::sync::PortRef;

/// One action of the cluster program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostAction {
    /// Read one sample of a host signal into a `FromHost` port queue.
    ReadHost(PortRef),
    /// Run a contiguous slice of the scheduling list.
    Schedule(Range<usize>),
    /// Write one sample of a `ToHost` port queue to its host signal.
    WriteHost(PortRef),
}

impl HostAction {
    fn rank(&self) -> u8 {
        match self {
            HostAction::ReadHost(_) => 0,
            HostAction::Schedule(_) => 1,
            HostAction::WriteHost(_) => 2,
        }
    }
}

/// An action with its scaled offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedAction {
    pub scaled_time: u64,
    pub action: HostAction,
}

/// Ordered actions of one period.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleProgram {
    actions: Vec<TimedAction>,
}

impl ScheduleProgram {
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TimedAction> {
        self.actions.get(index)
    }

    pub fn actions(&self) -> &[TimedAction] {
        &self.actions
    }

    pub fn reads(&self) -> usize {
        self.count(|a| matches!(a, HostAction::ReadHost(_)))
    }

    pub fn writes(&self) -> usize {
        self.count(|a| matches!(a, HostAction::WriteHost(_)))
    }

    fn count(&self, pred: impl Fn(&HostAction) -> bool) -> usize {
        self.actions.iter().filter(|t| pred(&t.action)).count()
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Collects actions in any order and sorts them into a [`ScheduleProgram`].
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    pending: BTreeMap<u64, Vec<HostAction>>,
}

impl ProgramBuilder {
    pub fn push(&mut self, scaled_time: u64, action: HostAction) {
        self.pending.entry(scaled_time).or_default().push(action);
    }

    pub fn finish(self) -> ScheduleProgram {
        let mut actions = Vec::new();
        for (scaled_time, mut step) in self.pending {
            // Stable: slices and same-kind host actions keep insertion order.
            step.sort_by_key(HostAction::rank);
            actions.extend(step.into_iter().map(|action| TimedAction { scaled_time, action }));
        }
        ScheduleProgram { actions }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
