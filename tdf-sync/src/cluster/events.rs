/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Reactivation requests collected during one cluster period.

use std::collections::HashSet;

use crate::host::{EventId, HostKernel};
use crate::time::Time;

/// Everything members asked for about the next cluster start.  Cleared once
/// the next start has been planned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationRequests {
    /// Earliest requested absolute start time.
    pub at: Option<Time>,
    /// Latest allowed start time.
    pub max_start: Option<Time>,
    /// Any of these wakes the cluster.
    pub events: Vec<EventId>,
    /// Each list wakes the cluster once all of its events fired.
    pub and_lists: Vec<Vec<EventId>>,
}

impl ActivationRequests {
    pub fn request_at(&mut self, t: Time) {
        self.at = Some(self.at.map_or(t, |cur| cur.min(t)));
    }

    pub fn request_max_start(&mut self, t: Time) {
        self.max_start = Some(self.max_start.map_or(t, |cur| cur.min(t)));
    }

    pub fn request_event(&mut self, event: EventId) {
        if !self.events.contains(&event) {
            self.events.push(event);
        }
    }

    pub fn request_and_list(&mut self, mut events: Vec<EventId>) {
        events.sort();
        events.dedup();
        if !events.is_empty() && !self.and_lists.contains(&events) {
            self.and_lists.push(events);
        }
    }
}

/// Turns an and-list of events into a single wake-up condition.
///
/// The watcher remembers which events of its list already fired.  Once all
/// of them did, it reports completion and re-arms itself for the next
/// period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndListWatcher {
    events: Vec<EventId>,
    fired: HashSet<EventId>,
    completions: u64,
}

impl AndListWatcher {
    pub fn new(events: Vec<EventId>) -> Self {
        Self {
            events,
            fired: HashSet::new(),
            completions: 0,
        }
    }

    /// Record events triggered at the current instant.  Returns `true` when
    /// this completes the list.
    pub fn observe(&mut self, host: &dyn HostKernel) -> bool {
        for &e in &self.events {
            if host.triggered(e) {
                self.fired.insert(e);
            }
        }
        if self.fired.len() == self.events.len() {
            self.fired.clear();
            self.completions += 1;
            return true;
        }
        false
    }

    /// Events still missing.
    pub fn outstanding(&self) -> Vec<EventId> {
        self.events
            .iter()
            .copied()
            .filter(|e| !self.fired.contains(e))
            .collect()
    }

    pub fn completions(&self) -> u64 {
        self.completions
    }
}
