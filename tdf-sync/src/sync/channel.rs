/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Channels between synchronization objects.
//!
//! A channel has exactly one driving port and any number of reading ports.
//! Samples are stored once; each reader keeps its own absolute read cursor
//! in its port, and samples every reader has passed are discarded.

use std::collections::VecDeque;

use crate::sync::port::PortRef;
use crate::sync::{ChannelId, ClusterId};

// ── ChannelBuffer ─────────────────────────────────────────────────────────────

/// Sample storage addressed by absolute sample index.
#[derive(Debug, Clone, Default)]
pub struct ChannelBuffer {
    samples: VecDeque<f64>,
    /// Absolute index of `samples[0]`.
    base: u64,
}

impl ChannelBuffer {
    /// Absolute index one past the newest sample.
    pub fn written(&self) -> u64 {
        self.base + self.samples.len() as u64
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn push(&mut self, value: f64) {
        self.samples.push_back(value);
    }

    pub fn get(&self, index: u64) -> Option<f64> {
        let offset = index.checked_sub(self.base)?;
        self.samples.get(usize::try_from(offset).ok()?).copied()
    }

    pub fn set(&mut self, index: u64, value: f64) -> bool {
        let Some(offset) = index.checked_sub(self.base) else {
            return false;
        };
        match usize::try_from(offset).ok().and_then(|o| self.samples.get_mut(o)) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Drop every sample with an absolute index below `index`.
    pub fn discard_before(&mut self, index: u64) {
        while self.base < index && !self.samples.is_empty() {
            self.samples.pop_front();
            self.base += 1;
        }
    }

    /// Empty the buffer and pre-fill it with `delay` zero samples starting at
    /// absolute index 0.
    pub fn reset(&mut self, delay: u64) {
        self.samples.clear();
        self.base = 0;
        for _ in 0..delay {
            self.samples.push_back(0.0);
        }
    }

    /// Move every sample from absolute index `from` onwards out of the buffer,
    /// leaving it empty with `written()` unchanged.
    pub fn drain_from(&mut self, from: u64) -> Vec<f64> {
        self.discard_before(from);
        self.base += self.samples.len() as u64;
        self.samples.drain(..).collect()
    }
}

// ── Channel ───────────────────────────────────────────────────────────────────

/// A signal between synchronization objects.
#[derive(Debug, Clone)]
pub struct Channel {
    pub(crate) id: ChannelId,
    pub(crate) name: String,
    pub(crate) drivers: Vec<PortRef>,
    pub(crate) readers: Vec<PortRef>,
    pub(crate) cluster: Option<ClusterId>,
    /// Samples passing through per cluster period.  `0` until analysed.
    pub(crate) samples_per_period: u64,
    /// Multiplier epoch at which `samples_per_period` was recorded.
    pub(crate) multiple: u64,
    /// Deepest fill level reached by the schedule.
    pub(crate) max_buffer_usage: u64,
    pub(crate) buffer: ChannelBuffer,
}

impl Channel {
    pub(crate) fn new(id: ChannelId, name: String) -> Self {
        Self {
            id,
            name,
            drivers: Vec::new(),
            readers: Vec::new(),
            cluster: None,
            samples_per_period: 0,
            multiple: 0,
            max_buffer_usage: 0,
            buffer: ChannelBuffer::default(),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The single driving port, once the graph has been validated.
    pub fn driver(&self) -> Option<PortRef> {
        self.drivers.first().copied()
    }

    pub fn drivers(&self) -> &[PortRef] {
        &self.drivers
    }

    pub fn readers(&self) -> &[PortRef] {
        &self.readers
    }

    /// Every connected port, driver first.
    pub fn ports(&self) -> impl Iterator<Item = PortRef> + '_ {
        self.drivers.iter().chain(self.readers.iter()).copied()
    }

    pub fn cluster(&self) -> Option<ClusterId> {
        self.cluster
    }

    pub fn samples_per_period(&self) -> u64 {
        self.samples_per_period
    }

    pub fn max_buffer_usage(&self) -> u64 {
        self.max_buffer_usage
    }

    pub(crate) fn reset_analysis(&mut self) {
        self.cluster = None;
        self.samples_per_period = 0;
        self.multiple = 0;
        self.max_buffer_usage = 0;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
