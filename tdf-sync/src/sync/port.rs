/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Synchronization ports and the attribute cells they point at.
//!
//! A port never owns its rate, delay or timestep.  Those live in an
//! [`AttributeArena`] owned by the object, and the port holds a [`CellId`]
//! into it.  Setters on the object (or on the processing context) write the
//! cell; the scheduler reads it through the port.

use std::collections::VecDeque;

use crate::host::SignalId;
use crate::sync::{ChannelId, ObjId};
use crate::time::Time;

// ── Direction / link ──────────────────────────────────────────────────────────

/// The four kinds of synchronization port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    /// Drives a channel read by other synchronization objects.
    ToPeer,
    /// Reads a channel driven by another synchronization object.
    FromPeer,
    /// Writes a host-kernel signal.
    ToHost,
    /// Reads a host-kernel signal.
    FromHost,
}

impl PortDirection {
    pub fn is_input(self) -> bool {
        matches!(self, PortDirection::FromPeer | PortDirection::FromHost)
    }

    pub fn is_peer(self) -> bool {
        matches!(self, PortDirection::ToPeer | PortDirection::FromPeer)
    }

    pub fn is_host(self) -> bool {
        !self.is_peer()
    }
}

/// What the port is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortLink {
    Channel(ChannelId),
    Host(SignalId),
}

/// Address of one port: owning object plus index in its port list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortRef {
    pub obj: ObjId,
    pub index: usize,
}

// ── Attribute arena ───────────────────────────────────────────────────────────

/// Index of an [`AttributeCell`] inside its object's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellId(pub usize);

/// Timing attributes of one port (or, for cell 0, of the object itself).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeCell {
    /// Samples consumed or produced per call.  Always 1 for the object cell.
    pub rate: u64,
    /// Initial samples buffered before the first call.
    pub delay: u64,
    /// Explicitly requested sample interval, if any.
    pub timestep: Option<Time>,
    /// Interval assigned by the rate analyzer.
    pub assigned: Time,
    /// Execution id at which a dynamic change last touched this cell.
    pub change_id: u64,
}

impl Default for AttributeCell {
    fn default() -> Self {
        Self {
            rate: 1,
            delay: 0,
            timestep: None,
            assigned: Time::ZERO,
            change_id: 0,
        }
    }
}

/// Owner of every attribute cell of one object.
#[derive(Debug, Clone, Default)]
pub struct AttributeArena {
    cells: Vec<AttributeCell>,
}

impl AttributeArena {
    pub fn alloc(&mut self, cell: AttributeCell) -> CellId {
        self.cells.push(cell);
        CellId(self.cells.len() - 1)
    }

    pub fn get(&self, id: CellId) -> Option<&AttributeCell> {
        self.cells.get(id.0)
    }

    pub fn get_mut(&mut self, id: CellId) -> Option<&mut AttributeCell> {
        self.cells.get_mut(id.0)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttributeCell> {
        self.cells.iter()
    }
}

// ── Port specification ────────────────────────────────────────────────────────

/// Builder used to attach a port to an object.
///
/// ```rust
/// use tdf_sync::sync::{ChannelId, PortSpec};
///
/// let spec = PortSpec::from_peer("in", ChannelId(0)).rate(2).delay(1);
/// assert_eq!(spec.rate, 2);
/// ```
#[derive(Debug, Clone)]
pub struct PortSpec {
    pub name: String,
    pub direction: PortDirection,
    pub link: PortLink,
    pub rate: u64,
    pub delay: u64,
    pub timestep: Option<Time>,
}

impl PortSpec {
    fn new(name: impl Into<String>, direction: PortDirection, link: PortLink) -> Self {
        Self {
            name: name.into(),
            direction,
            link,
            rate: 1,
            delay: 0,
            timestep: None,
        }
    }

    pub fn to_peer(name: impl Into<String>, channel: ChannelId) -> Self {
        Self::new(name, PortDirection::ToPeer, PortLink::Channel(channel))
    }

    pub fn from_peer(name: impl Into<String>, channel: ChannelId) -> Self {
        Self::new(name, PortDirection::FromPeer, PortLink::Channel(channel))
    }

    pub fn to_host(name: impl Into<String>, signal: SignalId) -> Self {
        Self::new(name, PortDirection::ToHost, PortLink::Host(signal))
    }

    pub fn from_host(name: impl Into<String>, signal: SignalId) -> Self {
        Self::new(name, PortDirection::FromHost, PortLink::Host(signal))
    }

    pub fn rate(mut self, rate: u64) -> Self {
        self.rate = rate;
        self
    }

    pub fn delay(mut self, delay: u64) -> Self {
        self.delay = delay;
        self
    }

    pub fn timestep(mut self, timestep: Time) -> Self {
        self.timestep = Some(timestep);
        self
    }
}

// ── SyncPort ──────────────────────────────────────────────────────────────────

/// A typed connection point owned by a synchronization object.
#[derive(Debug, Clone)]
pub struct SyncPort {
    pub name: String,
    pub direction: PortDirection,
    pub link: PortLink,
    pub cell: CellId,

    /// Samples of the call in progress (inputs staged before the call,
    /// outputs collected during it).
    pub(crate) staged: Vec<f64>,

    /// Port-local queue: input delay samples of a `FromPeer` port, or the
    /// pending samples of a host port.
    pub(crate) queue: VecDeque<f64>,

    /// `FromPeer` only: absolute index of the next channel sample to read.
    pub(crate) read_cursor: u64,
}

impl SyncPort {
    pub(crate) fn new(name: String, direction: PortDirection, link: PortLink, cell: CellId) -> Self {
        Self {
            name,
            direction,
            link,
            cell,
            staged: Vec::new(),
            queue: VecDeque::new(),
            read_cursor: 0,
        }
    }

    pub fn channel(&self) -> Option<ChannelId> {
        match self.link {
            PortLink::Channel(ch) => Some(ch),
            PortLink::Host(_) => None,
        }
    }

    pub fn signal(&self) -> Option<SignalId> {
        match self.link {
            PortLink::Host(sig) => Some(sig),
            PortLink::Channel(_) => None,
        }
    }
}

/// Resize a queue so it holds exactly `len` samples: the oldest samples go
/// first when shrinking, zeros are prepended when growing.
pub(crate) fn resize_front(queue: &mut VecDeque<f64>, len: usize) {
    while queue.len() > len {
        queue.pop_front();
    }
    while queue.len() < len {
        queue.push_front(0.0);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
