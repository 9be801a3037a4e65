/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Synchronization objects: the schedulable units of a cluster.

use crate::host::EventId;
use crate::sync::port::{AttributeArena, AttributeCell, CellId, PortDirection, SyncPort};
use crate::sync::{ClusterId, ObjId, SolverKind};
use crate::time::Time;

/// The object's own attribute cell (module timestep, max timestep anchor).
pub const OBJECT_CELL: CellId = CellId(0);

/// Conditions for the very first activation of an object's cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FirstActivation {
    pub at: Option<Time>,
    pub events: Vec<EventId>,
}

impl FirstActivation {
    pub fn is_requested(&self) -> bool {
        self.at.is_some() || !self.events.is_empty()
    }
}

/// One schedulable unit: a solver instance or a synchronization proxy.
#[derive(Debug, Clone)]
pub struct SyncObject {
    pub(crate) id: ObjId,
    pub(crate) name: String,
    pub(crate) kind: SolverKind,
    pub(crate) ports: Vec<SyncPort>,
    pub(crate) cells: AttributeArena,

    pub(crate) cluster: Option<ClusterId>,
    pub(crate) calls_per_period: u64,
    /// Running multiplier epoch used while the rate analyzer works.
    pub(crate) multiple: u64,
    pub(crate) call_counter: u64,
    pub(crate) calls_in_period: u64,
    pub(crate) last_exec_id: u64,
    pub(crate) graph_order: i64,
    pub(crate) dead: bool,

    pub(crate) max_timestep: Option<Time>,
    pub(crate) does_attribute_changes: bool,
    pub(crate) accepts_attribute_changes: bool,
    pub(crate) first_activation: FirstActivation,
}

impl SyncObject {
    pub(crate) fn new(id: ObjId, name: String, kind: SolverKind) -> Self {
        let mut cells = AttributeArena::default();
        cells.alloc(AttributeCell::default());
        Self {
            id,
            name,
            kind,
            ports: Vec::new(),
            cells,
            cluster: None,
            calls_per_period: 0,
            multiple: 0,
            call_counter: 0,
            calls_in_period: 0,
            last_exec_id: 0,
            graph_order: 0,
            dead: false,
            max_timestep: None,
            does_attribute_changes: false,
            accepts_attribute_changes: false,
            first_activation: FirstActivation::default(),
        }
    }

    // ── Read access ───────────────────────────────────────────────────────────

    pub fn id(&self) -> ObjId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SolverKind {
        self.kind
    }

    pub fn cluster(&self) -> Option<ClusterId> {
        self.cluster
    }

    pub fn calls_per_period(&self) -> u64 {
        self.calls_per_period
    }

    pub fn call_counter(&self) -> u64 {
        self.call_counter
    }

    pub fn last_exec_id(&self) -> u64 {
        self.last_exec_id
    }

    pub fn graph_order(&self) -> i64 {
        self.graph_order
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn ports(&self) -> &[SyncPort] {
        &self.ports
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    /// Ports of one direction, with their indices.
    pub fn ports_in(&self, direction: PortDirection) -> impl Iterator<Item = (usize, &SyncPort)> {
        self.ports
            .iter()
            .enumerate()
            .filter(move |(_, p)| p.direction == direction)
    }

    pub fn has_peer_ports(&self) -> bool {
        self.ports.iter().any(|p| p.direction.is_peer())
    }

    pub fn cell(&self, id: CellId) -> Option<&AttributeCell> {
        self.cells.get(id)
    }

    /// Cell of the port at `index`.
    pub fn port_cell(&self, index: usize) -> Option<&AttributeCell> {
        self.ports.get(index).and_then(|p| self.cells.get(p.cell))
    }

    pub fn rate(&self, index: usize) -> Option<u64> {
        self.port_cell(index).map(|c| c.rate)
    }

    pub fn delay(&self, index: usize) -> Option<u64> {
        self.port_cell(index).map(|c| c.delay)
    }

    /// Interval between two calls, as assigned by the rate analyzer.
    pub fn timestep(&self) -> Time {
        self.cells.get(OBJECT_CELL).map(|c| c.assigned).unwrap_or(Time::ZERO)
    }

    pub fn max_timestep(&self) -> Option<Time> {
        self.max_timestep
    }

    pub fn does_attribute_changes(&self) -> bool {
        self.does_attribute_changes
    }

    pub fn accepts_attribute_changes(&self) -> bool {
        self.accepts_attribute_changes
    }

    pub fn first_activation(&self) -> &FirstActivation {
        &self.first_activation
    }

    // ── Elaboration-time attributes ───────────────────────────────────────────

    /// Request a fixed interval between two calls of this object.
    pub fn set_timestep(&mut self, timestep: Time) {
        if let Some(cell) = self.cells.get_mut(OBJECT_CELL) {
            cell.timestep = Some(timestep);
        }
    }

    /// Upper bound for the interval between two calls.
    pub fn set_max_timestep(&mut self, timestep: Time) {
        self.max_timestep = Some(timestep);
    }

    /// Declare that `change_attributes` may change rates, delays or timing.
    pub fn set_does_attribute_changes(&mut self, does: bool) {
        self.does_attribute_changes = does;
    }

    /// Declare that this object tolerates attribute changes made by others.
    pub fn set_accepts_attribute_changes(&mut self, accepts: bool) {
        self.accepts_attribute_changes = accepts;
    }

    /// Delay the first cluster activation until `at` and/or one of `events`.
    pub fn request_first_activation(&mut self, at: Option<Time>, events: Vec<EventId>) {
        self.first_activation = FirstActivation { at, events };
    }

    /// Clear everything the cluster builder and rate analyzer derive.
    pub(crate) fn reset_analysis(&mut self) {
        self.cluster = None;
        self.calls_per_period = 0;
        self.multiple = 0;
        self.graph_order = 0;
        self.dead = false;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
