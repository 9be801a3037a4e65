/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Solver/channel interface layer.
//!
//! Everything the scheduler needs to know about a solver lives here:
//!
//! | Type | Role |
//! |---|---|
//! | [`SyncObject`] | schedulable unit, owns ports and an attribute arena |
//! | [`SyncPort`] | directional connection point, holds a [`CellId`] |
//! | [`Channel`] | single-writer, multi-reader sample stream |
//! | [`SolverKind`] | closed set of solver variants |
//! | [`SyncBehavior`] | callbacks a solver implements |
//!
//! The behavior of a solver is kept apart from its synchronization data:
//! the scheduler owns every [`SyncObject`] inside the [`crate::context::SyncCore`]
//! and calls the matching [`SyncBehavior`] with a [`ProcessingContext`] that
//! borrows the core for the duration of one callback.

pub mod channel;
pub mod object;
pub mod port;

pub use channel::{Channel, ChannelBuffer};
pub use object::{FirstActivation, SyncObject, OBJECT_CELL};
pub use port::{
    AttributeArena, AttributeCell, CellId, PortDirection, PortLink, PortRef, PortSpec, SyncPort,
};

use std::fmt;

use crate::error::{StepError, SyncError};
use crate::processing::ProcessingContext;

// ── Handles ───────────────────────────────────────────────────────────────────

/// Index of a synchronization object in its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjId(pub usize);

/// Index of a channel in its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub usize);

/// Index of a cluster, assigned in creation order by the cluster builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterId(pub usize);

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── SolverKind ────────────────────────────────────────────────────────────────

/// The fixed set of solver kinds a synchronization object can wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SolverKind {
    /// Timed dataflow modules.
    #[default]
    SignalFlow,
    /// Linear signal-flow network (equation system solved every step).
    LinearSignalFlow,
    /// Electrical conservative network.
    ElectricalNetwork,
    /// Proxy that only moves samples to and from the host kernel.
    HostProxy,
}

impl SolverKind {
    /// Network solvers keep an equation-system checkpoint that is stored
    /// after every committed step and restored when a step is repeated.
    pub fn is_network(self) -> bool {
        matches!(
            self,
            SolverKind::LinearSignalFlow | SolverKind::ElectricalNetwork
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            SolverKind::SignalFlow => "signal-flow",
            SolverKind::LinearSignalFlow => "linear-signal-flow",
            SolverKind::ElectricalNetwork => "electrical-network",
            SolverKind::HostProxy => "host-proxy",
        }
    }
}

impl std::str::FromStr for SolverKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "signal-flow" => Ok(SolverKind::SignalFlow),
            "linear-signal-flow" => Ok(SolverKind::LinearSignalFlow),
            "electrical-network" => Ok(SolverKind::ElectricalNetwork),
            "host-proxy" => Ok(SolverKind::HostProxy),
            other => Err(format!("unknown solver kind '{other}'")),
        }
    }
}

// ── Callbacks ─────────────────────────────────────────────────────────────────

/// Whether an optional callback did anything.
///
/// The state machine calls `change_attributes` and `reinitialize` on every
/// member once; members answering [`Callback::Unimplemented`] are never
/// called again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callback {
    Handled,
    Unimplemented,
}

/// Callback a schedule element or a [`crate::processing::ProcessingContext`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Initialize,
    Processing,
    ChangeAttributes,
    Reinitialize,
}

/// Callbacks a solver implements.  Only `processing` is mandatory.
pub trait SyncBehavior {
    /// Called once before the first period.  Delay samples may be set here.
    fn initialize(&mut self, _ctx: &mut ProcessingContext<'_>) -> Result<(), SyncError> {
        Ok(())
    }

    /// One activation: read `rate` samples of every input, write `rate`
    /// samples of every output.
    fn processing(&mut self, ctx: &mut ProcessingContext<'_>) -> Result<(), StepError>;

    /// Called at the end of every period.  Attribute setters are only legal
    /// here.
    fn change_attributes(&mut self, _ctx: &mut ProcessingContext<'_>) -> Result<Callback, SyncError> {
        Ok(Callback::Unimplemented)
    }

    /// Called before a period that follows a rescheduling or a time jump.
    fn reinitialize(&mut self, _ctx: &mut ProcessingContext<'_>) -> Result<Callback, SyncError> {
        Ok(Callback::Unimplemented)
    }

    /// Network solvers: commit the state reached at the end of a step.
    fn store_checkpoint(&mut self) {}

    /// Network solvers: roll back to the last committed state.
    fn restore_checkpoint(&mut self) {}

    fn terminate(&mut self) {}

    fn reset(&mut self) {}
}

/// Behavior of objects that only move samples (the host proxies).
///
/// Every output sample is a copy of the input sample at the same position
/// modulo the input rate.  Objects without inputs write zeros.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl SyncBehavior for Passthrough {
    fn processing(&mut self, ctx: &mut ProcessingContext<'_>) -> Result<(), StepError> {
        let inputs = ctx.input_ports();
        let outputs = ctx.output_ports();
        for out in outputs {
            let rate = ctx.rate(out)?;
            for i in 0..rate {
                let value = match inputs.first() {
                    Some(&inp) => {
                        let in_rate = ctx.rate(inp)?;
                        ctx.read(inp, i % in_rate)?
                    }
                    None => 0.0,
                };
                ctx.write(out, i, value)?;
            }
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
