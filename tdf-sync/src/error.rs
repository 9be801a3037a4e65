/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for cluster synchronization.
//!
//! Every fatal condition the scheduler can detect is a distinct
//! [`SyncError`] variant carrying the names and values a user needs to find
//! the offending model element:
//!
//! | Layer | Variants | Detected |
//! |---|---|---|
//! | Graph | `MultipleDrivers`, `NoDriver`, `ObjectNotInList`, `ObjectListedTwice`, `ZeroRate` | once, before timing analysis |
//! | Timing | `InconsistentTimestep`, `TimestepAboveMaximum`, `TimestepUnderflow`, `NoTimestep`, `InconsistentRates`, `BadConditionedCluster` | rate analysis, initial or on rescheduling |
//! | Scheduling | `Unschedulable` | list scheduling |
//! | Protocol | `AttributeChangeNotAllowed`, `AttributeChangeNotAccepted`, `PortAccessOutsideProcessing`, ... | at the point of violation |
//! | Host | `DeltaCycleLimit` | reference host kernel only |
//!
//! Per-step numerical failures of a solver are **not** errors; they are
//! returned as [`SolverWarning`] and logged.

use thiserror::Error;

use crate::time::Time;

/// Render at most `max` names, followed by a count of the omitted ones.
pub fn truncated_list(names: &[String], max: usize) -> String {
    if names.len() <= max {
        return names.join(", ");
    }
    format!(
        "{} ... and {} more",
        names[..max].join(", "),
        names.len() - max
    )
}

// ── Fatal errors ──────────────────────────────────────────────────────────────

/// Fatal scheduler error.  Once returned, the affected cluster does not run.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SyncError {
    // ── Graph ─────────────────────────────────────────────────────────────────
    /// A channel is driven by more than one port.
    #[error("channel '{channel}' has more than one driver: {drivers}")]
    MultipleDrivers { channel: String, drivers: String },

    /// A channel has readers but no driving port.
    #[error("channel '{channel}' has no driver (read by {readers})")]
    NoDriver { channel: String, readers: String },

    /// An object reachable through a channel was never registered.
    #[error("object '{object}' connected to channel '{channel}' is not in the object list")]
    ObjectNotInList { object: String, channel: String },

    /// An object was registered more than once.
    #[error("object '{object}' is more than one time in the object list")]
    ObjectListedTwice { object: String },

    /// A port rate of zero.  The owning cluster is marked dead.
    #[error("port '{port}' of '{object}' has rate 0 (cluster members: {members})")]
    ZeroRate {
        object: String,
        port: String,
        members: String,
    },

    /// A handle does not refer to anything in this session.
    #[error("unknown {what} handle {index}")]
    UnknownHandle { what: &'static str, index: usize },

    // ── Timing ────────────────────────────────────────────────────────────────
    /// Two fixed timestep assignments imply different cluster periods.
    #[error(
        "inconsistent timestep: {first} implies a cluster period of {first_period}, \
         but {second} implies {second_period} (expected {second} = {expected}; \
         cluster members: {members})"
    )]
    InconsistentTimestep {
        first: String,
        first_period: Time,
        second: String,
        second_period: Time,
        expected: String,
        members: String,
    },

    /// A fixed timestep implies a period above a requested maximum.
    #[error(
        "fixed period {period} set by {source_name} exceeds the maximum {max_period} \
         requested by {max_source}"
    )]
    TimestepAboveMaximum {
        period: Time,
        source_name: String,
        max_period: Time,
        max_source: String,
    },

    /// A port interval rounded down to zero ticks.
    #[error(
        "timestep of port '{port}' of '{object}' is zero: period {period} divided into \
         {samples} samples underflows the time resolution"
    )]
    TimestepUnderflow {
        object: String,
        port: String,
        period: Time,
        samples: u64,
    },

    /// Nothing in the cluster assigns a timestep.
    #[error("no timestep assigned in cluster {cluster} (members: {members})")]
    NoTimestep { cluster: usize, members: String },

    /// Rates around a cycle of channels do not balance.
    #[error(
        "inconsistent rates on channel '{channel}': port '{port}' of '{object}' requires \
         {required} samples per period, channel already carries {actual}"
    )]
    InconsistentRates {
        channel: String,
        object: String,
        port: String,
        required: u64,
        actual: u64,
    },

    /// A sample count grew past the configured numeric limit.
    #[error("bad-conditioned cluster {cluster}: sample count exceeds {limit} at '{object}' (members: {members})")]
    BadConditionedCluster {
        cluster: usize,
        object: String,
        limit: u64,
        members: String,
    },

    // ── Scheduling ────────────────────────────────────────────────────────────
    /// The greedy sweep stalled and the host kernel cannot advance further.
    #[error(
        "system cannot be scheduled: cluster {cluster} stalled; scheduled so far: \
         [{partial}]; stuck objects: {stuck}"
    )]
    Unschedulable {
        cluster: usize,
        partial: String,
        stuck: String,
    },

    // ── Dynamic attribute protocol ────────────────────────────────────────────
    /// An attribute setter was called by an object that did not declare
    /// `does_attribute_changes`.
    #[error("'{object}' called {operation} without declaring does_attribute_changes")]
    AttributeChangeNotAllowed { object: String, operation: String },

    /// A member of the cluster does not accept attribute changes made by
    /// another member.
    #[error("'{changed_by}' changed attributes, but cluster member '{object}' does not accept attribute changes")]
    AttributeChangeNotAccepted { object: String, changed_by: String },

    /// An attribute setter was called from a callback other than
    /// `change_attributes`.
    #[error("'{object}' called {operation} outside change_attributes")]
    OutsideChangeAttributes { object: String, operation: String },

    /// Port samples were accessed outside a processing call.
    #[error("port '{port}' of '{object}' accessed outside processing")]
    PortAccessOutsideProcessing { object: String, port: String },

    /// A port index past the object's port list.
    #[error("'{object}' has no port with index {index}")]
    PortIndexOutOfRange { object: String, index: usize },

    /// A sample index not below the port rate, or the wrong port direction.
    #[error("invalid access to sample {sample} of port '{port}' of '{object}' (rate {rate})")]
    SampleIndexOutOfRange {
        object: String,
        port: String,
        sample: u64,
        rate: u64,
    },

    /// A setter received a value it cannot accept.
    #[error("invalid attribute for '{object}': {reason}")]
    InvalidAttribute { object: String, reason: String },

    // ── Internal ──────────────────────────────────────────────────────────────
    /// A port found fewer buffered samples than the schedule guaranteed.
    #[error("buffer underflow at port '{port}' of '{object}'")]
    BufferUnderflow { object: String, port: String },

    /// An operation that needs elaborated clusters ran before `elaborate`.
    #[error("session is not elaborated")]
    NotElaborated,

    /// Clusters kept waking each other at one instant of the reference host.
    #[error("delta cycle limit exceeded at {time} (max {max_deltas} deltas)")]
    DeltaCycleLimit { time: Time, max_deltas: u32 },
}

// ── Non-fatal ─────────────────────────────────────────────────────────────────

/// A per-step numerical problem reported by a solver.
///
/// The state machine logs it with the object name and keeps going with the
/// best-effort result.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct SolverWarning {
    pub message: String,
}

impl SolverWarning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Outcome of a failed `processing` call.
///
/// Both sides convert with `?`, so a solver can mix port accessors
/// (which fail with [`SyncError`]) and its own numeric checks.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepError {
    #[error(transparent)]
    Fatal(#[from] SyncError),
    #[error("solver warning: {0}")]
    Warning(#[from] SolverWarning),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
