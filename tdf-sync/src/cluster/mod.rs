/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Clusters and their run-time synchronization data.
//!
//! A [`Cluster`] is created once by the cluster builder and never changes
//! membership.  Its timing (`period`, `scaled_lcm`) and its schedule are
//! rewritten by the rate analyzer and the list scheduler, initially and on
//! every rescheduling.  [`ClusterSyncData`] is the mutable record the state
//! machine and the processing context share.

pub mod events;
pub mod state;

pub use events::{ActivationRequests, AndListWatcher};
pub use state::{ClusterProcess, ClusterState};

use std::collections::HashMap;

use tracing::info;

use crate::context::SyncCore;
use crate::error::SyncError;
use crate::host::EventId;
use crate::hooks::TraceRecord;
use crate::schedule::{self, SchedElement, ScheduleProgram};
use crate::sync::port::{resize_front, PortDirection};
use crate::sync::{ChannelId, ClusterId, ObjId};
use crate::time::Time;
use crate::timing;

// ── Change flags ──────────────────────────────────────────────────────────────

/// Which kinds of attribute changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeFlags {
    pub timestep: bool,
    pub rate: bool,
    pub delay: bool,
}

impl ChangeFlags {
    pub fn any(&self) -> bool {
        self.timestep || self.rate || self.delay
    }
}

/// A request for a new cluster period, with the object that made it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodRequest {
    pub period: Time,
    pub by: ObjId,
}

/// The condition a suspended cluster waits for before its next period.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WakePlan {
    pub at: Option<Time>,
    pub events: Vec<EventId>,
    pub and_lists: Vec<Vec<EventId>>,
}

// ── ClusterSyncData ───────────────────────────────────────────────────────────

/// Run-time bookkeeping of one cluster.
#[derive(Debug, Clone, Default)]
pub struct ClusterSyncData {
    /// Start and end of the running period.
    pub start: Time,
    pub end: Time,
    pub last_start: Time,
    pub last_end: Time,
    /// Elapsed time between the last two starts.
    pub current_timestep: Time,
    pub last_timestep: Time,
    pub last_period: Time,
    /// Nominal start of the next period.
    pub expected_start: Time,

    pub first_pass: bool,
    pub passes: u64,
    pub static_passes: u64,

    pub definitely_static: bool,
    /// Members implementing `change_attributes`; `None` until the first call.
    pub change_attribute_callers: Option<Vec<ObjId>>,
    /// Members implementing `reinitialize`; `None` until the first call.
    pub reinitialize_callers: Option<Vec<ObjId>>,
    /// Number of full (non-static) post-scheduling passes.
    pub change_attribute_checks: u64,

    /// Changes made during the running period.
    pub changes: ChangeFlags,
    /// Changes visible to members during the running period.
    pub applied: ChangeFlags,
    /// First member that changed an attribute in the running period.
    pub changed_by: Option<ObjId>,
    pub reschedule_pending: bool,
    pub rescheduled: bool,

    pub requests: ActivationRequests,
    pub requested_fixed_period: Option<PeriodRequest>,
    pub requested_max_period: Option<PeriodRequest>,
    pub watchers: HashMap<Vec<EventId>, AndListWatcher>,
    pub wake: Option<WakePlan>,

    pub pending_traces: Vec<TraceRecord>,
    pub trace_initialized: bool,

    /// Execution id at the last rate analysis.  Attribute cells changed
    /// after it take part in the next rescheduling.
    pub analysis_id: u64,
}

// ── Cluster ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Cluster {
    pub(crate) id: ClusterId,
    /// Members in the cluster builder's traversal order.
    pub(crate) objects: Vec<ObjId>,
    pub(crate) channels: Vec<ChannelId>,
    pub(crate) period: Time,
    pub(crate) max_period: Option<Time>,
    pub(crate) dead: bool,
    /// Integer timebase of one period (LCM of all call and host sample counts).
    pub(crate) scaled_lcm: u64,
    pub(crate) scheduling_list: Vec<SchedElement>,
    pub(crate) program: ScheduleProgram,
    pub(crate) sync: ClusterSyncData,
}

impl Cluster {
    pub(crate) fn new(id: ClusterId) -> Self {
        Self {
            id,
            objects: Vec::new(),
            channels: Vec::new(),
            period: Time::ZERO,
            max_period: None,
            dead: false,
            scaled_lcm: 1,
            scheduling_list: Vec::new(),
            program: ScheduleProgram::default(),
            sync: ClusterSyncData {
                first_pass: true,
                ..Default::default()
            },
        }
    }

    pub fn id(&self) -> ClusterId {
        self.id
    }

    pub fn objects(&self) -> &[ObjId] {
        &self.objects
    }

    pub fn channels(&self) -> &[ChannelId] {
        &self.channels
    }

    pub fn period(&self) -> Time {
        self.period
    }

    pub fn max_period(&self) -> Option<Time> {
        self.max_period
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn scaled_lcm(&self) -> u64 {
        self.scaled_lcm
    }

    pub fn scheduling_list(&self) -> &[SchedElement] {
        &self.scheduling_list
    }

    pub fn program(&self) -> &ScheduleProgram {
        &self.program
    }

    pub fn sync(&self) -> &ClusterSyncData {
        &self.sync
    }

    /// Absolute time of a scaled offset within the running period.
    pub fn real_time(&self, scaled: u64) -> Time {
        self.sync.start.saturating_add(
            self.period
                .scale(scaled, self.scaled_lcm)
                .unwrap_or(self.period),
        )
    }
}

// ── Buffers ───────────────────────────────────────────────────────────────────

/// Fill every buffer of the cluster with its delay samples (zeros) and reset
/// read cursors and call counters.
pub(crate) fn init_buffers(core: &mut SyncCore, cid: ClusterId) -> Result<(), SyncError> {
    let (objects, channels) = {
        let c = core.cluster(cid)?;
        (c.objects.clone(), c.channels.clone())
    };
    for ch in channels {
        let delay = match core.channel(ch)?.driver() {
            Some(d) => core.port_cell(d)?.delay,
            None => 0,
        };
        core.channel_mut(ch)?.buffer.reset(delay);
    }
    for obj in objects {
        let object = core.object_mut(obj)?;
        object.call_counter = 0;
        object.calls_in_period = 0;
        for i in 0..object.ports.len() {
            let delay = object.cells.get(object.ports[i].cell).map_or(0, |c| c.delay);
            let port = &mut object.ports[i];
            port.staged.clear();
            port.read_cursor = 0;
            port.queue.clear();
            if port.direction != PortDirection::ToPeer {
                resize_front(&mut port.queue, delay as usize);
            }
        }
    }
    Ok(())
}

/// Bring the buffers of a rescheduled cluster to the new delays.
///
/// Unread channel samples move into each reader's port queue, which is then
/// resized to the reader delay plus the driver delay.  Host port queues are
/// resized to their own delay.  The oldest samples are dropped first; new
/// samples are zeros.
pub(crate) fn adjust_buffers(core: &mut SyncCore, cid: ClusterId) -> Result<(), SyncError> {
    let (objects, channels) = {
        let c = core.cluster(cid)?;
        (c.objects.clone(), c.channels.clone())
    };
    for ch in channels {
        let channel = core.channel(ch)?;
        let driver_delay = match channel.driver() {
            Some(d) => core.port_cell(d)?.delay,
            None => 0,
        };
        let readers = channel.readers.clone();
        let written = channel.buffer.written();
        for r in readers {
            let cursor = core.port(r)?.read_cursor;
            let unread: Vec<f64> = {
                let buf = &core.channel(ch)?.buffer;
                (cursor..written).filter_map(|i| buf.get(i)).collect()
            };
            let target = core.port_cell(r)?.delay + driver_delay;
            let port = core.port_mut(r)?;
            port.queue.extend(unread);
            port.read_cursor = written;
            resize_front(&mut port.queue, target as usize);
        }
        core.channel_mut(ch)?.buffer.drain_from(written);
    }
    for obj in objects {
        let object = core.object_mut(obj)?;
        for i in 0..object.ports.len() {
            if !object.ports[i].direction.is_host() {
                continue;
            }
            let delay = object.cells.get(object.ports[i].cell).map_or(0, |c| c.delay);
            resize_front(&mut object.ports[i].queue, delay as usize);
        }
    }
    Ok(())
}

// ── Rescheduling ──────────────────────────────────────────────────────────────

/// Re-run rate analysis and list scheduling for one cluster and adapt its
/// buffers.  Membership is unchanged.
pub(crate) fn reschedule(core: &mut SyncCore, cid: ClusterId) -> Result<(), SyncError> {
    timing::analyse_sample_rates(core, cid, true)?;
    schedule::generate_scheduling_list(core, cid)?;
    adjust_buffers(core, cid)?;

    let cluster = core.cluster_mut(cid)?;
    cluster.sync.rescheduled = true;
    cluster.sync.reschedule_pending = false;
    info!(
        cluster = cid.0,
        period = %cluster.period,
        elements = cluster.scheduling_list.len(),
        "cluster rescheduled"
    );
    Ok(())
}

