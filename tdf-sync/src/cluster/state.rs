/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Resumable execution of one cluster.
//!
//! A [`ClusterProcess`] is a persistent state plus a program cursor.  The
//! host calls [`ClusterProcess::resume`] whenever the last returned
//! [`WaitCondition`] holds; the process runs until it has to wait again.
//!
//! | State | Does | Next |
//! |---|---|---|
//! | `Initialization` | waits for requested first activations | `FirstStart` |
//! | `FirstStart` | start time, buffers, `initialize` | `PreScheduling` |
//! | `PreScheduling` | trace setup, checkpoints, cursor reset | `Scheduling` |
//! | `Scheduling` / `ContinueScheduling` | walks the program, suspends until actions are due | `PostScheduling` or `StaticPostScheduling` |
//! | `PostScheduling` | rescheduling, next start, reactivation events | `PreNextScheduling` |
//! | `StaticPostScheduling` | next start only | `StaticPreNextScheduling` |
//! | `PreNextScheduling` / `StaticPreNextScheduling` | validates the wake-up, rotates times, `reinitialize` | `PreScheduling` |
//! | `Halted` | a fatal error occurred; never runs again | |

use std::ops::Range;

use tracing::{debug, error, info, warn};

use crate::cluster::{self, AndListWatcher, WakePlan};
use crate::context::SyncCore;
use crate::error::{StepError, SyncError};
use crate::hooks::{Hooks, PassInfo};
use crate::host::{EventId, HostKernel, WaitCondition};
use crate::processing::ProcessingContext;
use crate::schedule::{HostAction, SchedElement};
use crate::sync::port::PortLink;
use crate::sync::{Callback, ClusterId, Method, ObjId, PortDirection, PortRef, SyncBehavior};
use crate::time::Time;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterState {
    Initialization,
    FirstStart,
    PreScheduling,
    Scheduling,
    ContinueScheduling,
    PostScheduling,
    StaticPostScheduling,
    PreNextScheduling,
    StaticPreNextScheduling,
    Halted,
}

/// Execution state of one cluster.
#[derive(Debug, Clone)]
pub struct ClusterProcess {
    cluster: ClusterId,
    state: ClusterState,
    /// Next action of the schedule program.
    cursor: usize,
}

// ── Callback dispatch ─────────────────────────────────────────────────────────

/// Run `f` on the behavior of `obj` with a fresh context.  Objects without a
/// behavior are skipped.
fn with_behavior<R>(
    core: &mut SyncCore,
    hooks: &mut Hooks,
    obj: ObjId,
    phase: Method,
    time: Time,
    f: impl FnOnce(&mut Box<dyn SyncBehavior>, &mut ProcessingContext<'_>) -> R,
) -> Option<R> {
    let mut behavior = hooks.take(obj)?;
    let result = {
        let mut ctx = ProcessingContext::new(core, obj, phase, time);
        f(&mut behavior, &mut ctx)
    };
    hooks.put_back(obj, behavior);
    Some(result)
}

/// Call an optional callback on `members`.  On the first call every member
/// is called once and the ones answering [`Callback::Handled`] are returned.
fn call_optional(
    core: &mut SyncCore,
    hooks: &mut Hooks,
    members: &[ObjId],
    phase: Method,
    time: Time,
) -> Result<Vec<ObjId>, SyncError> {
    let mut handled = Vec::new();
    for &obj in members {
        let outcome = with_behavior(core, hooks, obj, phase, time, |b, ctx| match phase {
            Method::ChangeAttributes => b.change_attributes(ctx),
            _ => b.reinitialize(ctx),
        });
        if let Some(Callback::Handled) = outcome.transpose()? {
            handled.push(obj);
        }
    }
    Ok(handled)
}

// ── Sample movement ───────────────────────────────────────────────────────────

fn underflow(core: &SyncCore, port: PortRef) -> SyncError {
    SyncError::BufferUnderflow {
        object: core.object_name(port.obj),
        port: core.port(port).map(|p| p.name.clone()).unwrap_or_default(),
    }
}

/// Drop channel samples every reader has consumed.
fn trim_channel(core: &mut SyncCore, ch: crate::sync::ChannelId) -> Result<(), SyncError> {
    let channel = core.channel(ch)?;
    let written = channel.buffer.written();
    let mut oldest = written;
    for &r in &channel.readers {
        oldest = oldest.min(core.port(r)?.read_cursor);
    }
    core.channel_mut(ch)?.buffer.discard_before(oldest);
    Ok(())
}

/// Move `rate` samples of every input port of `obj` into its staging area
/// and size the output staging areas.
fn stage_ports(core: &mut SyncCore, obj: ObjId) -> Result<(), SyncError> {
    let count = core.object(obj)?.ports.len();
    for index in 0..count {
        let port = PortRef { obj, index };
        let rate = core.port_cell(port)?.rate;
        let p = core.port_mut(port)?;
        p.staged.clear();
        if !p.direction.is_input() {
            p.staged.resize(rate as usize, 0.0);
            continue;
        }
        for _ in 0..rate {
            let p = core.port_mut(port)?;
            if let Some(v) = p.queue.pop_front() {
                p.staged.push(v);
                continue;
            }
            let (PortLink::Channel(ch), cursor) = (p.link, p.read_cursor) else {
                return Err(underflow(core, port));
            };
            let value = core
                .channel(ch)?
                .buffer
                .get(cursor)
                .ok_or_else(|| underflow(core, port))?;
            let p = core.port_mut(port)?;
            p.read_cursor += 1;
            p.staged.push(value);
        }
        if let Some(ch) = core.port(port)?.channel() {
            trim_channel(core, ch)?;
        }
    }
    Ok(())
}

/// Publish the staged output samples of `obj`.
fn commit_outputs(core: &mut SyncCore, obj: ObjId) -> Result<(), SyncError> {
    let count = core.object(obj)?.ports.len();
    for index in 0..count {
        let port = PortRef { obj, index };
        let p = core.port_mut(port)?;
        match (p.direction, p.link) {
            (PortDirection::ToPeer, PortLink::Channel(ch)) => {
                let staged = std::mem::take(&mut p.staged);
                let channel = core.channel_mut(ch)?;
                for v in staged {
                    channel.buffer.push(v);
                }
                trim_channel(core, ch)?;
            }
            (PortDirection::ToHost, _) => {
                let staged = std::mem::take(&mut p.staged);
                p.queue.extend(staged);
            }
            _ => p.staged.clear(),
        }
    }
    Ok(())
}

// ── ClusterProcess ────────────────────────────────────────────────────────────

impl ClusterProcess {
    pub fn new(cluster: ClusterId) -> Self {
        Self {
            cluster,
            state: ClusterState::Initialization,
            cursor: 0,
        }
    }

    pub fn cluster(&self) -> ClusterId {
        self.cluster
    }

    pub fn state(&self) -> ClusterState {
        self.state
    }

    pub(crate) fn reset(&mut self) {
        self.state = ClusterState::Initialization;
        self.cursor = 0;
    }

    fn enter(&mut self, next: ClusterState) {
        debug!(cluster = self.cluster.0, from = ?self.state, to = ?next, "cluster state");
        self.state = next;
    }

    /// Run the cluster until it has to wait.  A fatal error halts the
    /// process for good.
    pub fn resume(
        &mut self,
        core: &mut SyncCore,
        hooks: &mut Hooks,
        host: &mut dyn HostKernel,
    ) -> Result<WaitCondition, SyncError> {
        match self.step(core, hooks, host) {
            Ok(wait) => {
                debug!(
                    cluster = self.cluster.0,
                    state = ?self.state,
                    delay = ?wait.delay,
                    events = wait.events.len(),
                    "cluster suspended"
                );
                Ok(wait)
            }
            Err(err) => {
                self.state = ClusterState::Halted;
                Err(err)
            }
        }
    }

    fn step(
        &mut self,
        core: &mut SyncCore,
        hooks: &mut Hooks,
        host: &mut dyn HostKernel,
    ) -> Result<WaitCondition, SyncError> {
        loop {
            match self.state {
                ClusterState::Initialization => {
                    if let Some(wait) = self.initialization(core, host)? {
                        return Ok(wait);
                    }
                }
                ClusterState::FirstStart => self.first_start(core, hooks, host)?,
                ClusterState::PreScheduling => self.pre_scheduling(core, hooks, host)?,
                ClusterState::Scheduling | ClusterState::ContinueScheduling => {
                    if let Some(wait) = self.scheduling(core, hooks, host)? {
                        return Ok(wait);
                    }
                }
                ClusterState::PostScheduling => return self.post_scheduling(core, host, false),
                ClusterState::StaticPostScheduling => return self.post_scheduling(core, host, true),
                ClusterState::PreNextScheduling => {
                    if let Some(wait) = self.pre_next_scheduling(core, hooks, host, false)? {
                        return Ok(wait);
                    }
                }
                ClusterState::StaticPreNextScheduling => {
                    if let Some(wait) = self.pre_next_scheduling(core, hooks, host, true)? {
                        return Ok(wait);
                    }
                }
                ClusterState::Halted => return Ok(WaitCondition::default()),
            }
        }
    }

    // ── Initialization ────────────────────────────────────────────────────────

    fn initialization(
        &mut self,
        core: &SyncCore,
        host: &dyn HostKernel,
    ) -> Result<Option<WaitCondition>, SyncError> {
        let mut at: Option<Time> = None;
        let mut events: Vec<EventId> = Vec::new();
        for &obj in &core.cluster(self.cluster)?.objects {
            let first = core.object(obj)?.first_activation();
            if let Some(t) = first.at {
                at = Some(at.map_or(t, |a| a.min(t)));
            }
            events.extend(first.events.iter().copied());
        }
        events.sort();
        events.dedup();

        let now = host.time();
        let due = (at.is_none() && events.is_empty())
            || at.is_some_and(|t| t <= now)
            || events.iter().any(|&e| host.triggered(e));
        if due {
            self.enter(ClusterState::FirstStart);
            return Ok(None);
        }
        let delay = at.map(|t| t.saturating_sub(now));
        Ok(Some(WaitCondition::after_or_on(delay, events)))
    }

    fn first_start(
        &mut self,
        core: &mut SyncCore,
        hooks: &mut Hooks,
        host: &dyn HostKernel,
    ) -> Result<(), SyncError> {
        let now = host.time();
        let members = core.cluster(self.cluster)?.objects.clone();

        let c = core.cluster_mut(self.cluster)?;
        let period = c.period;
        let sync = &mut c.sync;
        sync.start = now;
        sync.last_start = now;
        sync.end = now.saturating_add(period);
        sync.expected_start = now;

        cluster::init_buffers(core, self.cluster)?;
        for &obj in &members {
            with_behavior(core, hooks, obj, Method::Initialize, now, |b, ctx| b.initialize(ctx))
                .transpose()?;
        }
        info!(cluster = self.cluster.0, start = %now, period = %period, "cluster started");
        self.enter(ClusterState::PreScheduling);
        Ok(())
    }

    // ── One pass ──────────────────────────────────────────────────────────────

    fn pre_scheduling(
        &mut self,
        core: &mut SyncCore,
        hooks: &mut Hooks,
        host: &mut dyn HostKernel,
    ) -> Result<(), SyncError> {
        let c = core.cluster_mut(self.cluster)?;
        if !c.sync.trace_initialized {
            c.sync.trace_initialized = true;
            host.trace_init(self.cluster);
        }
        let repeat = !c.sync.first_pass && c.sync.current_timestep.is_zero();
        let members = c.objects.clone();

        for &obj in &members {
            let o = core.object_mut(obj)?;
            o.calls_in_period = 0;
            if !o.kind.is_network() {
                continue;
            }
            if let Some(b) = hooks.behaviors.get_mut(obj.0).and_then(Option::as_mut) {
                if repeat {
                    b.restore_checkpoint();
                } else {
                    b.store_checkpoint();
                }
            }
        }
        self.cursor = 0;
        self.enter(ClusterState::Scheduling);
        Ok(())
    }

    fn scheduling(
        &mut self,
        core: &mut SyncCore,
        hooks: &mut Hooks,
        host: &mut dyn HostKernel,
    ) -> Result<Option<WaitCondition>, SyncError> {
        loop {
            let c = core.cluster(self.cluster)?;
            let Some(timed) = c.program.get(self.cursor).cloned() else {
                break;
            };
            let due = c.real_time(timed.scaled_time);
            let now = host.time();
            if due > now {
                self.enter(ClusterState::ContinueScheduling);
                return Ok(Some(WaitCondition::after(due.saturating_sub(now))));
            }

            match timed.action {
                HostAction::ReadHost(port) => {
                    let Some(signal) = core.port(port)?.signal() else {
                        return Err(underflow(core, port));
                    };
                    let value = host.read_signal(signal);
                    core.port_mut(port)?.queue.push_back(value);
                }
                HostAction::Schedule(range) => self.run_slice(core, hooks, range)?,
                HostAction::WriteHost(port) => {
                    let p = core.port_mut(port)?;
                    let (Some(signal), Some(value)) = (p.signal(), p.queue.pop_front()) else {
                        return Err(underflow(core, port));
                    };
                    host.write_signal(signal, value);
                }
            }
            self.cursor += 1;
        }

        self.end_of_program(core, hooks, host.time())?;
        Ok(None)
    }

    fn run_slice(
        &mut self,
        core: &mut SyncCore,
        hooks: &mut Hooks,
        range: Range<usize>,
    ) -> Result<(), SyncError> {
        let elements: Vec<SchedElement> = core
            .cluster(self.cluster)?
            .scheduling_list
            .get(range)
            .map(<[SchedElement]>::to_vec)
            .unwrap_or_default();
        for element in &elements {
            self.run_element(core, hooks, element)?;
        }
        Ok(())
    }

    fn run_element(
        &mut self,
        core: &mut SyncCore,
        hooks: &mut Hooks,
        element: &SchedElement,
    ) -> Result<(), SyncError> {
        core.exec_id += 1;
        let exec_id = core.exec_id;
        let call_time = core.cluster(self.cluster)?.real_time(element.scaled_time);
        let obj = element.obj;
        {
            let o = core.object_mut(obj)?;
            o.last_exec_id = exec_id;
            o.call_counter += 1;
            o.calls_in_period += 1;
        }

        stage_ports(core, obj)?;
        let outcome = with_behavior(core, hooks, obj, Method::Processing, call_time, |b, ctx| {
            b.processing(ctx)
        });
        match outcome {
            Some(Err(StepError::Warning(w))) => {
                warn!(object = %core.object_name(obj), time = %call_time, "{w}");
            }
            Some(Err(StepError::Fatal(err))) => {
                error!(object = %core.object_name(obj), time = %call_time, "{err}");
                return Err(err);
            }
            _ => {}
        }
        commit_outputs(core, obj)
    }

    fn end_of_program(
        &mut self,
        core: &mut SyncCore,
        hooks: &mut Hooks,
        now: Time,
    ) -> Result<(), SyncError> {
        let cid = self.cluster;
        let c = core.cluster_mut(cid)?;
        let records = std::mem::take(&mut c.sync.pending_traces);
        c.sync.passes += 1;
        c.sync.first_pass = false;
        let (start, period, pass) = (c.sync.start, c.period, c.sync.passes);
        let definitely_static = c.sync.definitely_static;
        let members = c.objects.clone();

        hooks.flush_traces(&records);
        hooks.run_pass_traces(&members, |obj| PassInfo {
            cluster: cid,
            object: core.object_name(obj),
            start,
            period,
            pass,
        });

        if definitely_static {
            core.cluster_mut(cid)?.sync.static_passes += 1;
            self.enter(ClusterState::StaticPostScheduling);
            return Ok(());
        }

        let cached = core.cluster(cid)?.sync.change_attribute_callers.clone();
        match cached {
            Some(callers) => {
                call_optional(core, hooks, &callers, Method::ChangeAttributes, now)?;
            }
            None => {
                let callers = call_optional(core, hooks, &members, Method::ChangeAttributes, now)?;
                let sync = &mut core.cluster_mut(cid)?.sync;
                if callers.is_empty() {
                    sync.definitely_static = true;
                    info!(cluster = cid.0, "cluster classified definitely static");
                }
                sync.change_attribute_callers = Some(callers);
            }
        }
        self.enter(ClusterState::PostScheduling);
        Ok(())
    }

    // ── Between passes ────────────────────────────────────────────────────────

    fn post_scheduling(
        &mut self,
        core: &mut SyncCore,
        host: &dyn HostKernel,
        static_path: bool,
    ) -> Result<WaitCondition, SyncError> {
        let cid = self.cluster;
        let now = host.time();

        if !static_path {
            let sync = &mut core.cluster_mut(cid)?.sync;
            sync.change_attribute_checks += 1;
            let changes = std::mem::take(&mut sync.changes);
            let changed_by = sync.changed_by.take();
            if changes.any() {
                if let Some(obj) = changed_by {
                    info!(
                        cluster = cid.0,
                        object = %core.object_name(obj),
                        rate = changes.rate,
                        delay = changes.delay,
                        timestep = changes.timestep,
                        "attributes changed"
                    );
                }
                cluster::reschedule(core, cid)?;
                core.cluster_mut(cid)?.sync.applied = changes;
            } else {
                let sync = &mut core.cluster_mut(cid)?.sync;
                sync.applied = Default::default();
                sync.rescheduled = false;
            }
        }

        let c = core.cluster_mut(cid)?;
        let (period, max_period) = (c.period, c.max_period);
        let sync = &mut c.sync;
        let requests = std::mem::take(&mut sync.requests);
        let nominal = sync.start.saturating_add(period);

        let bounds = [
            requests.at,
            requests.max_start,
            max_period.filter(|_| !static_path).map(|m| sync.start.saturating_add(m)),
        ];
        let at = bounds
            .into_iter()
            .flatten()
            .fold(nominal, Time::min)
            .max(now);

        let plan = if static_path {
            WakePlan {
                at: Some(at),
                ..Default::default()
            }
        } else {
            sync.watchers.retain(|list, _| requests.and_lists.contains(list));
            for list in &requests.and_lists {
                sync.watchers
                    .entry(list.clone())
                    .or_insert_with(|| AndListWatcher::new(list.clone()));
            }
            WakePlan {
                at: Some(at),
                events: requests.events,
                and_lists: requests.and_lists,
            }
        };
        sync.expected_start = nominal;
        let wait = wait_for(&plan, &sync.watchers, now);
        sync.wake = Some(plan);

        self.enter(if static_path {
            ClusterState::StaticPreNextScheduling
        } else {
            ClusterState::PreNextScheduling
        });
        Ok(wait)
    }

    fn pre_next_scheduling(
        &mut self,
        core: &mut SyncCore,
        hooks: &mut Hooks,
        host: &dyn HostKernel,
        static_path: bool,
    ) -> Result<Option<WaitCondition>, SyncError> {
        let cid = self.cluster;
        let now = host.time();
        let c = core.cluster_mut(cid)?;
        let plan = c.sync.wake.clone().unwrap_or_default();

        let mut completed = false;
        for list in &plan.and_lists {
            if let Some(w) = c.sync.watchers.get_mut(list) {
                completed |= w.observe(host);
            }
        }
        let due = plan.at.is_some_and(|t| t <= now)
            || plan.events.iter().any(|&e| host.triggered(e))
            || completed;
        if !due {
            debug!(cluster = cid.0, time = %now, "early wake-up ignored");
            return Ok(Some(wait_for(&plan, &c.sync.watchers, now)));
        }

        // ── Rotate period bookkeeping ────────────────────────────────────────
        let period = c.period;
        let sync = &mut c.sync;
        sync.wake = None;
        sync.last_start = sync.start;
        sync.last_end = sync.end;
        sync.start = now;
        sync.last_timestep = sync.current_timestep;
        sync.current_timestep = now.saturating_sub(sync.last_start);
        sync.last_period = period;
        if now != sync.expected_start {
            sync.applied.timestep = true;
        }
        let pending = sync.reschedule_pending;

        if pending {
            cluster::reschedule(core, cid)?;
            core.cluster_mut(cid)?.sync.applied.timestep = true;
        }
        let c = core.cluster_mut(cid)?;
        c.sync.end = now.saturating_add(c.period);

        let members = c.objects.clone();
        let cached = c.sync.reinitialize_callers.clone();
        match cached {
            Some(callers) => {
                call_optional(core, hooks, &callers, Method::Reinitialize, now)?;
            }
            None => {
                let callers = call_optional(core, hooks, &members, Method::Reinitialize, now)?;
                core.cluster_mut(cid)?.sync.reinitialize_callers = Some(callers);
            }
        }

        if static_path {
            debug!(cluster = cid.0, start = %now, "static period");
        }
        self.enter(ClusterState::PreScheduling);
        Ok(None)
    }
}

/// Wait condition for a wake plan: its time, its events and every event an
/// and-list watcher still needs.
fn wait_for(
    plan: &WakePlan,
    watchers: &std::collections::HashMap<Vec<EventId>, AndListWatcher>,
    now: Time,
) -> WaitCondition {
    let mut events = plan.events.clone();
    for list in &plan.and_lists {
        if let Some(w) = watchers.get(list) {
            events.extend(w.outstanding());
        }
    }
    events.sort();
    events.dedup();
    WaitCondition::after_or_on(plan.at.map(|t| t.saturating_sub(now)), events)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
