/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Top-level simulation session.
//!
//! A [`Session`] owns the [`SyncCore`], the solver behaviors and one
//! [`ClusterProcess`] per cluster.  Its lifecycle is:
//!
//! 1. build: [`add_object`](Session::add_object), [`add_channel`](Session::add_channel),
//!    [`add_port`](Session::add_port), object attributes through
//!    [`object_mut`](Session::object_mut);
//! 2. [`elaborate`](Session::elaborate): graph check, clustering, rate
//!    analysis and list scheduling of every cluster;
//! 3. run: the host calls [`resume`](Session::resume) per cluster, or
//!    [`run_until`](Session::run_until) drives everything on a [`LocalKernel`];
//! 4. [`terminate`](Session::terminate) or [`reset`](Session::reset).

use tracing::{info, warn};

use crate::cluster::{ClusterProcess, ClusterState, ClusterSyncData};
use crate::config::SyncConfig;
use crate::context::SyncCore;
use crate::error::SyncError;
use crate::graph;
use crate::hooks::{Hooks, PassInfo, TraceRecord};
use crate::host::{HostKernel, LocalKernel, RunSummary, WaitCondition};
use crate::schedule::{self, ScheduleReport};
use crate::sync::{ChannelId, ClusterId, ObjId, PortRef, PortSpec, SolverKind, SyncBehavior, SyncObject};
use crate::time::Time;
use crate::timing;

pub struct Session {
    core: SyncCore,
    hooks: Hooks,
    processes: Vec<ClusterProcess>,
    elaborated: bool,
    terminated: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SyncConfig::default())
    }
}

impl Session {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            core: SyncCore::new(config),
            hooks: Hooks::default(),
            processes: Vec::new(),
            elaborated: false,
            terminated: false,
        }
    }

    pub fn core(&self) -> &SyncCore {
        &self.core
    }

    pub fn config(&self) -> &SyncConfig {
        self.core.config()
    }

    pub fn is_elaborated(&self) -> bool {
        self.elaborated
    }

    // ── Building ──────────────────────────────────────────────────────────────

    /// Create an object and register it for scheduling.
    pub fn add_object(
        &mut self,
        name: &str,
        kind: SolverKind,
        behavior: Box<dyn SyncBehavior>,
    ) -> Result<ObjId, SyncError> {
        let obj = self.create_object(name, kind, behavior);
        self.register(obj)?;
        Ok(obj)
    }

    /// Create an object without registering it.  An unregistered object
    /// connected to a registered one fails elaboration.
    pub fn create_object(&mut self, name: &str, kind: SolverKind, behavior: Box<dyn SyncBehavior>) -> ObjId {
        let obj = self.core.insert_object(name, kind);
        self.hooks.set_behavior(obj, behavior);
        obj
    }

    pub fn register(&mut self, obj: ObjId) -> Result<(), SyncError> {
        self.core.register(obj)
    }

    pub fn add_channel(&mut self, name: &str) -> ChannelId {
        self.core.add_channel(name)
    }

    pub fn add_port(&mut self, obj: ObjId, spec: PortSpec) -> Result<PortRef, SyncError> {
        self.core.add_port(obj, spec)
    }

    /// Mutable access to an object's elaboration-time attributes.
    pub fn object_mut(&mut self, obj: ObjId) -> Result<&mut SyncObject, SyncError> {
        self.core.object_mut(obj)
    }

    /// Call `trace` after every complete pass of the cluster holding `obj`.
    pub fn register_pass_trace(&mut self, obj: ObjId, trace: impl FnMut(&PassInfo) + 'static) {
        self.hooks.pass_traces.push((obj, Box::new(trace)));
    }

    /// Receive every value solvers emit through `ProcessingContext::trace`.
    pub fn register_trace_sink(&mut self, sink: impl FnMut(&TraceRecord) + 'static) {
        self.hooks.trace_sinks.push(Box::new(sink));
    }

    // ── Elaboration ───────────────────────────────────────────────────────────

    /// Cluster the registered objects and compute every cluster's timing and
    /// schedule.  Runs once; later calls are no-ops.
    pub fn elaborate(&mut self) -> Result<(), SyncError> {
        if self.elaborated {
            return Ok(());
        }
        graph::check_closed_graph(&self.core)?;
        graph::cluster(&mut self.core)?;
        for c in 0..self.core.clusters.len() {
            let cid = ClusterId(c);
            timing::analyse_sample_rates(&mut self.core, cid, false)?;
            schedule::generate_scheduling_list(&mut self.core, cid)?;
        }
        self.processes = (0..self.core.clusters.len())
            .map(|c| ClusterProcess::new(ClusterId(c)))
            .collect();
        self.elaborated = true;
        info!(
            objects = self.core.registered.len(),
            clusters = self.processes.len(),
            "elaboration finished"
        );
        Ok(())
    }

    // ── Running ───────────────────────────────────────────────────────────────

    pub fn cluster_count(&self) -> usize {
        self.processes.len()
    }

    pub fn cluster_of(&self, obj: ObjId) -> Option<ClusterId> {
        self.core.object(obj).ok().and_then(|o| o.cluster())
    }

    pub fn cluster_state(&self, cid: ClusterId) -> Option<ClusterState> {
        self.processes.get(cid.0).map(ClusterProcess::state)
    }

    /// Resume cluster `cid`; returns the condition to wait for before the
    /// next call.
    pub fn resume(&mut self, cid: ClusterId, host: &mut dyn HostKernel) -> Result<WaitCondition, SyncError> {
        if !self.elaborated {
            return Err(SyncError::NotElaborated);
        }
        let process = self
            .processes
            .get_mut(cid.0)
            .ok_or(SyncError::UnknownHandle {
                what: "cluster",
                index: cid.0,
            })?;
        process.resume(&mut self.core, &mut self.hooks, host)
    }

    /// Elaborate if needed and run every cluster on `kernel` up to `end`.
    pub fn run_until(&mut self, kernel: &mut LocalKernel, end: Time) -> Result<RunSummary, SyncError> {
        self.elaborate()?;
        kernel.run(self, end)
    }

    pub fn report(&self, cid: ClusterId) -> Result<ScheduleReport, SyncError> {
        ScheduleReport::from_core(&self.core, cid)
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Call `terminate` on every behavior.  Runs once.
    pub fn terminate(&mut self) {
        if self.terminated {
            warn!("session already terminated");
            return;
        }
        for behavior in self.hooks.behaviors_mut() {
            behavior.terminate();
        }
        self.terminated = true;
        info!("session terminated");
    }

    /// Call `reset` on every behavior and return every cluster to its
    /// initial state.  Timing and schedules are kept.
    pub fn reset(&mut self) {
        for behavior in self.hooks.behaviors_mut() {
            behavior.reset();
        }
        for process in self.processes.iter_mut() {
            process.reset();
        }
        for cluster in self.core.clusters.iter_mut() {
            cluster.sync = ClusterSyncData {
                first_pass: true,
                ..Default::default()
            };
        }
        for obj in self.core.objects.iter_mut() {
            obj.call_counter = 0;
            obj.calls_in_period = 0;
        }
        self.terminated = false;
        info!(clusters = self.processes.len(), "session reset");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
