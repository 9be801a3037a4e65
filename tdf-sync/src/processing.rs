/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The view a solver gets of the scheduler while one of its callbacks runs.
//!
//! | Operation | Legal in |
//! |---|---|
//! | `read`, `write` | `processing` |
//! | `initialize_delay` | `initialize` |
//! | `set_rate`, `set_delay`, `set_timestep`, `set_port_timestep`, `set_max_timestep`, `request_next_activation*` | `change_attributes`, object must declare `does_attribute_changes` |
//! | `request_max_start_time`, `request_max_period`, `request_fixed_period` | `processing`, `change_attributes` |
//! | queries, `trace` | everywhere |

use tracing::{debug, error};

use crate::context::SyncCore;
use crate::error::SyncError;
use crate::hooks::TraceRecord;
use crate::host::EventId;
use crate::cluster::{ClusterSyncData, PeriodRequest};
use crate::sync::object::OBJECT_CELL;
use crate::sync::port::{AttributeCell, CellId, PortDirection};
use crate::sync::{ClusterId, Method, ObjId, SyncObject};
use crate::time::Time;

pub struct ProcessingContext<'a> {
    core: &'a mut SyncCore,
    obj: ObjId,
    phase: Method,
    call_time: Time,
}

impl<'a> ProcessingContext<'a> {
    pub(crate) fn new(core: &'a mut SyncCore, obj: ObjId, phase: Method, call_time: Time) -> Self {
        Self {
            core,
            obj,
            phase,
            call_time,
        }
    }

    fn object(&self) -> &SyncObject {
        // The state machine only builds contexts for existing objects.
        &self.core.objects[self.obj.0]
    }

    fn object_mut(&mut self) -> &mut SyncObject {
        &mut self.core.objects[self.obj.0]
    }

    fn sync(&self) -> Option<&ClusterSyncData> {
        let cid = self.object().cluster?;
        self.core.clusters.get(cid.0).map(|c| &c.sync)
    }

    fn sync_mut(&mut self) -> Option<&mut ClusterSyncData> {
        let cid = self.object().cluster?;
        self.core.clusters.get_mut(cid.0).map(|c| &mut c.sync)
    }

    fn port_cell_id(&self, port: usize) -> Result<CellId, SyncError> {
        self.object()
            .ports
            .get(port)
            .map(|p| p.cell)
            .ok_or_else(|| SyncError::PortIndexOutOfRange {
                object: self.object().name.clone(),
                index: port,
            })
    }

    fn port_cell(&self, port: usize) -> Result<&AttributeCell, SyncError> {
        let id = self.port_cell_id(port)?;
        self.object()
            .cells
            .get(id)
            .ok_or_else(|| SyncError::PortIndexOutOfRange {
                object: self.object().name.clone(),
                index: port,
            })
    }

    // ── Identity ──────────────────────────────────────────────────────────────

    pub fn phase(&self) -> Method {
        self.phase
    }

    pub fn object_id(&self) -> ObjId {
        self.obj
    }

    pub fn object_name(&self) -> &str {
        &self.object().name
    }

    pub fn cluster_id(&self) -> Option<ClusterId> {
        self.object().cluster
    }

    pub fn port_count(&self) -> usize {
        self.object().ports.len()
    }

    pub fn port_index(&self, name: &str) -> Option<usize> {
        self.object().ports.iter().position(|p| p.name == name)
    }

    pub fn input_ports(&self) -> Vec<usize> {
        self.ports_where(|d| d.is_input())
    }

    pub fn output_ports(&self) -> Vec<usize> {
        self.ports_where(|d| !d.is_input())
    }

    fn ports_where(&self, pred: impl Fn(PortDirection) -> bool) -> Vec<usize> {
        self.object()
            .ports
            .iter()
            .enumerate()
            .filter(|(_, p)| pred(p.direction))
            .map(|(i, _)| i)
            .collect()
    }

    // ── Time queries ──────────────────────────────────────────────────────────

    /// Nominal time of the running call.
    pub fn time(&self) -> Time {
        self.call_time
    }

    /// Interval between two calls of this object.
    pub fn timestep(&self) -> Time {
        self.object().timestep()
    }

    /// Interval between two samples of `port`.
    pub fn port_timestep(&self, port: usize) -> Result<Time, SyncError> {
        Ok(self.port_cell(port)?.assigned)
    }

    pub fn cluster_period(&self) -> Time {
        self.object()
            .cluster
            .and_then(|c| self.core.clusters.get(c.0))
            .map_or(Time::ZERO, |c| c.period)
    }

    pub fn last_period(&self) -> Time {
        self.sync().map_or(Time::ZERO, |s| s.last_period)
    }

    /// Time elapsed between the last two cluster starts.
    pub fn cluster_timestep(&self) -> Time {
        self.sync().map_or(Time::ZERO, |s| s.current_timestep)
    }

    pub fn last_timestep(&self) -> Time {
        self.sync().map_or(Time::ZERO, |s| s.last_timestep)
    }

    pub fn cluster_start(&self) -> Time {
        self.sync().map_or(Time::ZERO, |s| s.start)
    }

    pub fn calls_per_period(&self) -> u64 {
        self.object().calls_per_period
    }

    pub fn call_counter(&self) -> u64 {
        self.object().call_counter
    }

    pub fn execution_id(&self) -> u64 {
        self.core.exec_id
    }

    pub fn rate(&self, port: usize) -> Result<u64, SyncError> {
        Ok(self.port_cell(port)?.rate)
    }

    pub fn delay(&self, port: usize) -> Result<u64, SyncError> {
        Ok(self.port_cell(port)?.delay)
    }

    pub fn is_timestep_changed(&self) -> bool {
        self.sync().is_some_and(|s| s.applied.timestep)
    }

    pub fn is_rate_changed(&self) -> bool {
        self.sync().is_some_and(|s| s.applied.rate)
    }

    pub fn is_delay_changed(&self) -> bool {
        self.sync().is_some_and(|s| s.applied.delay)
    }

    pub fn is_rescheduled(&self) -> bool {
        self.sync().is_some_and(|s| s.rescheduled)
    }

    // ── Sample access ─────────────────────────────────────────────────────────

    fn sample_error(&self, port: usize, sample: u64) -> SyncError {
        let object = self.object();
        let name = object.ports.get(port).map(|p| p.name.clone()).unwrap_or_default();
        let rate = object
            .ports
            .get(port)
            .and_then(|p| object.cells.get(p.cell))
            .map_or(0, |c| c.rate);
        SyncError::SampleIndexOutOfRange {
            object: object.name.clone(),
            port: name,
            sample,
            rate,
        }
    }

    fn check_processing(&self, port: usize) -> Result<(), SyncError> {
        let object = self.object();
        let Some(p) = object.ports.get(port) else {
            return Err(SyncError::PortIndexOutOfRange {
                object: object.name.clone(),
                index: port,
            });
        };
        if self.phase != Method::Processing {
            return Err(SyncError::PortAccessOutsideProcessing {
                object: object.name.clone(),
                port: p.name.clone(),
            });
        }
        Ok(())
    }

    /// Sample `sample` (`0..rate`) of input port `port` for this call.
    pub fn read(&self, port: usize, sample: u64) -> Result<f64, SyncError> {
        self.check_processing(port)?;
        let p = &self.object().ports[port];
        if !p.direction.is_input() {
            return Err(self.sample_error(port, sample));
        }
        usize::try_from(sample)
            .ok()
            .and_then(|s| p.staged.get(s))
            .copied()
            .ok_or_else(|| self.sample_error(port, sample))
    }

    /// Set sample `sample` (`0..rate`) of output port `port` for this call.
    pub fn write(&mut self, port: usize, sample: u64, value: f64) -> Result<(), SyncError> {
        self.check_processing(port)?;
        let err = self.sample_error(port, sample);
        let p = &mut self.object_mut().ports[port];
        if p.direction.is_input() {
            return Err(err);
        }
        let slot = usize::try_from(sample)
            .ok()
            .and_then(|s| p.staged.get_mut(s))
            .ok_or(err)?;
        *slot = value;
        Ok(())
    }

    /// Set the value of delay sample `sample` (`0..delay`) of `port`.
    pub fn initialize_delay(&mut self, port: usize, sample: u64, value: f64) -> Result<(), SyncError> {
        let delay = self.port_cell(port)?.delay;
        if self.phase != Method::Initialize {
            return Err(SyncError::InvalidAttribute {
                object: self.object().name.clone(),
                reason: "delay values can only be set in initialize".into(),
            });
        }
        if sample >= delay {
            return Err(SyncError::SampleIndexOutOfRange {
                object: self.object().name.clone(),
                port: self.object().ports[port].name.clone(),
                sample,
                rate: delay,
            });
        }
        let p = &self.object().ports[port];
        match (p.direction, p.channel()) {
            (PortDirection::ToPeer, Some(ch)) => {
                self.core.channel_mut(ch)?.buffer.set(sample, value);
            }
            _ => {
                if let Some(slot) = self.object_mut().ports[port].queue.get_mut(sample as usize) {
                    *slot = value;
                }
            }
        }
        Ok(())
    }

    /// Emit a named trace value at the time of the running call.
    pub fn trace(&mut self, name: &str, value: f64) {
        let Some(cluster) = self.object().cluster else {
            return;
        };
        let record = TraceRecord {
            cluster,
            object: self.object().name.clone(),
            name: name.to_string(),
            time: self.call_time,
            value,
        };
        if let Some(sync) = self.sync_mut() {
            sync.pending_traces.push(record);
        }
    }

    // ── Attribute changes ─────────────────────────────────────────────────────

    fn check_change(&self, operation: &str) -> Result<(), SyncError> {
        let object = self.object();
        if self.phase != Method::ChangeAttributes {
            return Err(SyncError::OutsideChangeAttributes {
                object: object.name.clone(),
                operation: operation.to_string(),
            });
        }
        if !object.does_attribute_changes {
            return Err(SyncError::AttributeChangeNotAllowed {
                object: object.name.clone(),
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    /// Every other member of the cluster must accept attribute changes.
    fn check_accepted(&self) -> Result<(), SyncError> {
        let Some(cid) = self.object().cluster else {
            return Ok(());
        };
        let Some(cluster) = self.core.clusters.get(cid.0) else {
            return Ok(());
        };
        for &member in &cluster.objects {
            if member == self.obj {
                continue;
            }
            let m = &self.core.objects[member.0];
            if !m.accepts_attribute_changes {
                let err = SyncError::AttributeChangeNotAccepted {
                    object: m.name.clone(),
                    changed_by: self.object().name.clone(),
                };
                error!(cluster = cid.0, "{err}");
                return Err(err);
            }
        }
        Ok(())
    }

    fn mark_changed(&mut self, cell: CellId, rate: bool, delay: bool, timestep: bool) {
        let exec_id = self.core.exec_id;
        let obj = self.obj;
        if let Some(c) = self.object_mut().cells.get_mut(cell) {
            c.change_id = exec_id;
        }
        if let Some(sync) = self.sync_mut() {
            sync.changes.rate |= rate;
            sync.changes.delay |= delay;
            sync.changes.timestep |= timestep;
            sync.changed_by.get_or_insert(obj);
        }
    }

    pub fn set_rate(&mut self, port: usize, rate: u64) -> Result<(), SyncError> {
        self.check_change("set_rate")?;
        let cell = self.port_cell_id(port)?;
        if rate == 0 {
            return Err(SyncError::InvalidAttribute {
                object: self.object().name.clone(),
                reason: format!("rate of port {port} must be at least 1"),
            });
        }
        if self.port_cell(port)?.rate == rate {
            return Ok(());
        }
        self.check_accepted()?;
        if let Some(c) = self.object_mut().cells.get_mut(cell) {
            c.rate = rate;
        }
        self.mark_changed(cell, true, false, false);
        debug!(object = %self.object().name, port, rate, "rate changed");
        Ok(())
    }

    pub fn set_delay(&mut self, port: usize, delay: u64) -> Result<(), SyncError> {
        self.check_change("set_delay")?;
        let cell = self.port_cell_id(port)?;
        if self.port_cell(port)?.delay == delay {
            return Ok(());
        }
        self.check_accepted()?;
        if let Some(c) = self.object_mut().cells.get_mut(cell) {
            c.delay = delay;
        }
        self.mark_changed(cell, false, true, false);
        debug!(object = %self.object().name, port, delay, "delay changed");
        Ok(())
    }

    fn set_cell_timestep(&mut self, cell: CellId, timestep: Time, operation: &str) -> Result<(), SyncError> {
        self.check_change(operation)?;
        if timestep.is_zero() {
            return Err(SyncError::InvalidAttribute {
                object: self.object().name.clone(),
                reason: format!("{operation} needs a non-zero timestep"),
            });
        }
        self.check_accepted()?;
        if let Some(c) = self.object_mut().cells.get_mut(cell) {
            c.timestep = Some(timestep);
        }
        self.mark_changed(cell, false, false, true);
        debug!(object = %self.object().name, timestep = %timestep, "timestep changed");
        Ok(())
    }

    /// New interval between two calls of this object.
    pub fn set_timestep(&mut self, timestep: Time) -> Result<(), SyncError> {
        self.set_cell_timestep(OBJECT_CELL, timestep, "set_timestep")
    }

    /// New interval between two samples of `port`.
    pub fn set_port_timestep(&mut self, port: usize, timestep: Time) -> Result<(), SyncError> {
        let cell = self.port_cell_id(port)?;
        self.set_cell_timestep(cell, timestep, "set_port_timestep")
    }

    pub fn set_max_timestep(&mut self, timestep: Time) -> Result<(), SyncError> {
        self.check_change("set_max_timestep")?;
        if timestep.is_zero() {
            return Err(SyncError::InvalidAttribute {
                object: self.object().name.clone(),
                reason: "set_max_timestep needs a non-zero timestep".into(),
            });
        }
        self.check_accepted()?;
        self.object_mut().max_timestep = Some(timestep);
        self.mark_changed(OBJECT_CELL, false, false, true);
        Ok(())
    }

    // ── Reactivation ──────────────────────────────────────────────────────────

    /// Start the next period at `at` at the latest.  Must lie after the
    /// start of the running period.
    pub fn request_next_activation(&mut self, at: Time) -> Result<(), SyncError> {
        self.check_change("request_next_activation")?;
        let start = self.cluster_start();
        if at <= start {
            return Err(SyncError::InvalidAttribute {
                object: self.object().name.clone(),
                reason: format!(
                    "requested activation at {at} is not after the current start {start}"
                ),
            });
        }
        if let Some(sync) = self.sync_mut() {
            sync.requests.request_at(at);
        }
        Ok(())
    }

    pub fn request_next_activation_on(&mut self, event: EventId) -> Result<(), SyncError> {
        self.request_next_activation_on_any(&[event])
    }

    /// Start the next period when any of `events` fires.
    pub fn request_next_activation_on_any(&mut self, events: &[EventId]) -> Result<(), SyncError> {
        self.check_change("request_next_activation_on_any")?;
        if let Some(sync) = self.sync_mut() {
            for &e in events {
                sync.requests.request_event(e);
            }
        }
        Ok(())
    }

    /// Start the next period once all of `events` fired.
    pub fn request_next_activation_on_all(&mut self, events: &[EventId]) -> Result<(), SyncError> {
        self.check_change("request_next_activation_on_all")?;
        if let Some(sync) = self.sync_mut() {
            sync.requests.request_and_list(events.to_vec());
        }
        Ok(())
    }

    // ── Cluster-level requests ────────────────────────────────────────────────

    fn check_request(&self, operation: &str, value: Time) -> Result<u64, SyncError> {
        let object = self.object();
        if !matches!(self.phase, Method::Processing | Method::ChangeAttributes) {
            return Err(SyncError::InvalidAttribute {
                object: object.name.clone(),
                reason: format!("{operation} is only allowed in processing or change_attributes"),
            });
        }
        if value.is_zero() {
            return Err(SyncError::InvalidAttribute {
                object: object.name.clone(),
                reason: format!("{operation} needs a non-zero time"),
            });
        }
        Ok(object.calls_per_period.saturating_sub(object.calls_in_period))
    }

    /// Bound the start of the next period.  Returns the calls of this object
    /// left in the running period.
    pub fn request_max_start_time(&mut self, at: Time) -> Result<u64, SyncError> {
        let remaining = self.check_request("request_max_start_time", at)?;
        if let Some(sync) = self.sync_mut() {
            sync.requests.request_max_start(at);
        }
        Ok(remaining)
    }

    /// Bound the cluster period from the next period on.
    pub fn request_max_period(&mut self, period: Time) -> Result<u64, SyncError> {
        let remaining = self.check_request("request_max_period", period)?;
        let by = self.obj;
        if let Some(sync) = self.sync_mut() {
            sync.requested_max_period = Some(PeriodRequest { period, by });
            sync.reschedule_pending = true;
        }
        Ok(remaining)
    }

    /// Fix the cluster period from the next period on.
    pub fn request_fixed_period(&mut self, period: Time) -> Result<u64, SyncError> {
        let remaining = self.check_request("request_fixed_period", period)?;
        let by = self.obj;
        if let Some(sync) = self.sync_mut() {
            sync.requested_fixed_period = Some(PeriodRequest { period, by });
            sync.reschedule_pending = true;
        }
        Ok(remaining)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::Cluster;
    use crate::host::SignalId;
    use crate::sync::{PortRef, PortSpec, SolverKind};

    /// One object with an input and an output host port, in cluster 0.
    fn core_with_object() -> (SyncCore, ObjId) {
        let mut core = SyncCore::default();
        let obj = core.insert_object("top.m", SolverKind::SignalFlow);
        core.add_port(obj, PortSpec::from_host("in", SignalId(0)).rate(2))
            .unwrap();
        core.add_port(obj, PortSpec::to_host("out", SignalId(1)).delay(1))
            .unwrap();
        let mut cluster = Cluster::new(ClusterId(0));
        cluster.objects.push(obj);
        cluster.period = Time::from_ticks(20);
        core.clusters.push(cluster);
        let o = core.object_mut(obj).unwrap();
        o.cluster = Some(ClusterId(0));
        o.calls_per_period = 3;
        (core, obj)
    }

    // ── sample access ─────────────────────────────────────────────────────────

    #[test]
    fn read_and_write_use_staged_samples() {
        let (mut core, obj) = core_with_object();
        core.objects[obj.0].ports[0].staged = vec![1.0, 2.0];
        core.objects[obj.0].ports[1].staged = vec![0.0];

        let mut ctx = ProcessingContext::new(&mut core, obj, Method::Processing, Time::ZERO);
        assert_eq!(ctx.read(0, 1).unwrap(), 2.0);
        assert!(matches!(
            ctx.read(0, 2),
            Err(SyncError::SampleIndexOutOfRange { sample: 2, rate: 2, .. })
        ));
        ctx.write(1, 0, 7.5).unwrap();
        assert!(ctx.write(0, 0, 1.0).is_err(), "input ports are read-only");
        assert!(ctx.read(1, 0).is_err(), "output ports are write-only");
        assert_eq!(core.objects[obj.0].ports[1].staged, vec![7.5]);
    }

    #[test]
    fn port_access_outside_processing_is_rejected() {
        let (mut core, obj) = core_with_object();
        let ctx = ProcessingContext::new(&mut core, obj, Method::ChangeAttributes, Time::ZERO);
        assert!(matches!(
            ctx.read(0, 0),
            Err(SyncError::PortAccessOutsideProcessing { .. })
        ));
        assert!(matches!(
            ctx.read(9, 0),
            Err(SyncError::PortIndexOutOfRange { index: 9, .. })
        ));
    }

    #[test]
    fn initialize_delay_writes_the_port_queue() {
        let (mut core, obj) = core_with_object();
        core.objects[obj.0].ports[1].queue.push_back(0.0);
        let mut ctx = ProcessingContext::new(&mut core, obj, Method::Initialize, Time::ZERO);
        ctx.initialize_delay(1, 0, 4.0).unwrap();
        assert!(ctx.initialize_delay(1, 1, 4.0).is_err(), "only one delay sample");
        assert_eq!(core.objects[obj.0].ports[1].queue[0], 4.0);
    }

    // ── attribute changes ─────────────────────────────────────────────────────

    #[test]
    fn setters_need_does_attribute_changes() {
        let (mut core, obj) = core_with_object();
        let mut ctx = ProcessingContext::new(&mut core, obj, Method::ChangeAttributes, Time::ZERO);
        assert!(matches!(
            ctx.set_rate(0, 4),
            Err(SyncError::AttributeChangeNotAllowed { .. })
        ));
    }

    #[test]
    fn setters_only_work_in_change_attributes() {
        let (mut core, obj) = core_with_object();
        core.objects[obj.0].does_attribute_changes = true;
        let mut ctx = ProcessingContext::new(&mut core, obj, Method::Processing, Time::ZERO);
        assert!(matches!(
            ctx.set_timestep(Time::from_ticks(5)),
            Err(SyncError::OutsideChangeAttributes { .. })
        ));
    }

    #[test]
    fn set_rate_marks_the_cell_and_the_cluster() {
        let (mut core, obj) = core_with_object();
        core.objects[obj.0].does_attribute_changes = true;
        core.exec_id = 42;
        let mut ctx = ProcessingContext::new(&mut core, obj, Method::ChangeAttributes, Time::ZERO);
        ctx.set_rate(0, 4).unwrap();
        assert!(ctx.set_rate(0, 0).is_err());

        let cell = core.port_cell(PortRef { obj, index: 0 }).unwrap();
        assert_eq!(cell.rate, 4);
        assert_eq!(cell.change_id, 42);
        let sync = &core.clusters[0].sync;
        assert!(sync.changes.rate);
        assert_eq!(sync.changed_by, Some(obj));
    }

    #[test]
    fn change_needs_every_other_member_to_accept() {
        let (mut core, obj) = core_with_object();
        core.objects[obj.0].does_attribute_changes = true;
        let other = core.insert_object("top.other", SolverKind::SignalFlow);
        core.clusters[0].objects.push(other);

        let mut ctx = ProcessingContext::new(&mut core, obj, Method::ChangeAttributes, Time::ZERO);
        let err = ctx.set_delay(1, 3).unwrap_err();
        assert_eq!(
            err,
            SyncError::AttributeChangeNotAccepted {
                object: "top.other".into(),
                changed_by: "top.m".into(),
            }
        );

        core.objects[other.0].accepts_attribute_changes = true;
        let mut ctx = ProcessingContext::new(&mut core, obj, Method::ChangeAttributes, Time::ZERO);
        ctx.set_delay(1, 3).unwrap();
    }

    // ── requests ──────────────────────────────────────────────────────────────

    #[test]
    fn next_activation_must_lie_after_the_start() {
        let (mut core, obj) = core_with_object();
        core.objects[obj.0].does_attribute_changes = true;
        core.clusters[0].sync.start = Time::from_ticks(100);
        let mut ctx = ProcessingContext::new(&mut core, obj, Method::ChangeAttributes, Time::ZERO);
        assert!(ctx.request_next_activation(Time::from_ticks(100)).is_err());
        ctx.request_next_activation(Time::from_ticks(130)).unwrap();
        ctx.request_next_activation(Time::from_ticks(110)).unwrap();
        assert_eq!(core.clusters[0].sync.requests.at, Some(Time::from_ticks(110)));
    }

    #[test]
    fn cluster_requests_return_remaining_calls() {
        let (mut core, obj) = core_with_object();
        core.objects[obj.0].calls_in_period = 1;
        let mut ctx = ProcessingContext::new(&mut core, obj, Method::Processing, Time::ZERO);
        assert_eq!(ctx.request_max_start_time(Time::from_ticks(50)).unwrap(), 2);
        assert_eq!(ctx.request_fixed_period(Time::from_ticks(40)).unwrap(), 2);
        let sync = &core.clusters[0].sync;
        assert!(sync.reschedule_pending);
        assert_eq!(
            sync.requested_fixed_period.map(|r| r.period),
            Some(Time::from_ticks(40))
        );
    }

    #[test]
    fn trace_is_buffered_in_the_cluster() {
        let (mut core, obj) = core_with_object();
        let mut ctx =
            ProcessingContext::new(&mut core, obj, Method::Processing, Time::from_ticks(7));
        ctx.trace("v", 1.25);
        let traces = &core.clusters[0].sync.pending_traces;
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].time, Time::from_ticks(7));
        assert_eq!(traces[0].object, "top.m");
    }
}
