/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! End-to-end scenarios against the public session API.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use tdf_sync::cluster::ClusterState;
use tdf_sync::hooks::PassInfo;
use tdf_sync::host::EventId;
use tdf_sync::sync::{Callback, ClusterId, ObjId, Passthrough, PortLink, PortRef};
use tdf_sync::{
    LocalKernel, PortSpec, ProcessingContext, Session, SolverKind, StepError, SyncBehavior,
    SyncError, Time,
};

fn t(ticks: u64) -> Time {
    Time::from_ticks(ticks)
}

fn object(s: &mut Session, name: &str) -> ObjId {
    s.add_object(name, SolverKind::SignalFlow, Box::new(Passthrough))
        .unwrap()
}

fn collect_starts(s: &mut Session, obj: ObjId) -> Rc<RefCell<Vec<Time>>> {
    let starts = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&starts);
    s.register_pass_trace(obj, move |info: &PassInfo| sink.borrow_mut().push(info.start));
    starts
}

fn schedule_names(s: &Session, cid: ClusterId) -> Vec<String> {
    s.report(cid).unwrap().calls
}

// ── Scenario A: host-timed chain ──────────────────────────────────────────────

#[test]
fn host_timed_chain_runs_a_then_b_every_period() {
    let mut s = Session::default();
    let mut k = LocalKernel::new();
    let stimulus = k.add_signal("stimulus", 0.0);
    let result = k.add_signal("result", 0.0);
    k.drive(stimulus, |now| now.ticks() as f64);

    let ch = s.add_channel("a_to_b");
    let a = object(&mut s, "A");
    let b = object(&mut s, "B");
    s.add_port(a, PortSpec::from_host("in", stimulus).timestep(t(10)))
        .unwrap();
    s.add_port(a, PortSpec::to_peer("out", ch)).unwrap();
    s.add_port(b, PortSpec::from_peer("in", ch)).unwrap();
    s.add_port(b, PortSpec::to_host("out", result)).unwrap();

    s.elaborate().unwrap();
    assert_eq!(s.cluster_count(), 1);
    let cluster = s.core().cluster(ClusterId(0)).unwrap();
    assert_eq!(cluster.period(), t(10));
    assert_eq!(s.core().object(a).unwrap().calls_per_period(), 1);
    assert_eq!(s.core().object(b).unwrap().calls_per_period(), 1);
    assert_eq!(schedule_names(&s, ClusterId(0)), vec!["A#1", "B#1"]);

    s.run_until(&mut k, t(30)).unwrap();
    assert_eq!(
        k.writes(result),
        &[(t(0), 0.0), (t(10), 10.0), (t(20), 20.0), (t(30), 30.0)]
    );
}

// ── Scenario B: fan-out with mismatched consumer rates ────────────────────────

#[test]
fn fan_out_rates_resolve_through_the_lcm() {
    let mut s = Session::default();
    let ch = s.add_channel("p_out");
    let p = object(&mut s, "P");
    let c1 = object(&mut s, "C1");
    let c2 = object(&mut s, "C2");
    s.add_port(p, PortSpec::to_peer("out", ch)).unwrap();
    s.add_port(c1, PortSpec::from_peer("in", ch).rate(2)).unwrap();
    s.add_port(c2, PortSpec::from_peer("in", ch)).unwrap();
    s.object_mut(p).unwrap().set_timestep(t(5));

    s.elaborate().unwrap();
    let calls = |o: ObjId| s.core().object(o).unwrap().calls_per_period();
    assert_eq!(calls(p), 2);
    assert_eq!(calls(c1), 1);
    assert_eq!(calls(c2), 2);
    assert_eq!(s.core().channel(ch).unwrap().samples_per_period(), 2);
    assert_eq!(s.core().cluster(ClusterId(0)).unwrap().period(), t(10));
}

// ── Scenario C: explicit reactivation ─────────────────────────────────────────

/// Asks for the next period `lead` ticks after the current start.
struct EarlyRestart {
    lead: u64,
}

impl SyncBehavior for EarlyRestart {
    fn processing(&mut self, _ctx: &mut ProcessingContext<'_>) -> Result<(), StepError> {
        Ok(())
    }

    fn change_attributes(
        &mut self,
        ctx: &mut ProcessingContext<'_>,
    ) -> Result<Callback, SyncError> {
        let at = ctx.cluster_start().saturating_add(t(self.lead));
        ctx.request_next_activation(at)?;
        Ok(Callback::Handled)
    }
}

#[test]
fn requested_activation_brings_the_next_start_forward() {
    let mut s = Session::default();
    let obj = s
        .add_object("early", SolverKind::SignalFlow, Box::new(EarlyRestart { lead: 4 }))
        .unwrap();
    s.object_mut(obj).unwrap().set_timestep(t(10));
    s.object_mut(obj).unwrap().set_does_attribute_changes(true);
    let starts = collect_starts(&mut s, obj);

    let mut k = LocalKernel::new();
    s.run_until(&mut k, t(12)).unwrap();

    assert_eq!(*starts.borrow(), vec![t(0), t(4), t(8), t(12)]);
    let cluster = s.core().cluster(ClusterId(0)).unwrap();
    assert_eq!(cluster.period(), t(10));
    assert_eq!(cluster.sync().expected_start, t(22));
}

#[test]
fn activation_request_after_the_nominal_start_is_ignored() {
    let mut s = Session::default();
    let obj = s
        .add_object("late", SolverKind::SignalFlow, Box::new(EarlyRestart { lead: 25 }))
        .unwrap();
    s.object_mut(obj).unwrap().set_timestep(t(10));
    s.object_mut(obj).unwrap().set_does_attribute_changes(true);
    let starts = collect_starts(&mut s, obj);

    let mut k = LocalKernel::new();
    s.run_until(&mut k, t(30)).unwrap();

    assert_eq!(*starts.borrow(), vec![t(0), t(10), t(20), t(30)]);
}

/// Waits for events in every `change_attributes` pass.
enum WaitOn {
    Any(Vec<EventId>),
    All(Vec<EventId>),
}

impl SyncBehavior for WaitOn {
    fn processing(&mut self, _ctx: &mut ProcessingContext<'_>) -> Result<(), StepError> {
        Ok(())
    }

    fn change_attributes(
        &mut self,
        ctx: &mut ProcessingContext<'_>,
    ) -> Result<Callback, SyncError> {
        match self {
            WaitOn::Any(events) if events.len() == 1 => ctx.request_next_activation_on(events[0])?,
            WaitOn::Any(events) => ctx.request_next_activation_on_any(events)?,
            WaitOn::All(events) => ctx.request_next_activation_on_all(events)?,
        }
        Ok(Callback::Handled)
    }
}

fn waiting_object(s: &mut Session, wait: WaitOn) -> ObjId {
    let obj = s
        .add_object("waiter", SolverKind::SignalFlow, Box::new(wait))
        .unwrap();
    s.object_mut(obj).unwrap().set_timestep(t(10));
    s.object_mut(obj).unwrap().set_does_attribute_changes(true);
    obj
}

#[test]
fn event_request_keeps_the_nominal_start() {
    let mut s = Session::default();
    let mut k = LocalKernel::new();
    let ev = k.new_event("late");
    k.notify_at(ev, t(35));
    let obj = waiting_object(&mut s, WaitOn::Any(vec![ev]));
    let starts = collect_starts(&mut s, obj);

    s.run_until(&mut k, t(30)).unwrap();
    assert_eq!(*starts.borrow(), vec![t(0), t(10), t(20), t(30)]);
}

#[test]
fn event_wakes_the_cluster_before_the_nominal_start() {
    let mut s = Session::default();
    let mut k = LocalKernel::new();
    let ev = k.new_event("tick");
    k.notify_at(ev, t(15));
    let obj = waiting_object(&mut s, WaitOn::Any(vec![ev]));
    let starts = collect_starts(&mut s, obj);

    s.run_until(&mut k, t(30)).unwrap();
    assert_eq!(*starts.borrow(), vec![t(0), t(10), t(15), t(25)]);
}

#[test]
fn any_of_several_events_wakes_the_cluster() {
    let mut s = Session::default();
    let mut k = LocalKernel::new();
    let e1 = k.new_event("e1");
    let e2 = k.new_event("e2");
    k.notify_at(e1, t(7));
    k.notify_at(e2, t(4));
    let obj = waiting_object(&mut s, WaitOn::Any(vec![e1, e2]));
    let starts = collect_starts(&mut s, obj);

    s.run_until(&mut k, t(17)).unwrap();
    assert_eq!(*starts.borrow(), vec![t(0), t(4), t(7), t(17)]);
}

#[test]
fn and_list_wakes_the_cluster_once_all_events_fired() {
    let mut s = Session::default();
    let mut k = LocalKernel::new();
    let e1 = k.new_event("e1");
    let e2 = k.new_event("e2");
    k.notify_at(e1, t(3));
    k.notify_at(e2, t(6));
    let obj = waiting_object(&mut s, WaitOn::All(vec![e1, e2]));
    let starts = collect_starts(&mut s, obj);

    s.run_until(&mut k, t(16)).unwrap();
    assert_eq!(*starts.borrow(), vec![t(0), t(6), t(16)]);
}

#[test]
fn activation_request_without_declaration_is_fatal() {
    let mut s = Session::default();
    let obj = s
        .add_object("early", SolverKind::SignalFlow, Box::new(EarlyRestart { lead: 4 }))
        .unwrap();
    s.object_mut(obj).unwrap().set_timestep(t(10));

    let mut k = LocalKernel::new();
    let err = s.run_until(&mut k, t(12)).unwrap_err();
    assert!(matches!(err, SyncError::AttributeChangeNotAllowed { .. }));
    assert_eq!(s.cluster_state(ClusterId(0)), Some(ClusterState::Halted));
}

// ── Attribute changes at run time ─────────────────────────────────────────────

/// Outputs `10 * call + sample` when it has no input and copies its first
/// input otherwise.  `change` runs in every `change_attributes` pass with
/// the pass number.
struct Scripted<F> {
    change: F,
    passes: u64,
}

impl<F> SyncBehavior for Scripted<F>
where
    F: FnMut(u64, &mut ProcessingContext<'_>) -> Result<(), SyncError>,
{
    fn processing(&mut self, ctx: &mut ProcessingContext<'_>) -> Result<(), StepError> {
        let input = ctx.input_ports().first().copied();
        let call = ctx.call_counter();
        for out in ctx.output_ports() {
            for i in 0..ctx.rate(out)? {
                let value = match input {
                    Some(inp) => ctx.read(inp, i)?,
                    None => (10 * call + i) as f64,
                };
                ctx.write(out, i, value)?;
            }
        }
        Ok(())
    }

    fn change_attributes(
        &mut self,
        ctx: &mut ProcessingContext<'_>,
    ) -> Result<Callback, SyncError> {
        self.passes += 1;
        (self.change)(self.passes, ctx)?;
        Ok(Callback::Handled)
    }
}

fn scripted<F>(change: F) -> Box<dyn SyncBehavior>
where
    F: FnMut(u64, &mut ProcessingContext<'_>) -> Result<(), SyncError> + 'static,
{
    Box::new(Scripted { change, passes: 0 })
}

fn collect_periods(s: &mut Session, obj: ObjId) -> Rc<RefCell<Vec<Time>>> {
    let periods = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&periods);
    s.register_pass_trace(obj, move |info: &PassInfo| sink.borrow_mut().push(info.period));
    periods
}

#[test]
fn driver_rate_change_reschedules_the_consumer() {
    let mut s = Session::default();
    let mut k = LocalKernel::new();
    let result = k.add_signal("result", 0.0);
    let ch = s.add_channel("a_to_b");
    let a = s
        .add_object(
            "A",
            SolverKind::SignalFlow,
            scripted(|pass, ctx| if pass == 1 { ctx.set_rate(0, 2) } else { Ok(()) }),
        )
        .unwrap();
    let b = object(&mut s, "B");
    s.add_port(a, PortSpec::to_peer("out", ch)).unwrap();
    s.add_port(b, PortSpec::from_peer("in", ch)).unwrap();
    s.add_port(b, PortSpec::to_host("out", result)).unwrap();
    s.object_mut(a).unwrap().set_timestep(t(10));
    s.object_mut(a).unwrap().set_does_attribute_changes(true);
    s.object_mut(b).unwrap().set_accepts_attribute_changes(true);

    s.elaborate().unwrap();
    assert_eq!(s.core().object(b).unwrap().calls_per_period(), 1);

    s.run_until(&mut k, t(20)).unwrap();
    let core = s.core();
    assert_eq!(core.object(a).unwrap().calls_per_period(), 1);
    assert_eq!(core.object(b).unwrap().calls_per_period(), 2);
    assert_eq!(core.channel(ch).unwrap().samples_per_period(), 2);
    let cluster = core.cluster(ClusterId(0)).unwrap();
    assert_eq!(cluster.period(), t(10));
    assert_eq!(cluster.sync().changed_by, None);
    assert_eq!(
        k.writes(result),
        &[(t(0), 10.0), (t(10), 20.0), (t(15), 21.0), (t(20), 30.0)]
    );
}

#[test]
fn reader_delay_change_inserts_a_zero_sample() {
    let mut s = Session::default();
    let mut k = LocalKernel::new();
    let result = k.add_signal("result", 0.0);
    let ch = s.add_channel("a_to_b");
    let a = s
        .add_object("A", SolverKind::SignalFlow, scripted(|_, _| Ok(())))
        .unwrap();
    let b = s
        .add_object(
            "B",
            SolverKind::SignalFlow,
            scripted(|pass, ctx| if pass == 1 { ctx.set_delay(0, 1) } else { Ok(()) }),
        )
        .unwrap();
    s.add_port(a, PortSpec::to_peer("out", ch)).unwrap();
    let input = s.add_port(b, PortSpec::from_peer("in", ch)).unwrap();
    s.add_port(b, PortSpec::to_host("out", result)).unwrap();
    s.object_mut(a).unwrap().set_timestep(t(10));
    s.object_mut(a).unwrap().set_accepts_attribute_changes(true);
    s.object_mut(b).unwrap().set_does_attribute_changes(true);

    s.run_until(&mut k, t(20)).unwrap();
    assert_eq!(s.core().object(b).unwrap().delay(input.index), Some(1));
    assert_eq!(
        k.writes(result),
        &[(t(0), 10.0), (t(10), 0.0), (t(20), 20.0)]
    );
}

#[test]
fn fixed_period_request_applies_from_the_next_period() {
    let mut s = Session::default();
    let mut k = LocalKernel::new();
    let out = k.add_signal("out", 0.0);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let obj = s
        .add_object(
            "p",
            SolverKind::SignalFlow,
            scripted(move |pass, ctx| {
                sink.borrow_mut().push(ctx.is_rescheduled());
                if pass == 1 {
                    ctx.request_fixed_period(t(20))?;
                }
                Ok(())
            }),
        )
        .unwrap();
    s.add_port(obj, PortSpec::to_host("out", out)).unwrap();
    s.object_mut(obj).unwrap().set_timestep(t(10));
    let starts = collect_starts(&mut s, obj);
    let periods = collect_periods(&mut s, obj);

    s.run_until(&mut k, t(50)).unwrap();
    assert_eq!(*starts.borrow(), vec![t(0), t(10), t(30), t(50)]);
    assert_eq!(*periods.borrow(), vec![t(10), t(20), t(20), t(20)]);
    assert_eq!(*seen.borrow(), vec![false, true, false, false]);
    assert_eq!(s.core().cluster(ClusterId(0)).unwrap().period(), t(20));
}

#[test]
fn max_period_request_shortens_the_period() {
    let mut s = Session::default();
    let mut k = LocalKernel::new();
    let out = k.add_signal("out", 0.0);
    let obj = s
        .add_object(
            "p",
            SolverKind::SignalFlow,
            scripted(|pass, ctx| {
                if pass == 1 {
                    ctx.request_max_period(t(4))?;
                }
                Ok(())
            }),
        )
        .unwrap();
    s.add_port(obj, PortSpec::to_host("out", out)).unwrap();
    s.object_mut(obj).unwrap().set_timestep(t(10));
    let starts = collect_starts(&mut s, obj);

    s.run_until(&mut k, t(22)).unwrap();
    assert_eq!(*starts.borrow(), vec![t(0), t(10), t(14), t(18), t(22)]);
    let cluster = s.core().cluster(ClusterId(0)).unwrap();
    assert_eq!(cluster.period(), t(4));
    assert_eq!(cluster.max_period(), Some(t(4)));
    let times: Vec<Time> = k.writes(out).iter().map(|&(at, _)| at).collect();
    assert_eq!(times, vec![t(0), t(10), t(14), t(18), t(22)]);
}

// ── Scenario D: static classification ─────────────────────────────────────────

/// Implements `change_attributes` without changing anything.
struct Watcher {
    checks: Rc<Cell<u32>>,
}

impl SyncBehavior for Watcher {
    fn processing(&mut self, _ctx: &mut ProcessingContext<'_>) -> Result<(), StepError> {
        Ok(())
    }

    fn change_attributes(
        &mut self,
        _ctx: &mut ProcessingContext<'_>,
    ) -> Result<Callback, SyncError> {
        self.checks.set(self.checks.get() + 1);
        Ok(Callback::Handled)
    }
}

#[test]
fn cluster_without_change_attributes_takes_the_static_path() {
    let mut s = Session::default();
    let ch = s.add_channel("x");
    let a = object(&mut s, "a");
    let b = object(&mut s, "b");
    s.add_port(a, PortSpec::to_peer("out", ch)).unwrap();
    s.add_port(b, PortSpec::from_peer("in", ch)).unwrap();
    s.object_mut(a).unwrap().set_timestep(t(10));

    let mut k = LocalKernel::new();
    s.run_until(&mut k, t(40)).unwrap();

    let sync = s.core().cluster(ClusterId(0)).unwrap().sync();
    assert!(sync.definitely_static);
    assert_eq!(sync.passes, 5);
    assert_eq!(sync.change_attribute_checks, 1);
    assert_eq!(sync.static_passes, 4);
    assert_eq!(
        s.cluster_state(ClusterId(0)),
        Some(ClusterState::StaticPreNextScheduling)
    );
}

#[test]
fn change_attributes_implementation_keeps_the_full_path() {
    let checks = Rc::new(Cell::new(0));
    let mut s = Session::default();
    let obj = s
        .add_object(
            "watch",
            SolverKind::SignalFlow,
            Box::new(Watcher {
                checks: Rc::clone(&checks),
            }),
        )
        .unwrap();
    s.object_mut(obj).unwrap().set_timestep(t(10));

    let mut k = LocalKernel::new();
    s.run_until(&mut k, t(40)).unwrap();

    let sync = s.core().cluster(ClusterId(0)).unwrap().sync();
    assert!(!sync.definitely_static);
    assert_eq!(sync.change_attribute_checks, 5);
    assert_eq!(sync.static_passes, 0);
    assert_eq!(checks.get(), 5);
}

// ── Graph properties ──────────────────────────────────────────────────────────

#[test]
fn clusters_partition_the_registered_objects() {
    let mut s = Session::default();
    let ab = s.add_channel("ab");
    let de = s.add_channel("de");
    let ef = s.add_channel("ef");
    let a = object(&mut s, "a");
    let b = object(&mut s, "b");
    let c = object(&mut s, "c");
    let d = object(&mut s, "d");
    let e = object(&mut s, "e");
    let f = object(&mut s, "f");
    s.add_port(a, PortSpec::to_peer("out", ab)).unwrap();
    s.add_port(b, PortSpec::from_peer("in", ab)).unwrap();
    s.add_port(d, PortSpec::to_peer("out", de)).unwrap();
    s.add_port(e, PortSpec::from_peer("in", de)).unwrap();
    s.add_port(e, PortSpec::to_peer("out", ef)).unwrap();
    s.add_port(f, PortSpec::from_peer("in", ef)).unwrap();
    for o in [a, c, d] {
        s.object_mut(o).unwrap().set_timestep(t(10));
    }

    s.elaborate().unwrap();
    assert_eq!(s.cluster_count(), 3);

    let mut seen = BTreeSet::new();
    for cluster in s.core().clusters() {
        for &o in cluster.objects() {
            assert!(seen.insert(o), "{o:?} appears in two clusters");
        }
    }
    let registered: BTreeSet<ObjId> = s.core().registered().iter().copied().collect();
    assert_eq!(seen, registered);
    assert_eq!(s.cluster_of(a), s.cluster_of(b));
    assert_eq!(s.cluster_of(d), s.cluster_of(f));
    assert_ne!(s.cluster_of(a), s.cluster_of(c));
}

#[test]
fn zero_rate_is_rejected_without_a_schedule() {
    let mut s = Session::default();
    let ch = s.add_channel("x");
    let a = object(&mut s, "a");
    let b = object(&mut s, "b");
    s.add_port(a, PortSpec::to_peer("out", ch)).unwrap();
    s.add_port(b, PortSpec::from_peer("in", ch).rate(0)).unwrap();
    s.object_mut(a).unwrap().set_timestep(t(10));

    let err = s.elaborate().unwrap_err();
    assert!(matches!(err, SyncError::ZeroRate { ref object, .. } if object == "b"));
    assert!(!s.is_elaborated());
    assert!(s
        .core()
        .clusters()
        .iter()
        .all(|c| c.scheduling_list().is_empty()));
}

// ── Timing properties ─────────────────────────────────────────────────────────

/// `a` (timestep 5, out rate 1) drives `b` (in rate 2) with timestep `tb`.
fn two_timesteps(tb: u64) -> Session {
    let mut s = Session::default();
    let ch = s.add_channel("ab");
    let a = object(&mut s, "a");
    let b = object(&mut s, "b");
    s.add_port(a, PortSpec::to_peer("out", ch)).unwrap();
    s.add_port(b, PortSpec::from_peer("in", ch).rate(2)).unwrap();
    s.object_mut(a).unwrap().set_timestep(t(5));
    s.object_mut(b).unwrap().set_timestep(t(tb));
    s
}

#[test]
fn timesteps_within_tolerance_take_the_coarser_period() {
    let mut s = two_timesteps(11);
    s.elaborate().unwrap();
    assert_eq!(s.core().cluster(ClusterId(0)).unwrap().period(), t(11));
}

#[test]
fn conflicting_timesteps_are_fatal() {
    let mut s = two_timesteps(15);
    let err = s.elaborate().unwrap_err();
    assert!(matches!(err, SyncError::InconsistentTimestep { .. }), "{err}");
}

/// Fan-out plus a delayed feedback loop.
fn mixed_graph() -> Session {
    let mut s = Session::default();
    let fwd = s.add_channel("fwd");
    let back = s.add_channel("back");
    let side = s.add_channel("side");
    let a = object(&mut s, "a");
    let b = object(&mut s, "b");
    let c = object(&mut s, "c");
    s.add_port(a, PortSpec::to_peer("out", fwd).rate(2)).unwrap();
    s.add_port(a, PortSpec::from_peer("fb", back).rate(2).delay(2))
        .unwrap();
    s.add_port(b, PortSpec::from_peer("in", fwd)).unwrap();
    s.add_port(b, PortSpec::to_peer("out", back)).unwrap();
    s.add_port(b, PortSpec::to_peer("side", side)).unwrap();
    s.add_port(c, PortSpec::from_peer("in", side).rate(3)).unwrap();
    s.object_mut(a).unwrap().set_timestep(t(30));
    s
}

#[test]
fn every_channel_carries_rate_times_calls() {
    let mut s = mixed_graph();
    s.elaborate().unwrap();
    let core = s.core();
    for channel in core.channels() {
        for port in channel.ports() {
            let object = core.object(port.obj).unwrap();
            let rate = object.rate(port.index).unwrap();
            assert_eq!(
                channel.samples_per_period(),
                rate * object.calls_per_period(),
                "channel {} port {}",
                channel.name(),
                core.port_name(port)
            );
        }
    }
}

#[test]
fn identical_graphs_schedule_identically() {
    let mut first = mixed_graph();
    let mut second = mixed_graph();
    first.elaborate().unwrap();
    second.elaborate().unwrap();
    assert_eq!(
        first.core().clusters()[0].scheduling_list(),
        second.core().clusters()[0].scheduling_list()
    );

    let core = first.core();
    let cluster = &core.clusters()[0];
    for &obj in cluster.objects() {
        let calls: Vec<u64> = cluster
            .scheduling_list()
            .iter()
            .filter(|e| e.obj == obj)
            .map(|e| e.call)
            .collect();
        let expected: Vec<u64> = (1..=core.object(obj).unwrap().calls_per_period()).collect();
        assert_eq!(calls, expected);
    }
}

#[test]
fn schedule_never_reads_unwritten_samples() {
    let mut s = mixed_graph();
    s.elaborate().unwrap();
    let core = s.core();
    let cluster = &core.clusters()[0];

    let rate = |p: PortRef| core.object(p.obj).unwrap().rate(p.index).unwrap();
    let delay = |p: PortRef| core.object(p.obj).unwrap().delay(p.index).unwrap();

    let mut calls: HashMap<ObjId, u64> = HashMap::new();
    for element in cluster.scheduling_list() {
        *calls.entry(element.obj).or_default() += 1;
        for &ch in cluster.channels() {
            let channel = core.channel(ch).unwrap();
            let driver = channel.driver().unwrap();
            let written = delay(driver) + calls.get(&driver.obj).copied().unwrap_or(0) * rate(driver);

            let mut oldest = written;
            for &reader in channel.readers() {
                let consumed = calls.get(&reader.obj).copied().unwrap_or(0) * rate(reader);
                assert!(
                    consumed <= written + delay(reader),
                    "{} read ahead of {}",
                    core.port_name(reader),
                    channel.name()
                );
                oldest = oldest.min(consumed.saturating_sub(delay(reader)));
            }
            assert!(written - oldest <= channel.max_buffer_usage());
        }
    }
}

// ── Host wiring ───────────────────────────────────────────────────────────────

#[test]
fn host_ports_link_to_kernel_signals() {
    let mut s = Session::default();
    let mut k = LocalKernel::new();
    let out = k.add_signal("out", 0.0);
    let a = object(&mut s, "a");
    let port = s
        .add_port(a, PortSpec::to_host("out", out).timestep(t(3)))
        .unwrap();
    assert_eq!(s.core().port(port).unwrap().link, PortLink::Host(out));

    s.run_until(&mut k, t(9)).unwrap();
    let times: Vec<Time> = k.writes(out).iter().map(|&(at, _)| at).collect();
    assert_eq!(times, vec![t(0), t(3), t(6), t(9)]);
}
