/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Static list scheduler.
//!
//! [`generate_scheduling_list`] turns the analysed rates of one cluster into
//! an ordered list of calls for one period and a [`ScheduleProgram`] that
//! interleaves the calls with host reads and writes.
//!
//! All times are scaled offsets in `[0, S)` where `S` is the cluster's
//! `scaled_lcm`.  Call `k` (0-based) of an object with `c` calls per period
//! sits at `k·S/c`; host sample `j` of a port with `N` samples per period at
//! `j·S/N`.
//!
//! # Algorithm
//!
//! | Step | Rule |
//! |---|---|
//! | Sweep | Members with calls left, sorted by (calls left desc, graph order asc); each gets at most one call per sweep |
//! | Ready | Every input has `rate` unread samples: delays plus produced (peer) or delay plus hosts reads at or before the current offset (host) |
//! | Host writes | Recorded at `max(nominal offset, current offset)` as soon as the sample exists |
//! | Stall | Close the running slice, advance to the next pending host read |
//! | Deadlock | No pending host read: [`SyncError::Unschedulable`] |

pub mod program;
pub mod report;

pub use program::{HostAction, ProgramBuilder, ScheduleProgram, TimedAction};
pub use report::ScheduleReport;

use std::cmp::Reverse;
use std::collections::HashMap;

use tracing::{debug, error, info};

use crate::context::SyncCore;
use crate::error::{truncated_list, SyncError};
use crate::sync::{ChannelId, ClusterId, Method, ObjId, PortDirection, PortRef};

// ── Scheduling list ───────────────────────────────────────────────────────────

/// One call of the scheduling list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedElement {
    pub obj: ObjId,
    pub method: Method,
    /// Nominal offset of this call inside the period.
    pub scaled_time: u64,
    /// 1-based call number inside the period.
    pub call: u64,
}

// ── Planner state ─────────────────────────────────────────────────────────────

enum Input {
    Peer { channel: usize, rate: u64, delay: u64 },
    Host { host: usize, rate: u64 },
}

struct Member {
    obj: ObjId,
    name: String,
    calls_per_period: u64,
    calls: u64,
    graph_order: i64,
    inputs: Vec<Input>,
    /// Channels this member drives or reads, for buffer accounting.
    channels: Vec<usize>,
}

impl Member {
    fn remaining(&self) -> u64 {
        self.calls_per_period - self.calls
    }
}

struct ChannelState {
    id: ChannelId,
    driver: Option<(usize, u64)>,
    driver_delay: u64,
    /// Member index, rate and delay of every reader.
    readers: Vec<(usize, u64, u64)>,
    max_usage: u64,
}

struct HostIn {
    port: PortRef,
    delay: u64,
    samples: u64,
}

struct HostOut {
    port: PortRef,
    member: usize,
    rate: u64,
    delay: u64,
    samples: u64,
    writes: u64,
}

/// Output of a successful planning run.
struct Plan {
    elements: Vec<SchedElement>,
    program: ScheduleProgram,
    buffer_usage: Vec<(ChannelId, u64)>,
}

struct Planner {
    cluster: ClusterId,
    scaled_lcm: u64,
    members: Vec<Member>,
    channels: Vec<ChannelState>,
    host_ins: Vec<HostIn>,
    host_outs: Vec<HostOut>,
    max_reported: usize,
}

/// Scaled offset of sample `j` of `n` per period.
fn nominal(j: u64, n: u64, scaled_lcm: u64) -> u64 {
    (j as u128 * scaled_lcm as u128 / n as u128) as u64
}

/// Host samples with a nominal offset at or before `reached`.
fn reads_until(reached: u64, n: u64, scaled_lcm: u64) -> u64 {
    let upto = reached as u128 * n as u128 / scaled_lcm as u128 + 1;
    upto.min(n as u128) as u64
}

impl Planner {
    fn new(core: &SyncCore, cid: ClusterId) -> Result<Self, SyncError> {
        let cluster = core.cluster(cid)?;
        let index: HashMap<ObjId, usize> = cluster
            .objects
            .iter()
            .enumerate()
            .map(|(i, &o)| (o, i))
            .collect();
        let chan_index: HashMap<ChannelId, usize> = cluster
            .channels
            .iter()
            .enumerate()
            .map(|(i, &c)| (c, i))
            .collect();

        let mut channels = Vec::with_capacity(cluster.channels.len());
        for &ch in &cluster.channels {
            let c = core.channel(ch)?;
            let driver = match c.driver() {
                Some(d) => {
                    let cell = core.port_cell(d)?;
                    index.get(&d.obj).map(|&m| ((m, cell.rate), cell.delay))
                }
                None => None,
            };
            let mut readers = Vec::with_capacity(c.readers.len());
            for &r in &c.readers {
                let cell = core.port_cell(r)?;
                if let Some(&m) = index.get(&r.obj) {
                    readers.push((m, cell.rate, cell.delay));
                }
            }
            channels.push(ChannelState {
                id: ch,
                driver: driver.map(|(d, _)| d),
                driver_delay: driver.map_or(0, |(_, delay)| delay),
                readers,
                max_usage: 0,
            });
        }

        let mut members = Vec::with_capacity(cluster.objects.len());
        let mut host_ins = Vec::new();
        let mut host_outs = Vec::new();
        for (m, &obj) in cluster.objects.iter().enumerate() {
            let o = core.object(obj)?;
            let cpp = o.calls_per_period;
            let mut inputs = Vec::new();
            let mut touched = Vec::new();
            for (i, p) in o.ports.iter().enumerate() {
                let port = PortRef { obj, index: i };
                let Some(cell) = o.cells.get(p.cell) else {
                    continue;
                };
                match p.direction {
                    PortDirection::FromPeer => {
                        if let Some(&ch) = p.channel().and_then(|c| chan_index.get(&c)) {
                            inputs.push(Input::Peer {
                                channel: ch,
                                rate: cell.rate,
                                delay: cell.delay,
                            });
                            touched.push(ch);
                        }
                    }
                    PortDirection::ToPeer => {
                        if let Some(&ch) = p.channel().and_then(|c| chan_index.get(&c)) {
                            touched.push(ch);
                        }
                    }
                    PortDirection::FromHost => {
                        inputs.push(Input::Host {
                            host: host_ins.len(),
                            rate: cell.rate,
                        });
                        host_ins.push(HostIn {
                            port,
                            delay: cell.delay,
                            samples: cpp * cell.rate,
                        });
                    }
                    PortDirection::ToHost => host_outs.push(HostOut {
                        port,
                        member: m,
                        rate: cell.rate,
                        delay: cell.delay,
                        samples: cpp * cell.rate,
                        writes: 0,
                    }),
                }
            }
            members.push(Member {
                obj,
                name: o.name.clone(),
                calls_per_period: cpp,
                calls: 0,
                graph_order: o.graph_order,
                inputs,
                channels: touched,
            });
        }

        let mut planner = Self {
            cluster: cid,
            scaled_lcm: cluster.scaled_lcm.max(1),
            members,
            channels,
            host_ins,
            host_outs,
            max_reported: core.config.max_reported_members,
        };
        for ch in 0..planner.channels.len() {
            planner.channels[ch].max_usage = planner.channel_usage(ch);
        }
        Ok(planner)
    }

    fn ready(&self, m: usize, reached: u64) -> bool {
        let member = &self.members[m];
        if member.remaining() == 0 {
            return false;
        }
        member.inputs.iter().all(|input| match *input {
            Input::Peer {
                channel,
                rate,
                delay,
            } => {
                let ch = &self.channels[channel];
                let produced = ch
                    .driver
                    .map_or(0, |(d, r)| self.members[d].calls * r);
                let available = ch.driver_delay + produced + delay;
                (member.calls + 1) * rate <= available
            }
            Input::Host { host, rate } => {
                let h = &self.host_ins[host];
                let available = h.delay + reads_until(reached, h.samples, self.scaled_lcm);
                (member.calls + 1) * rate <= available
            }
        })
    }

    /// Samples held in a channel buffer given the current call counts.
    fn channel_usage(&self, ch: usize) -> u64 {
        let c = &self.channels[ch];
        let written = c.driver_delay
            + c.driver.map_or(0, |(d, r)| self.members[d].calls * r);
        let oldest = c
            .readers
            .iter()
            .map(|&(m, rate, delay)| (self.members[m].calls * rate).saturating_sub(delay))
            .min()
            .unwrap_or(written);
        written.saturating_sub(oldest)
    }

    fn record_writes(&mut self, reached: u64, builder: &mut ProgramBuilder) {
        for h in self.host_outs.iter_mut() {
            let produced = self.members[h.member].calls * h.rate;
            while h.writes < h.samples && h.delay + produced > h.writes {
                let at = nominal(h.writes, h.samples, self.scaled_lcm).max(reached);
                builder.push(at, HostAction::WriteHost(h.port));
                h.writes += 1;
            }
        }
    }

    /// Offset of the first host read after `reached`, if any.
    fn next_read_after(&self, reached: u64) -> Option<u64> {
        self.host_ins
            .iter()
            .filter_map(|h| {
                let next = reads_until(reached, h.samples, self.scaled_lcm);
                (next < h.samples).then(|| nominal(next, h.samples, self.scaled_lcm))
            })
            .min()
    }

    fn unschedulable(&self, elements: &[SchedElement]) -> SyncError {
        let partial: Vec<String> = elements
            .iter()
            .map(|e| {
                let name = self
                    .members
                    .iter()
                    .find(|m| m.obj == e.obj)
                    .map_or("?", |m| m.name.as_str());
                format!("{name}#{}", e.call)
            })
            .collect();
        let stuck: Vec<String> = self
            .members
            .iter()
            .filter(|m| m.remaining() > 0)
            .map(|m| m.name.clone())
            .collect();
        SyncError::Unschedulable {
            cluster: self.cluster.0,
            partial: truncated_list(&partial, self.max_reported),
            stuck: truncated_list(&stuck, self.max_reported),
        }
    }

    fn run(mut self) -> Result<Plan, SyncError> {
        let s = self.scaled_lcm;
        let mut builder = ProgramBuilder::default();
        for h in &self.host_ins {
            for j in 0..h.samples {
                builder.push(nominal(j, h.samples, s), HostAction::ReadHost(h.port));
            }
        }

        let mut elements: Vec<SchedElement> = Vec::new();
        let mut reached = 0;
        let mut slice_start = 0;
        self.record_writes(reached, &mut builder);

        loop {
            let mut order: Vec<usize> = (0..self.members.len())
                .filter(|&m| self.members[m].remaining() > 0)
                .collect();
            if order.is_empty() {
                break;
            }
            order.sort_by_key(|&m| {
                let member = &self.members[m];
                (Reverse(member.remaining()), member.graph_order, m)
            });

            let mut progress = false;
            for m in order {
                if !self.ready(m, reached) {
                    continue;
                }
                let member = &mut self.members[m];
                elements.push(SchedElement {
                    obj: member.obj,
                    method: Method::Processing,
                    scaled_time: nominal(member.calls, member.calls_per_period, s),
                    call: member.calls + 1,
                });
                member.calls += 1;
                for i in 0..self.members[m].channels.len() {
                    let ch = self.members[m].channels[i];
                    let usage = self.channel_usage(ch);
                    let c = &mut self.channels[ch];
                    c.max_usage = c.max_usage.max(usage);
                }
                self.record_writes(reached, &mut builder);
                progress = true;
            }
            if progress {
                continue;
            }

            if elements.len() > slice_start {
                builder.push(reached, HostAction::Schedule(slice_start..elements.len()));
                slice_start = elements.len();
            }
            match self.next_read_after(reached) {
                Some(next) => {
                    debug!(cluster = self.cluster.0, from = reached, to = next, "schedule waits for host input");
                    reached = next;
                }
                None => return Err(self.unschedulable(&elements)),
            }
        }

        if elements.len() > slice_start {
            builder.push(reached, HostAction::Schedule(slice_start..elements.len()));
        }
        self.record_writes(reached, &mut builder);

        Ok(Plan {
            elements,
            program: builder.finish(),
            buffer_usage: self.channels.iter().map(|c| (c.id, c.max_usage)).collect(),
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Build the scheduling list and host program of cluster `cid`.
///
/// Requires a completed rate analysis of the cluster.
pub fn generate_scheduling_list(core: &mut SyncCore, cid: ClusterId) -> Result<(), SyncError> {
    let plan = match Planner::new(core, cid)?.run() {
        Ok(plan) => plan,
        Err(err) => {
            error!("{err}");
            return Err(err);
        }
    };

    for (ch, usage) in plan.buffer_usage {
        core.channel_mut(ch)?.max_buffer_usage = usage;
    }
    let cluster = core.cluster_mut(cid)?;
    info!(
        cluster = cid.0,
        elements = plan.elements.len(),
        actions = plan.program.len(),
        "scheduling list generated"
    );
    cluster.scheduling_list = plan.elements;
    cluster.program = plan.program;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph;
    use crate::host::SignalId;
    use crate::sync::{PortSpec, SolverKind};
    use crate::time::Time;
    use crate::timing;

    fn object(core: &mut SyncCore, name: &str) -> ObjId {
        let id = core.insert_object(name, SolverKind::SignalFlow);
        core.register(id).unwrap();
        id
    }

    fn prepare(core: &mut SyncCore) -> Result<(), SyncError> {
        graph::check_closed_graph(core)?;
        graph::cluster(core)?;
        timing::analyse_sample_rates(core, ClusterId(0), false)?;
        generate_scheduling_list(core, ClusterId(0))
    }

    fn calls(core: &SyncCore) -> Vec<String> {
        core.clusters[0]
            .scheduling_list
            .iter()
            .map(|e| format!("{}#{}", core.objects[e.obj.0].name, e.call))
            .collect()
    }

    #[test]
    fn chain_runs_in_dependency_order() {
        let mut core = SyncCore::default();
        let a = object(&mut core, "a");
        let b = object(&mut core, "b");
        let ch = core.add_channel("ab");
        core.add_port(a, PortSpec::from_host("in", SignalId(0)).timestep(Time::from_ticks(10)))
            .unwrap();
        core.add_port(a, PortSpec::to_peer("out", ch)).unwrap();
        core.add_port(b, PortSpec::from_peer("in", ch)).unwrap();
        core.add_port(b, PortSpec::to_host("out", SignalId(1))).unwrap();
        prepare(&mut core).unwrap();

        assert_eq!(calls(&core), vec!["a#1", "b#1"]);
        let program = &core.clusters[0].program;
        let actions: Vec<_> = program.actions().iter().map(|t| t.action.clone()).collect();
        assert_eq!(
            actions,
            vec![
                HostAction::ReadHost(PortRef { obj: a, index: 0 }),
                HostAction::Schedule(0..2),
                HostAction::WriteHost(PortRef { obj: b, index: 1 }),
            ]
        );
        assert_eq!(core.channels[ch.0].max_buffer_usage, 1);
    }

    #[test]
    fn fan_out_respects_sample_availability() {
        let mut core = SyncCore::default();
        let p = object(&mut core, "p");
        let c1 = object(&mut core, "c1");
        let c2 = object(&mut core, "c2");
        let ch = core.add_channel("s");
        core.add_port(p, PortSpec::to_peer("out", ch)).unwrap();
        core.add_port(c1, PortSpec::from_peer("in", ch).rate(2)).unwrap();
        core.add_port(c2, PortSpec::from_peer("in", ch)).unwrap();
        core.objects[p.0].set_timestep(Time::from_ticks(5));
        prepare(&mut core).unwrap();

        let list = calls(&core);
        assert_eq!(list.len(), 5);
        let pos = |s: &str| list.iter().position(|x| x == s).unwrap();
        assert!(pos("p#2") < pos("c1#1"));
        assert!(pos("p#1") < pos("c2#1"));
        assert!(pos("p#2") < pos("c2#2"));
        // Per-object call offsets are k * S / c.
        let s = core.clusters[0].scaled_lcm;
        for e in &core.clusters[0].scheduling_list {
            let cpp = core.objects[e.obj.0].calls_per_period;
            assert_eq!(e.scaled_time, (e.call - 1) * s / cpp);
        }
    }

    #[test]
    fn delayed_feedback_loop_is_schedulable() {
        let mut core = SyncCore::default();
        let a = object(&mut core, "a");
        let b = object(&mut core, "b");
        let ab = core.add_channel("ab");
        let ba = core.add_channel("ba");
        core.add_port(a, PortSpec::to_peer("out", ab)).unwrap();
        core.add_port(a, PortSpec::from_peer("in", ba).delay(1)).unwrap();
        core.add_port(b, PortSpec::from_peer("in", ab)).unwrap();
        core.add_port(b, PortSpec::to_peer("out", ba)).unwrap();
        core.objects[a.0].set_timestep(Time::from_ticks(10));
        prepare(&mut core).unwrap();
        assert_eq!(calls(&core), vec!["a#1", "b#1"]);
    }

    #[test]
    fn zero_delay_loop_is_unschedulable() {
        let mut core = SyncCore::default();
        let a = object(&mut core, "a");
        let b = object(&mut core, "b");
        let ab = core.add_channel("ab");
        let ba = core.add_channel("ba");
        core.add_port(a, PortSpec::to_peer("out", ab)).unwrap();
        core.add_port(a, PortSpec::from_peer("in", ba)).unwrap();
        core.add_port(b, PortSpec::from_peer("in", ab)).unwrap();
        core.add_port(b, PortSpec::to_peer("out", ba)).unwrap();
        core.objects[a.0].set_timestep(Time::from_ticks(10));
        match prepare(&mut core) {
            Err(SyncError::Unschedulable { cluster, partial, stuck }) => {
                assert_eq!(cluster, 0);
                assert_eq!(partial, "");
                assert!(stuck.contains('a') && stuck.contains('b'));
            }
            other => panic!("expected unschedulable, got {other:?}"),
        }
    }

    #[test]
    fn host_input_spreads_calls_over_the_period() {
        // Host input at 2 samples per period, consumer at rate 1: the second
        // call waits for the second host read at S/2.
        let mut core = SyncCore::default();
        let a = object(&mut core, "a");
        core.add_port(a, PortSpec::from_host("in", SignalId(0)).timestep(Time::from_ticks(5)))
            .unwrap();
        core.add_port(a, PortSpec::to_host("out", SignalId(1))).unwrap();
        core.objects[a.0].set_timestep(Time::from_ticks(5));
        // Two calls per period come from a second member at rate 2.
        let b = object(&mut core, "b");
        let ch = core.add_channel("ab");
        core.add_port(a, PortSpec::to_peer("fwd", ch)).unwrap();
        core.add_port(b, PortSpec::from_peer("in", ch).rate(2)).unwrap();
        prepare(&mut core).unwrap();

        let cluster = &core.clusters[0];
        assert_eq!(cluster.scaled_lcm, 2);
        let slices: Vec<(u64, HostAction)> = cluster
            .program
            .actions()
            .iter()
            .filter(|t| matches!(t.action, HostAction::Schedule(_)))
            .map(|t| (t.scaled_time, t.action.clone()))
            .collect();
        assert_eq!(
            slices,
            vec![(0, HostAction::Schedule(0..1)), (1, HostAction::Schedule(1..3))]
        );
        assert_eq!(cluster.program.reads(), 2);
        assert_eq!(cluster.program.writes(), 2);
    }

    #[test]
    fn rescheduling_an_unchanged_cluster_repeats_the_schedule() {
        let mut core = SyncCore::default();
        let p = object(&mut core, "p");
        let c1 = object(&mut core, "c1");
        let c2 = object(&mut core, "c2");
        let s = core.add_channel("s");
        let back = core.add_channel("back");
        core.add_port(p, PortSpec::to_peer("out", s)).unwrap();
        core.add_port(p, PortSpec::from_peer("in", back).delay(2)).unwrap();
        core.add_port(c1, PortSpec::from_peer("in", s).rate(2)).unwrap();
        core.add_port(c1, PortSpec::to_peer("out", back).rate(2)).unwrap();
        core.add_port(c2, PortSpec::from_peer("in", s)).unwrap();
        core.objects[p.0].set_timestep(Time::from_ticks(5));
        prepare(&mut core).unwrap();

        let snapshot = |core: &SyncCore| {
            let cluster = &core.clusters[0];
            let actions: Vec<(u64, HostAction)> = cluster
                .program
                .actions()
                .iter()
                .map(|t| (t.scaled_time, t.action.clone()))
                .collect();
            let usage: Vec<u64> = core.channels.iter().map(|c| c.max_buffer_usage).collect();
            (cluster.period, cluster.scheduling_list.clone(), actions, usage)
        };
        let first = snapshot(&core);

        timing::analyse_sample_rates(&mut core, ClusterId(0), true).unwrap();
        generate_scheduling_list(&mut core, ClusterId(0)).unwrap();
        assert_eq!(snapshot(&core), first);

        let list = &core.clusters[0].scheduling_list;
        for obj in [p, c1, c2] {
            let ordinals: Vec<u64> = list.iter().filter(|e| e.obj == obj).map(|e| e.call).collect();
            let cpp = core.objects[obj.0].calls_per_period;
            assert_eq!(ordinals, (1..=cpp).collect::<Vec<_>>());
        }
        assert_eq!(list.len(), 5);
    }

    #[test]
    fn driver_delay_counts_as_available() {
        let mut core = SyncCore::default();
        let a = object(&mut core, "a");
        let b = object(&mut core, "b");
        let ch = core.add_channel("ab");
        core.add_port(b, PortSpec::from_peer("in", ch)).unwrap();
        core.add_port(a, PortSpec::to_peer("out", ch).delay(2)).unwrap();
        core.objects[a.0].set_timestep(Time::from_ticks(10));
        prepare(&mut core).unwrap();
        assert_eq!(calls(&core), vec!["a#1", "b#1"]);
        assert_eq!(core.channels[ch.0].max_buffer_usage, 3);
    }
}
