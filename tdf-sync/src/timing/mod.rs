/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Rate and timing analysis of one cluster.
//!
//! [`analyse_sample_rates`] derives, with exact integer arithmetic only:
//!
//! | Result | Stored in |
//! |---|---|
//! | calls per period of every member | `SyncObject::calls_per_period` |
//! | samples per period of every channel | `Channel::samples_per_period` |
//! | cluster period and maximum period | `Cluster::period`, `Cluster::max_period` |
//! | interval of every object and port | `AttributeCell::assigned` |
//! | scaled timebase of one period | `Cluster::scaled_lcm` |
//!
//! Calls per period come from a single forward pass in cluster order.  The
//! pass keeps a running multiplier: every value is stored together with the
//! multiplier current when it was recorded, and is rescaled to the latest
//! multiplier when read.  The cluster builder's breadth-first order
//! guarantees every member after the first has an analysed neighbour.
//!
//! The same function re-runs on a single cluster when attributes change at
//! run time.  In that case only timesteps changed since the previous
//! analysis (and a requested fixed period) anchor the new period.

pub mod math;

use tracing::{debug, error, info};

use crate::context::SyncCore;
use crate::error::SyncError;
use crate::sync::object::OBJECT_CELL;
use crate::sync::port::CellId;
use crate::sync::{ChannelId, ClusterId, ObjId};
use crate::time::Time;

use math::{gcd_of, lcm_bounded, lcm_of, mul_bounded};

// ── Timestep assignments ──────────────────────────────────────────────────────

/// An interval fixed by one object or port, with the number of such
/// intervals in one cluster period.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Assignment {
    source: String,
    interval: Time,
    samples: u64,
}

impl Assignment {
    fn period(&self) -> Option<Time> {
        self.interval.checked_mul(self.samples)
    }
}

/// A period upper bound and where it comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Bound {
    source: String,
    period: Time,
}

/// A peer port as the rate pass sees it.
struct PeerPort {
    channel: ChannelId,
    name: String,
    rate: u64,
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Analyse sample rates and timing of cluster `cid`.
pub fn analyse_sample_rates(
    core: &mut SyncCore,
    cid: ClusterId,
    rescheduling: bool,
) -> Result<(), SyncError> {
    let (objects, channels) = {
        let c = core.cluster(cid)?;
        (c.objects.clone(), c.channels.clone())
    };
    if objects.is_empty() {
        return Ok(());
    }

    assign_calls_per_period(core, cid, &objects, &channels)?;
    let period = assign_timing(core, cid, &objects, rescheduling)?;

    let limit = core.config.max_sample_count;
    let mut counts = Vec::new();
    for &obj in &objects {
        let o = core.object(obj)?;
        counts.push(o.calls_per_period);
        for p in o.ports.iter().filter(|p| p.direction.is_host()) {
            let rate = o.cells.get(p.cell).map_or(1, |c| c.rate);
            counts.push(o.calls_per_period.saturating_mul(rate));
        }
    }
    let scaled_lcm = lcm_of(counts, limit)
        .map_err(|_| bad_conditioned(core, cid, &objects, objects[0]))?;

    let analysis_id = core.exec_id;
    let cluster = core.cluster_mut(cid)?;
    cluster.scaled_lcm = scaled_lcm;
    cluster.sync.analysis_id = analysis_id;
    info!(
        cluster = cid.0,
        period = %period,
        scaled_lcm,
        objects = objects.len(),
        "sample rates analysed"
    );
    Ok(())
}

// ── Calls per period ──────────────────────────────────────────────────────────

fn bad_conditioned(core: &SyncCore, cid: ClusterId, objects: &[ObjId], at: ObjId) -> SyncError {
    let err = SyncError::BadConditionedCluster {
        cluster: cid.0,
        object: core.object_name(at),
        limit: core.config.max_sample_count,
        members: core.member_list(objects),
    };
    error!("{err}");
    err
}

fn peer_ports(core: &SyncCore, obj: ObjId) -> Result<Vec<PeerPort>, SyncError> {
    let o = core.object(obj)?;
    Ok(o.ports
        .iter()
        .filter_map(|p| {
            let channel = p.channel()?;
            Some(PeerPort {
                channel,
                name: p.name.clone(),
                rate: o.cells.get(p.cell).map_or(0, |c| c.rate),
            })
        })
        .collect())
}

/// `value` recorded at multiplier `at`, expressed at multiplier `now`.
fn rescale(value: u64, at: u64, now: u64, limit: u64) -> Option<u64> {
    if at == 0 {
        return None;
    }
    mul_bounded(value, now / at, limit).ok()
}

fn assign_calls_per_period(
    core: &mut SyncCore,
    cid: ClusterId,
    objects: &[ObjId],
    channels: &[ChannelId],
) -> Result<(), SyncError> {
    let limit = core.config.max_sample_count;
    for &obj in objects {
        let o = core.object_mut(obj)?;
        o.calls_per_period = 0;
        o.multiple = 0;
    }
    for &ch in channels {
        let c = core.channel_mut(ch)?;
        c.samples_per_period = 0;
        c.multiple = 0;
    }

    let mut multiple: u64 = 1;
    for (position, &obj) in objects.iter().enumerate() {
        let ports = peer_ports(core, obj)?;

        let mut calls = 1;
        if position > 0 {
            let anchor = ports.iter().find(|p| {
                core.channel(p.channel)
                    .map(|c| c.multiple != 0)
                    .unwrap_or(false)
            });
            if let Some(anchor) = anchor {
                let ch = core.channel(anchor.channel)?;
                let samples = rescale(ch.samples_per_period, ch.multiple, multiple, limit)
                    .ok_or_else(|| bad_conditioned(core, cid, objects, obj))?;
                let l = lcm_bounded(samples, anchor.rate, limit)
                    .map_err(|_| bad_conditioned(core, cid, objects, obj))?;
                multiple = mul_bounded(multiple, l / samples, limit)
                    .map_err(|_| bad_conditioned(core, cid, objects, obj))?;
                calls = l / anchor.rate;
            }
        }

        {
            let o = core.object_mut(obj)?;
            o.calls_per_period = calls;
            o.multiple = multiple;
        }

        for port in &ports {
            let required = mul_bounded(calls, port.rate, limit)
                .map_err(|_| bad_conditioned(core, cid, objects, obj))?;
            let ch = core.channel(port.channel)?;
            if ch.multiple == 0 {
                let ch = core.channel_mut(port.channel)?;
                ch.samples_per_period = required;
                ch.multiple = multiple;
                continue;
            }
            let actual = rescale(ch.samples_per_period, ch.multiple, multiple, limit)
                .ok_or_else(|| bad_conditioned(core, cid, objects, obj))?;
            if actual != required {
                let err = SyncError::InconsistentRates {
                    channel: ch.name.clone(),
                    object: core.object_name(obj),
                    port: port.name.clone(),
                    required,
                    actual,
                };
                error!(cluster = cid.0, "{err}");
                return Err(err);
            }
        }
    }

    // ── Finalize at the last multiplier, reduced by the common divisor ───────
    let mut finals = Vec::with_capacity(objects.len());
    for &obj in objects {
        let o = core.object(obj)?;
        let value = rescale(o.calls_per_period, o.multiple, multiple, limit)
            .ok_or_else(|| bad_conditioned(core, cid, objects, obj))?;
        finals.push(value);
    }
    let divisor = gcd_of(finals.iter().copied()).max(1);
    for (&obj, value) in objects.iter().zip(finals) {
        let o = core.object_mut(obj)?;
        o.calls_per_period = value / divisor;
        o.multiple = 1;
        debug!(object = %o.name, calls_per_period = o.calls_per_period, "calls per period");
    }

    for &ch in channels {
        let samples = match core.channel(ch)?.driver() {
            Some(d) => {
                let cpp = core.object(d.obj)?.calls_per_period;
                cpp * core.port_cell(d)?.rate
            }
            None => 0,
        };
        let c = core.channel_mut(ch)?;
        c.samples_per_period = samples;
        c.multiple = 1;
    }
    Ok(())
}

// ── Period and intervals ──────────────────────────────────────────────────────

fn collect_assignments(
    core: &SyncCore,
    objects: &[ObjId],
    rescheduling: bool,
    analysis_id: u64,
) -> Result<Vec<Assignment>, SyncError> {
    let mut out = Vec::new();
    for &obj in objects {
        let o = core.object(obj)?;
        let cpp = o.calls_per_period;
        let changed = |cell: CellId| {
            !rescheduling || o.cells.get(cell).is_some_and(|c| c.change_id > analysis_id)
        };

        if let Some(t) = o.cells.get(OBJECT_CELL).and_then(|c| c.timestep) {
            if changed(OBJECT_CELL) {
                out.push(Assignment {
                    source: o.name.clone(),
                    interval: t,
                    samples: cpp,
                });
            }
        }
        for p in &o.ports {
            let Some(cell) = o.cells.get(p.cell) else {
                continue;
            };
            if let Some(t) = cell.timestep {
                if changed(p.cell) {
                    out.push(Assignment {
                        source: format!("{}.{}", o.name, p.name),
                        interval: t,
                        samples: cpp.saturating_mul(cell.rate),
                    });
                }
            }
        }
    }
    Ok(out)
}

/// Whether two assignments describe the same period within `tolerance`
/// ticks of the finer interval.
fn consistent(a: &Assignment, b: &Assignment, tolerance: u64) -> bool {
    let pa = a.interval.ticks() as u128 * a.samples as u128;
    let pb = b.interval.ticks() as u128 * b.samples as u128;
    let diff = pa.abs_diff(pb);
    diff <= tolerance as u128 * a.samples.max(b.samples) as u128
}

fn assign_timing(
    core: &mut SyncCore,
    cid: ClusterId,
    objects: &[ObjId],
    rescheduling: bool,
) -> Result<Time, SyncError> {
    let (analysis_id, previous, fixed_request, max_request) = {
        let c = core.cluster(cid)?;
        (
            c.sync.analysis_id,
            c.period,
            c.sync.requested_fixed_period,
            c.sync.requested_max_period,
        )
    };

    let mut assignments = collect_assignments(core, objects, rescheduling, analysis_id)?;
    if let Some(req) = fixed_request {
        assignments.push(Assignment {
            source: format!("{} (requested period)", core.object_name(req.by)),
            interval: req.period,
            samples: 1,
        });
    }

    // ── Fixed period ──────────────────────────────────────────────────────────
    let mut fixed: Option<Assignment> = None;
    for a in &assignments {
        if fixed.as_ref().map_or(true, |f| a.samples < f.samples) {
            fixed = Some(a.clone());
        }
    }
    let tolerance = core.config.timestep_tolerance_ticks;
    if let Some(reference) = &fixed {
        for a in &assignments {
            if consistent(reference, a, tolerance) {
                continue;
            }
            let first_period = reference.period().unwrap_or(Time::MAX);
            let expected = first_period
                .scale(1, a.samples)
                .map(|t| core.config.time_resolution.format(t))
                .unwrap_or_default();
            let err = SyncError::InconsistentTimestep {
                first: reference.source.clone(),
                first_period,
                second: a.source.clone(),
                second_period: a.period().unwrap_or(Time::MAX),
                expected,
                members: core.member_list(objects),
            };
            error!(cluster = cid.0, "{err}");
            return Err(err);
        }
    }
    let fixed_period = match &fixed {
        Some(a) => Some(
            a.period()
                .ok_or_else(|| bad_conditioned(core, cid, objects, objects[0]))?,
        ),
        None => None,
    };

    // ── Maximum period ────────────────────────────────────────────────────────
    let mut max: Option<Bound> = None;
    let mut offer = |bound: Bound| {
        if max.as_ref().map_or(true, |m| bound.period < m.period) {
            max = Some(bound);
        }
    };
    for &obj in objects {
        let o = core.object(obj)?;
        if let Some(mt) = o.max_timestep {
            offer(Bound {
                source: o.name.clone(),
                period: mt.checked_mul(o.calls_per_period).unwrap_or(Time::MAX),
            });
        }
    }
    if let Some(req) = max_request {
        offer(Bound {
            source: format!("{} (requested maximum period)", core.object_name(req.by)),
            period: req.period,
        });
    }

    let period = match (fixed_period, &max) {
        (Some(f), Some(m)) if f > m.period => {
            let err = SyncError::TimestepAboveMaximum {
                period: f,
                source_name: fixed.map(|a| a.source).unwrap_or_default(),
                max_period: m.period,
                max_source: m.source.clone(),
            };
            error!(cluster = cid.0, "{err}");
            return Err(err);
        }
        (Some(f), _) => f,
        (None, m) if rescheduling && !previous.is_zero() => {
            m.as_ref().map_or(previous, |m| previous.min(m.period))
        }
        (None, Some(m)) => m.period,
        (None, None) => {
            let err = SyncError::NoTimestep {
                cluster: cid.0,
                members: core.member_list(objects),
            };
            error!("{err}");
            return Err(err);
        }
    };

    // ── Intervals ─────────────────────────────────────────────────────────────
    for &obj in objects {
        let o = core.object_mut(obj)?;
        let cpp = o.calls_per_period;
        let name = o.name.clone();
        let underflow = |port: &str, samples: u64| SyncError::TimestepUnderflow {
            object: name.clone(),
            port: port.to_string(),
            period,
            samples,
        };

        let interval = period.scale(1, cpp).unwrap_or(Time::ZERO);
        if interval.is_zero() {
            let err = underflow("<object>", cpp);
            error!(cluster = cid.0, "{err}");
            return Err(err);
        }
        if let Some(cell) = o.cells.get_mut(OBJECT_CELL) {
            cell.assigned = interval;
        }
        for i in 0..o.ports.len() {
            let cell_id = o.ports[i].cell;
            let Some(cell) = o.cells.get_mut(cell_id) else {
                continue;
            };
            let samples = cpp.saturating_mul(cell.rate);
            let interval = period.scale(1, samples).unwrap_or(Time::ZERO);
            if interval.is_zero() {
                let err = underflow(&o.ports[i].name, samples);
                error!(cluster = cid.0, "{err}");
                return Err(err);
            }
            cell.assigned = interval;
        }
    }

    let cluster = core.cluster_mut(cid)?;
    cluster.period = period;
    cluster.max_period = max.map(|m| m.period);
    cluster.sync.requested_fixed_period = None;
    Ok(period)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
