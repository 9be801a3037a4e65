/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Graph validation and cluster partitioning.
//!
//! [`check_closed_graph`] validates the structural invariants once:
//! every channel has exactly one driver and every object reachable through
//! a channel is registered exactly once.  [`cluster`] then partitions the
//! registered objects into maximal connected clusters with an explicit
//! breadth-first worklist, so graph size never bounds stack depth.
//!
//! Each object receives a graph order id: objects found downstream of the
//! seed (through a `ToPeer` port) get increasing ids, objects found upstream
//! get decreasing ids.  The list scheduler uses the id as a tie-break so
//! chains are scheduled front to back.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, error, info};

use crate::cluster::Cluster;
use crate::context::SyncCore;
use crate::error::SyncError;
use crate::sync::port::{PortDirection, PortRef};
use crate::sync::{ClusterId, ObjId};

// ── Validation ────────────────────────────────────────────────────────────────

/// Validate drivers and registration of every channel touched by a
/// registered object.
pub fn check_closed_graph(core: &SyncCore) -> Result<(), SyncError> {
    let mut listed: HashMap<ObjId, usize> = HashMap::new();
    for &obj in &core.registered {
        let count = listed.entry(obj).or_insert(0);
        *count += 1;
        if *count > 1 {
            let err = SyncError::ObjectListedTwice {
                object: core.object_name(obj),
            };
            error!("{err}");
            return Err(err);
        }
    }

    for &obj in &core.registered {
        for port in &core.object(obj)?.ports {
            let Some(ch) = port.channel() else {
                continue;
            };
            let channel = core.channel(ch)?;
            let names = |ports: &[PortRef]| -> String {
                let names: Vec<String> = ports.iter().map(|&p| core.port_name(p)).collect();
                names.join(", ")
            };
            match channel.drivers.len() {
                1 => {}
                0 => {
                    let err = SyncError::NoDriver {
                        channel: channel.name.clone(),
                        readers: names(&channel.readers),
                    };
                    error!("{err}");
                    return Err(err);
                }
                _ => {
                    let err = SyncError::MultipleDrivers {
                        channel: channel.name.clone(),
                        drivers: names(&channel.drivers),
                    };
                    error!("{err}");
                    return Err(err);
                }
            }
            for other in channel.ports() {
                if !listed.contains_key(&other.obj) {
                    let err = SyncError::ObjectNotInList {
                        object: core.object_name(other.obj),
                        channel: channel.name.clone(),
                    };
                    error!("{err}");
                    return Err(err);
                }
            }
        }
    }
    debug!(objects = core.registered.len(), "closed graph check passed");
    Ok(())
}

// ── Partitioning ──────────────────────────────────────────────────────────────

/// Partition the registered objects into clusters.
///
/// Any analysis state left from an earlier run is cleared first.  A port
/// with rate 0 marks its object, its channel peers and the cluster dead and
/// aborts with [`SyncError::ZeroRate`]; the dead cluster stays in the core
/// for diagnostics.
pub fn cluster(core: &mut SyncCore) -> Result<(), SyncError> {
    for obj in core.objects.iter_mut() {
        obj.reset_analysis();
    }
    for ch in core.channels.iter_mut() {
        ch.reset_analysis();
    }
    core.clusters.clear();

    let registered = core.registered.clone();
    for seed in registered {
        if core.object(seed)?.cluster.is_some() {
            continue;
        }
        let cid = ClusterId(core.clusters.len());
        let mut cluster = Cluster::new(cid);
        let result = move_connected_objs(core, &mut cluster, seed);
        info!(
            cluster = cid.0,
            objects = cluster.objects.len(),
            channels = cluster.channels.len(),
            "cluster created"
        );
        core.clusters.push(cluster);
        result?;
    }
    Ok(())
}

/// Breadth-first expansion from `seed` over peer ports in both directions.
fn move_connected_objs(
    core: &mut SyncCore,
    cluster: &mut Cluster,
    seed: ObjId,
) -> Result<(), SyncError> {
    let cid = cluster.id;
    let mut downstream: i64 = 0;
    let mut upstream: i64 = 0;
    let mut worklist = VecDeque::from([seed]);
    {
        let obj = core.object_mut(seed)?;
        obj.cluster = Some(cid);
        obj.graph_order = 0;
    }

    while let Some(current) = worklist.pop_front() {
        cluster.objects.push(current);
        debug!(cluster = cid.0, object = %core.object_name(current), "object joined cluster");

        let ports: Vec<(usize, PortDirection, Option<crate::sync::ChannelId>, u64)> = {
            let obj = core.object(current)?;
            obj.ports
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    let rate = obj.cells.get(p.cell).map_or(0, |c| c.rate);
                    (i, p.direction, p.channel(), rate)
                })
                .collect()
        };

        for (index, direction, channel, rate) in ports {
            if rate == 0 {
                return Err(zero_rate(core, cluster, &worklist, PortRef { obj: current, index }));
            }
            let Some(ch) = channel else {
                continue;
            };
            let peers: Vec<PortRef> = {
                let channel = core.channel_mut(ch)?;
                if channel.cluster.is_none() {
                    channel.cluster = Some(cid);
                    cluster.channels.push(ch);
                }
                channel.ports().collect()
            };
            for peer in peers {
                let obj = core.object_mut(peer.obj)?;
                if obj.cluster.is_some() {
                    continue;
                }
                obj.cluster = Some(cid);
                obj.graph_order = if direction == PortDirection::ToPeer {
                    downstream += 1;
                    downstream
                } else {
                    upstream -= 1;
                    upstream
                };
                worklist.push_back(peer.obj);
            }
        }
    }
    Ok(())
}

/// Mark everything touched by a zero-rate port dead and build the error.
fn zero_rate(
    core: &mut SyncCore,
    cluster: &mut Cluster,
    pending: &VecDeque<ObjId>,
    port: PortRef,
) -> SyncError {
    cluster.dead = true;
    let mut touched = vec![port.obj];
    if let Ok(p) = core.port(port) {
        if let Some(ch) = p.channel() {
            if let Ok(channel) = core.channel(ch) {
                touched.extend(channel.ports().map(|r| r.obj));
            }
        }
    }
    for obj in touched {
        if let Ok(o) = core.object_mut(obj) {
            o.dead = true;
        }
    }

    let mut members = cluster.objects.clone();
    members.extend(pending.iter().copied());
    let err = SyncError::ZeroRate {
        object: core.object_name(port.obj),
        port: core.port(port).map(|p| p.name.clone()).unwrap_or_default(),
        members: core.member_list(&members),
    };
    error!(cluster = cluster.id.0, "{err}");
    err
}

// ── Tests ─────────────────────────────────────────────────────────────────────
