/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Human-readable summary of one scheduled cluster.

use std::fmt;

use crate::context::SyncCore;
use crate::error::SyncError;
use crate::sync::ClusterId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberLine {
    pub name: String,
    pub calls_per_period: u64,
    pub timestep: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelLine {
    pub name: String,
    pub samples_per_period: u64,
    pub max_buffer_usage: u64,
}

/// Snapshot of a cluster's timing and schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleReport {
    pub cluster: ClusterId,
    pub period: String,
    pub scaled_lcm: u64,
    pub members: Vec<MemberLine>,
    pub channels: Vec<ChannelLine>,
    /// `name#call` in execution order.
    pub calls: Vec<String>,
    pub host_reads: usize,
    pub host_writes: usize,
}

impl ScheduleReport {
    pub fn from_core(core: &SyncCore, cid: ClusterId) -> Result<Self, SyncError> {
        let cluster = core.cluster(cid)?;
        let resolution = &core.config.time_resolution;

        let mut members = Vec::with_capacity(cluster.objects.len());
        for &obj in &cluster.objects {
            let o = core.object(obj)?;
            members.push(MemberLine {
                name: o.name.clone(),
                calls_per_period: o.calls_per_period,
                timestep: resolution.format(o.timestep()),
            });
        }
        let mut channels = Vec::with_capacity(cluster.channels.len());
        for &ch in &cluster.channels {
            let c = core.channel(ch)?;
            channels.push(ChannelLine {
                name: c.name.clone(),
                samples_per_period: c.samples_per_period,
                max_buffer_usage: c.max_buffer_usage,
            });
        }
        let calls = cluster
            .scheduling_list
            .iter()
            .map(|e| format!("{}#{}", core.object_name(e.obj), e.call))
            .collect();

        Ok(Self {
            cluster: cid,
            period: resolution.format(cluster.period),
            scaled_lcm: cluster.scaled_lcm,
            members,
            channels,
            calls,
            host_reads: cluster.program.reads(),
            host_writes: cluster.program.writes(),
        })
    }
}

impl fmt::Display for ScheduleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "cluster {}: period {}, {} objects, scaled timebase {}",
            self.cluster,
            self.period,
            self.members.len(),
            self.scaled_lcm
        )?;
        let width = self.members.iter().map(|m| m.name.len()).max().unwrap_or(6).max(6);
        writeln!(f, "  {:<width$}  {:>5}  timestep", "object", "calls")?;
        for m in &self.members {
            writeln!(f, "  {:<width$}  {:>5}  {}", m.name, m.calls_per_period, m.timestep)?;
        }
        for c in &self.channels {
            writeln!(
                f,
                "  channel {}: {} samples per period, max buffer {}",
                c.name, c.samples_per_period, c.max_buffer_usage
            )?;
        }
        writeln!(f, "  schedule: {}", self.calls.join(" "))?;
        write!(
            f,
            "  host actions: {} reads, {} writes",
            self.host_reads, self.host_writes
        )
    }
}
