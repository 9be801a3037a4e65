/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The simulation context shared by every scheduler component.
//!
//! [`SyncCore`] owns all synchronization objects, channels and clusters of
//! one session together with the registration list and the global
//! execution-id counter.  It is created by [`crate::Session`] and passed by
//! reference to the cluster builder, the rate analyzer, the list scheduler
//! and the state machine.  Nothing in the crate keeps process-wide state.

use tracing::debug;

use crate::cluster::Cluster;
use crate::config::SyncConfig;
use crate::error::{truncated_list, SyncError};
use crate::sync::port::{AttributeCell, PortDirection, PortLink, PortRef, PortSpec, SyncPort};
use crate::sync::{Channel, ChannelId, ClusterId, ObjId, SolverKind, SyncObject};

#[derive(Debug, Default)]
pub struct SyncCore {
    pub(crate) config: SyncConfig,
    pub(crate) objects: Vec<SyncObject>,
    pub(crate) channels: Vec<Channel>,
    pub(crate) clusters: Vec<Cluster>,
    /// Master registration list.  Objects must appear here exactly once to
    /// be scheduled.
    pub(crate) registered: Vec<ObjId>,
    /// Globally unique, strictly increasing activation counter.
    pub(crate) exec_id: u64,
}

impl SyncCore {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // ── Construction ──────────────────────────────────────────────────────────

    /// Create an object without registering it.
    pub(crate) fn insert_object(&mut self, name: &str, kind: SolverKind) -> ObjId {
        let id = ObjId(self.objects.len());
        self.objects.push(SyncObject::new(id, name.to_string(), kind));
        debug!(object = %name, kind = kind.label(), "object created");
        id
    }

    pub(crate) fn register(&mut self, obj: ObjId) -> Result<(), SyncError> {
        self.object(obj)?;
        self.registered.push(obj);
        Ok(())
    }

    pub(crate) fn add_channel(&mut self, name: &str) -> ChannelId {
        let id = ChannelId(self.channels.len());
        self.channels.push(Channel::new(id, name.to_string()));
        id
    }

    /// Attach a port to `obj`, allocating its attribute cell and connecting
    /// it to its channel as driver (`ToPeer`) or reader (`FromPeer`).
    pub(crate) fn add_port(&mut self, obj: ObjId, spec: PortSpec) -> Result<PortRef, SyncError> {
        if let PortLink::Channel(ch) = spec.link {
            self.channel(ch)?;
        }
        let object = self.object_mut(obj)?;
        let cell = object.cells.alloc(AttributeCell {
            rate: spec.rate,
            delay: spec.delay,
            timestep: spec.timestep,
            ..Default::default()
        });
        let index = object.ports.len();
        object
            .ports
            .push(SyncPort::new(spec.name, spec.direction, spec.link, cell));
        let port = PortRef { obj, index };

        if let PortLink::Channel(ch) = spec.link {
            let channel = self.channel_mut(ch)?;
            match spec.direction {
                PortDirection::ToPeer => channel.drivers.push(port),
                _ => channel.readers.push(port),
            }
        }
        Ok(port)
    }

    // ── Lookup ────────────────────────────────────────────────────────────────

    pub fn object(&self, id: ObjId) -> Result<&SyncObject, SyncError> {
        self.objects.get(id.0).ok_or(SyncError::UnknownHandle {
            what: "object",
            index: id.0,
        })
    }

    pub(crate) fn object_mut(&mut self, id: ObjId) -> Result<&mut SyncObject, SyncError> {
        self.objects.get_mut(id.0).ok_or(SyncError::UnknownHandle {
            what: "object",
            index: id.0,
        })
    }

    pub fn channel(&self, id: ChannelId) -> Result<&Channel, SyncError> {
        self.channels.get(id.0).ok_or(SyncError::UnknownHandle {
            what: "channel",
            index: id.0,
        })
    }

    pub(crate) fn channel_mut(&mut self, id: ChannelId) -> Result<&mut Channel, SyncError> {
        self.channels.get_mut(id.0).ok_or(SyncError::UnknownHandle {
            what: "channel",
            index: id.0,
        })
    }

    pub fn cluster(&self, id: ClusterId) -> Result<&Cluster, SyncError> {
        self.clusters.get(id.0).ok_or(SyncError::UnknownHandle {
            what: "cluster",
            index: id.0,
        })
    }

    pub(crate) fn cluster_mut(&mut self, id: ClusterId) -> Result<&mut Cluster, SyncError> {
        self.clusters.get_mut(id.0).ok_or(SyncError::UnknownHandle {
            what: "cluster",
            index: id.0,
        })
    }

    pub fn objects(&self) -> &[SyncObject] {
        &self.objects
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn registered(&self) -> &[ObjId] {
        &self.registered
    }

    pub fn execution_id(&self) -> u64 {
        self.exec_id
    }

    pub fn port(&self, port: PortRef) -> Result<&SyncPort, SyncError> {
        let object = self.object(port.obj)?;
        object.ports.get(port.index).ok_or_else(|| SyncError::PortIndexOutOfRange {
            object: object.name.clone(),
            index: port.index,
        })
    }

    pub(crate) fn port_mut(&mut self, port: PortRef) -> Result<&mut SyncPort, SyncError> {
        let object = self.object_mut(port.obj)?;
        let name = object.name.clone();
        object
            .ports
            .get_mut(port.index)
            .ok_or(SyncError::PortIndexOutOfRange {
                object: name,
                index: port.index,
            })
    }

    /// Attribute cell behind a port.
    pub fn port_cell(&self, port: PortRef) -> Result<&AttributeCell, SyncError> {
        let cell = self.port(port)?.cell;
        let object = self.object(port.obj)?;
        object.cells.get(cell).ok_or_else(|| SyncError::PortIndexOutOfRange {
            object: object.name.clone(),
            index: port.index,
        })
    }

    // ── Diagnostics ───────────────────────────────────────────────────────────

    /// `"object.port"` for messages.
    pub fn port_name(&self, port: PortRef) -> String {
        match (self.object(port.obj), self.port(port)) {
            (Ok(o), Ok(p)) => format!("{}.{}", o.name, p.name),
            _ => format!("<port {}:{}>", port.obj.0, port.index),
        }
    }

    pub fn object_name(&self, obj: ObjId) -> String {
        self.object(obj)
            .map(|o| o.name.clone())
            .unwrap_or_else(|_| format!("<object {}>", obj.0))
    }

    /// Truncated, comma-separated names of `objects`.
    pub fn member_list(&self, objects: &[ObjId]) -> String {
        let names: Vec<String> = objects.iter().map(|&o| self.object_name(o)).collect();
        truncated_list(&names, self.config.max_reported_members)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
