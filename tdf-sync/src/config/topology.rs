/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! YAML description of a dataflow topology.
//!
//! The expected YAML structure is:
//! ```yaml
//! signals:
//!   - name: stimulus
//!     initial: 0.0
//!     ramp: 0.5            # value += ramp per tick (optional)
//!   - name: result
//! objects:
//!   - name: src
//!     kind: signal-flow    # default
//!     behavior: affine     # passthrough | affine | counter
//!     gain: 2.0
//!     ports:
//!       - { name: in, direction: from-host, signal: stimulus, timestep: "10ns" }
//!       - { name: out, direction: to-peer, channel: s1 }
//!   - name: sink
//!     ports:
//!       - { name: in, direction: from-peer, channel: s1, rate: 2, delay: 1 }
//!       - { name: out, direction: to-host, signal: result }
//! ```
//! Channels are created on first reference.  `rate` defaults to 1 and
//! `delay` to 0.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::error::StepError;
use crate::host::{LocalKernel, SignalId};
use crate::processing::ProcessingContext;
use crate::session::Session;
use crate::sync::{ChannelId, Passthrough, PortSpec, SolverKind, SyncBehavior};
use crate::time::{Time, TimeResolution};

// ── YAML types ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TopologyFile {
    #[serde(default)]
    pub signals: Vec<SignalEntry>,
    pub objects: Vec<ObjectEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignalEntry {
    pub name: String,
    #[serde(default)]
    pub initial: f64,
    pub ramp: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BehaviorKind {
    #[default]
    Passthrough,
    Affine,
    Counter,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectEntry {
    pub name: String,
    pub kind: Option<String>,
    #[serde(default)]
    pub behavior: BehaviorKind,
    #[serde(default = "default_gain")]
    pub gain: f64,
    #[serde(default)]
    pub offset: f64,
    pub timestep: Option<String>,
    pub max_timestep: Option<String>,
    #[serde(default)]
    pub ports: Vec<PortEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DirectionEntry {
    ToPeer,
    FromPeer,
    ToHost,
    FromHost,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PortEntry {
    pub name: String,
    pub direction: DirectionEntry,
    pub channel: Option<String>,
    pub signal: Option<String>,
    #[serde(default = "default_rate")]
    pub rate: u64,
    #[serde(default)]
    pub delay: u64,
    pub timestep: Option<String>,
}

fn default_gain() -> f64 {
    1.0
}

fn default_rate() -> u64 {
    1
}

// ── Built-in behaviors ────────────────────────────────────────────────────────

/// `gain * x + offset` of the first input, sample by sample.
#[derive(Debug, Clone, Copy)]
pub struct Affine {
    pub gain: f64,
    pub offset: f64,
}

impl SyncBehavior for Affine {
    fn processing(&mut self, ctx: &mut ProcessingContext<'_>) -> Result<(), StepError> {
        let input = ctx.input_ports().first().copied();
        for out in ctx.output_ports() {
            let rate = ctx.rate(out)?;
            for i in 0..rate {
                let x = match input {
                    Some(inp) => ctx.read(inp, i % ctx.rate(inp)?)?,
                    None => 0.0,
                };
                ctx.write(out, i, self.gain * x + self.offset)?;
            }
        }
        Ok(())
    }
}

/// Writes its own call counter to every output sample.
#[derive(Debug, Clone, Copy, Default)]
pub struct Counter;

impl SyncBehavior for Counter {
    fn processing(&mut self, ctx: &mut ProcessingContext<'_>) -> Result<(), StepError> {
        let value = ctx.call_counter() as f64;
        for out in ctx.output_ports() {
            for i in 0..ctx.rate(out)? {
                ctx.write(out, i, value)?;
            }
        }
        Ok(())
    }
}

// ── Building ──────────────────────────────────────────────────────────────────

/// A session built from a topology, with the kernel holding its signals.
pub struct Topology {
    pub session: Session,
    pub kernel: LocalKernel,
    pub signals: HashMap<String, SignalId>,
}

fn parse_time(resolution: &TimeResolution, value: &str, what: &str) -> Result<Time> {
    resolution
        .parse_time(value)
        .map_err(|e| anyhow!("{what}: {e}"))
}

impl TopologyFile {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading topology from: {}", path.display());
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open topology file: {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse YAML file: {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Create the session and the kernel signals.  The session is not yet
    /// elaborated.
    pub fn build(&self, config: SyncConfig) -> Result<Topology> {
        let resolution = config.time_resolution;
        let mut session = Session::new(config);
        let mut kernel = LocalKernel::new();

        let mut signals = HashMap::new();
        for s in &self.signals {
            if signals.contains_key(&s.name) {
                bail!("signal '{}' is declared twice", s.name);
            }
            let id = kernel.add_signal(s.name.clone(), s.initial);
            if let Some(ramp) = s.ramp {
                let initial = s.initial;
                kernel.drive(id, move |t| initial + ramp * t.ticks() as f64);
            }
            signals.insert(s.name.clone(), id);
        }

        let mut channels: HashMap<String, ChannelId> = HashMap::new();
        for o in &self.objects {
            let kind = match &o.kind {
                Some(k) => k.parse::<SolverKind>().map_err(|e| anyhow!("object '{}': {e}", o.name))?,
                None => SolverKind::default(),
            };
            let behavior: Box<dyn SyncBehavior> = match o.behavior {
                BehaviorKind::Passthrough => Box::new(Passthrough),
                BehaviorKind::Affine => Box::new(Affine {
                    gain: o.gain,
                    offset: o.offset,
                }),
                BehaviorKind::Counter => Box::new(Counter),
            };
            let obj = session.add_object(&o.name, kind, behavior)?;

            if let Some(t) = &o.timestep {
                let t = parse_time(&resolution, t, &format!("timestep of '{}'", o.name))?;
                session.object_mut(obj)?.set_timestep(t);
            }
            if let Some(t) = &o.max_timestep {
                let t = parse_time(&resolution, t, &format!("max_timestep of '{}'", o.name))?;
                session.object_mut(obj)?.set_max_timestep(t);
            }

            for p in &o.ports {
                let what = format!("port '{}.{}'", o.name, p.name);
                let mut spec = match p.direction {
                    DirectionEntry::ToPeer | DirectionEntry::FromPeer => {
                        let name = p
                            .channel
                            .as_ref()
                            .ok_or_else(|| anyhow!("{what} needs a channel"))?;
                        let ch = *channels
                            .entry(name.clone())
                            .or_insert_with(|| session.add_channel(name));
                        if p.direction == DirectionEntry::ToPeer {
                            PortSpec::to_peer(p.name.clone(), ch)
                        } else {
                            PortSpec::from_peer(p.name.clone(), ch)
                        }
                    }
                    DirectionEntry::ToHost | DirectionEntry::FromHost => {
                        let name = p
                            .signal
                            .as_ref()
                            .ok_or_else(|| anyhow!("{what} needs a signal"))?;
                        let sig = *signals
                            .get(name)
                            .ok_or_else(|| anyhow!("{what} refers to unknown signal '{name}'"))?;
                        if p.direction == DirectionEntry::ToHost {
                            PortSpec::to_host(p.name.clone(), sig)
                        } else {
                            PortSpec::from_host(p.name.clone(), sig)
                        }
                    }
                };
                spec = spec.rate(p.rate).delay(p.delay);
                if let Some(t) = &p.timestep {
                    spec = spec.timestep(parse_time(&resolution, t, &what)?);
                }
                session.add_port(obj, spec)?;
            }
            debug!(object = %o.name, ports = o.ports.len(), "object built");
        }

        info!(
            objects = self.objects.len(),
            channels = channels.len(),
            signals = signals.len(),
            "topology built"
        );
        Ok(Topology {
            session,
            kernel,
            signals,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    use crate::sync::ClusterId;

    const CHAIN: &str = r#"
signals:
  - name: stimulus
    initial: 1.0
  - name: result
objects:
  - name: src
    behavior: affine
    gain: 2.0
    ports:
      - { name: in, direction: from-host, signal: stimulus, timestep: "10ns" }
      - { name: out, direction: to-peer, channel: s1 }
  - name: sink
    ports:
      - { name: in, direction: from-peer, channel: s1 }
      - { name: out, direction: to-host, signal: result }
"#;

    #[test]
    fn chain_builds_and_runs() {
        let f = {
            let mut f = NamedTempFile::new().unwrap();
            f.write_all(CHAIN.as_bytes()).unwrap();
            f
        };
        let topo = TopologyFile::load_from_file(f.path()).unwrap();
        let Topology {
            mut session,
            mut kernel,
            signals,
        } = topo.build(SyncConfig::default()).unwrap();

        session.elaborate().unwrap();
        assert_eq!(session.cluster_count(), 1);
        assert_eq!(session.core().cluster(ClusterId(0)).unwrap().period(), Time::from_ticks(10_000));

        session.run_until(&mut kernel, Time::from_ticks(20_000)).unwrap();
        let writes = kernel.writes(signals["result"]);
        assert_eq!(writes.len(), 3);
        assert!(writes.iter().all(|&(_, v)| v == 2.0));
    }

    #[test]
    fn defaults_apply_to_ports() {
        let topo = TopologyFile::from_yaml(CHAIN).unwrap();
        let port = &topo.objects[1].ports[0];
        assert_eq!(port.rate, 1);
        assert_eq!(port.delay, 0);
        assert_eq!(topo.objects[1].behavior, BehaviorKind::Passthrough);
    }

    #[test]
    fn unknown_signal_is_an_error() {
        let yaml = r#"
objects:
  - name: a
    ports:
      - { name: in, direction: from-host, signal: nowhere }
"#;
        let topo = TopologyFile::from_yaml(yaml).unwrap();
        let err = topo.build(SyncConfig::default()).err().unwrap();
        assert!(err.to_string().contains("unknown signal 'nowhere'"));
    }

    #[test]
    fn peer_port_without_channel_is_an_error() {
        let yaml = r#"
objects:
  - name: a
    ports:
      - { name: out, direction: to-peer }
"#;
        let topo = TopologyFile::from_yaml(yaml).unwrap();
        assert!(topo.build(SyncConfig::default()).is_err());
    }

    #[test]
    fn bad_kind_is_an_error() {
        let yaml = "objects:\n  - name: a\n    kind: quantum\n";
        let topo = TopologyFile::from_yaml(yaml).unwrap();
        let err = topo.build(SyncConfig::default()).err().unwrap();
        assert!(err.to_string().contains("unknown solver kind"));
    }

    #[test]
    fn ramp_signal_follows_time() {
        let yaml = r#"
signals:
  - { name: r, initial: 1.0, ramp: 0.5 }
objects: []
"#;
        let topo = TopologyFile::from_yaml(yaml).unwrap().build(SyncConfig::default()).unwrap();
        let r = topo.signals["r"];
        assert_eq!(topo.kernel.signal_value(r), Some(1.0));
    }
}
