/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! tdf-sync – cluster synchronization for timed-dataflow co-simulation
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── time          – tick-based time and time resolution
//! ├── sync/         – synchronization objects, ports, channels, attribute cells
//! ├── context       – SyncCore: the arena every other module works on
//! ├── graph/        – closed-graph check and clustering
//! ├── timing/       – rate analysis and timestep assignment
//! ├── schedule/     – static list scheduling and host-action programs
//! ├── cluster/      – per-cluster sync data and the execution state machine
//! ├── processing    – the context handed to solver callbacks
//! ├── hooks         – solver behaviors and trace callbacks
//! ├── host/         – host-kernel interface and the local reference kernel
//! ├── session       – build / elaborate / run lifecycle
//! ├── config/       – scheduler settings and YAML topologies
//! └── error         – SyncError, SolverWarning, StepError
//! ```

pub mod cluster;
pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod hooks;
pub mod host;
pub mod processing;
pub mod schedule;
pub mod session;
pub mod sync;
pub mod time;
pub mod timing;

pub use config::SyncConfig;
pub use error::{SolverWarning, StepError, SyncError};
pub use host::{HostKernel, LocalKernel, WaitCondition};
pub use processing::ProcessingContext;
pub use session::Session;
pub use sync::{PortSpec, SolverKind, SyncBehavior};
pub use time::{Time, TimeResolution};
