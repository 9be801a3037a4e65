/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Scheduler configuration and topology files.
//!
//! [`SyncConfig`] holds the numeric limits of the scheduler.  The expected
//! YAML structure is:
//! ```yaml
//! time_resolution: "1ps"
//! timestep_tolerance_ticks: 2
//! max_sample_count: 1000000
//! max_reported_members: 10
//! ```
//! Every field is optional; missing values fall back to [`SyncConfig::default`].
//!
//! [`topology`] describes objects, ports and channels in YAML so a session
//! can be built without Rust code.

pub mod topology;

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::time::TimeResolution;

// ── Defaults ──────────────────────────────────────────────────────────────────

/// Allowed deviation, in ticks per sample, between two timestep assignments.
const DEFAULT_TOLERANCE_TICKS: u64 = 2;

/// Largest sample count per period before a cluster is rejected.
const DEFAULT_MAX_SAMPLE_COUNT: u64 = i64::MAX as u64;

/// Names listed in an error message before the rest is summarised.
const DEFAULT_MAX_REPORTED_MEMBERS: usize = 10;

fn default_tolerance() -> u64 {
    DEFAULT_TOLERANCE_TICKS
}

fn default_max_sample_count() -> u64 {
    DEFAULT_MAX_SAMPLE_COUNT
}

fn default_max_reported_members() -> usize {
    DEFAULT_MAX_REPORTED_MEMBERS
}

// ── SyncConfig ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Length of one tick.
    #[serde(default)]
    pub time_resolution: TimeResolution,
    #[serde(default = "default_tolerance")]
    pub timestep_tolerance_ticks: u64,
    #[serde(default = "default_max_sample_count")]
    pub max_sample_count: u64,
    #[serde(default = "default_max_reported_members")]
    pub max_reported_members: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            time_resolution: TimeResolution::default(),
            timestep_tolerance_ticks: DEFAULT_TOLERANCE_TICKS,
            max_sample_count: DEFAULT_MAX_SAMPLE_COUNT,
            max_reported_members: DEFAULT_MAX_REPORTED_MEMBERS,
        }
    }
}

impl SyncConfig {
    /// Parses `path` into a configuration.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, if the YAML is
    /// structurally invalid or if a value is out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading scheduler configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;
        let config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?;

        debug!(
            resolution = %config.time_resolution.describe(),
            tolerance = config.timestep_tolerance_ticks,
            max_sample_count = config.max_sample_count,
            "configuration loaded"
        );
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        // An empty document means "all defaults".
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: SyncConfig = serde_yaml::from_str(content)?;
        if config.max_sample_count == 0 {
            anyhow::bail!("max_sample_count must be at least 1");
        }
        Ok(config)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
