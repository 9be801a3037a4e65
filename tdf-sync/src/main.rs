/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use tdf_sync::config::topology::{Topology, TopologyFile};
use tdf_sync::sync::ClusterId;
use tdf_sync::SyncConfig;

// ── CLI argument definition ───────────────────────────────────────────────────

/// Elaborate a timed-dataflow topology, print its cluster schedules and
/// optionally simulate it on the local kernel.
///
/// Example:
///   tdf-sync --topology demos/chain.yaml --config sync.yaml --run-until 100ns
#[derive(Debug, Parser)]
#[command(
    name = "tdf-sync",
    about = "Timed-dataflow cluster scheduler",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML topology file.
    #[arg(short = 't', long = "topology")]
    topology: PathBuf,

    /// Path to the YAML scheduler configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Simulate up to this time (e.g. "100ns") and print the host signals.
    #[arg(short = 'r', long = "run-until")]
    run_until: Option<String>,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    info!(
        topology  = %cli.topology.display(),
        config    = ?cli.config,
        run_until = ?cli.run_until,
        "Configuration"
    );

    if let Err(e) = run(&cli) {
        error!("{:#}", e);
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    // ── Load configuration ────────────────────────────────────────────────────
    let config = match &cli.config {
        Some(path) => SyncConfig::load_from_file(path)?,
        None => {
            warn!("No scheduler configuration file provided, using default settings");
            SyncConfig::default()
        }
    };
    let resolution = config.time_resolution;

    // ── Build and elaborate ───────────────────────────────────────────────────
    let Topology {
        mut session,
        mut kernel,
        signals,
    } = TopologyFile::load_from_file(&cli.topology)?.build(config)?;

    session.elaborate().context("elaboration failed")?;

    for c in 0..session.cluster_count() {
        println!("{}", session.report(ClusterId(c))?);
    }

    // ── Simulate ──────────────────────────────────────────────────────────────
    let Some(until) = &cli.run_until else {
        return Ok(());
    };
    let end = resolution
        .parse_time(until)
        .map_err(|e| anyhow!("--run-until: {e}"))?;

    let summary = session.run_until(&mut kernel, end).context("simulation failed")?;
    session.terminate();
    info!(
        end = %resolution.format(summary.end_time),
        resumptions = summary.resumptions,
        deltas = summary.deltas,
        "simulation finished"
    );

    // Sort by name for deterministic output
    let mut sorted: Vec<_> = signals.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    for (name, id) in sorted {
        let writes = kernel.writes(*id);
        if writes.is_empty() {
            continue;
        }
        println!("signal {name}:");
        for (t, v) in writes {
            println!("  {:>12}  {v}", resolution.format(*t));
        }
    }
    Ok(())
}
