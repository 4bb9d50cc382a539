//! Run reports.
//!
//! A single headless run ends with a human-readable summary on stdout
//! and, optionally, a JSON export of the full metrics (timestamped, with
//! the configuration that produced them) for downstream tooling.

use std::path::Path;

use chrono::Utc;
use fanetsim_config::SimulationConfig;
use fanetsim_engine::{RunMetrics, Simulator};
use serde::Serialize;

use crate::RunnerError;

/// The JSON export schema.
#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    /// Wall-clock timestamp of the export, RFC 3339.
    pub timestamp: String,
    pub config: &'a SimulationConfig,
    pub metrics: &'a RunMetrics,
}

pub fn write_json(
    config: &SimulationConfig,
    metrics: &RunMetrics,
    path: impl AsRef<Path>,
) -> Result<(), RunnerError> {
    let report = RunReport {
        timestamp: Utc::now().to_rfc3339(),
        config,
        metrics,
    };
    let file = std::fs::File::create(path)?;
    serde_json::to_writer_pretty(file, &report)?;
    Ok(())
}

/// Prints the headline numbers of a finished run.
pub fn print_summary(sim: &Simulator) {
    let m = sim.metrics();
    let elapsed = sim.now();
    println!("simulated {elapsed} of virtual time");
    println!(
        "  data: {} generated, {} delivered (PDR {:.3})",
        m.data_generated,
        m.data_delivered,
        m.pdr()
    );
    println!(
        "  drops: {} queue, {} ttl, {} retry",
        m.dropped_queue, m.dropped_ttl, m.dropped_retry
    );
    println!(
        "  phy: {} frames received, {} lost to channel, {} below sinr",
        m.frames_received, m.phy_lost_channel, m.phy_lost_sinr
    );
    println!(
        "  mac: {} collisions, {} retries",
        m.collisions, m.mac_retries
    );
    println!(
        "  routing: {} discoveries, {} control packets, {} routes invalidated",
        m.route_discoveries,
        m.control_sent_total(),
        m.routes_invalidated
    );
    match m.avg_latency_us() {
        Some(latency) => println!("  latency: {:.1} us mean end-to-end", latency),
        None => println!("  latency: no deliveries"),
    }
    println!(
        "  throughput: {:.1} bit/s, {} nodes exhausted",
        m.throughput_bps(elapsed),
        m.nodes_exhausted
    );
}
