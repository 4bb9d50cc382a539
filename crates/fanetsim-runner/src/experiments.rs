//! The canonical batch experiments.
//!
//! Each experiment takes a base configuration, varies one axis, runs the
//! engine headlessly per parameter point, and produces rows whose column
//! order is part of the output contract:
//!
//! - speed sweep: `Speed,Latency`
//! - rate sweep: `Rate,PDR,Energy,Throughput`
//! - formation transition: `Time,PDR,Overhead`
//!
//! Rows are plain structs so tests and callers can use them directly; the
//! `write_*_csv` functions emit the contract files.

use std::io::Write;
use std::path::Path;

use fanetsim_common::{NodeId, SimTime};
use fanetsim_config::SimulationConfig;
use fanetsim_engine::Simulator;
use tracing::info;

use crate::RunnerError;

/// Speeds of the latency sweep, m/s.
pub const SPEED_SWEEP: &[f64] = &[0.0, 10.0, 20.0, 30.0, 40.0, 50.0];
/// Rates of the load sweep, packets/s per node.
pub const RATE_SWEEP: &[f64] = &[1.0, 5.0, 10.0, 20.0, 50.0];

/// One row of the speed sweep.
#[derive(Debug, Clone)]
pub struct SpeedRow {
    pub speed: f64,
    /// Mean end-to-end latency, milliseconds; NaN-free (0 when nothing
    /// was delivered at this point).
    pub latency_ms: f64,
}

/// One row of the rate sweep.
#[derive(Debug, Clone)]
pub struct RateRow {
    pub rate: f64,
    pub pdr: f64,
    /// Mean energy consumed per node, joules.
    pub energy_j: f64,
    /// Delivered payload bits per second of virtual time.
    pub throughput_bps: f64,
}

/// One row of the formation-transition time series.
#[derive(Debug, Clone)]
pub struct TransitionRow {
    pub time_s: f64,
    pub pdr: f64,
    /// Control packets sent during this sample interval.
    pub overhead: u64,
}

/// E1: latency as a function of node speed (25 nodes by default).
pub fn speed_sweep(base: &SimulationConfig) -> Result<Vec<SpeedRow>, RunnerError> {
    let mut rows = Vec::with_capacity(SPEED_SWEEP.len());
    for &speed in SPEED_SWEEP {
        let mut config = base.clone();
        config.default_speed = speed;
        info!(speed, "speed sweep point");

        let mut sim = Simulator::new(config)?;
        sim.run()?;
        let latency_ms = sim.metrics().avg_latency_us().unwrap_or(0.0) / 1_000.0;
        rows.push(SpeedRow { speed, latency_ms });
    }
    Ok(rows)
}

/// E2: delivery, energy and throughput as a function of offered load.
pub fn rate_sweep(base: &SimulationConfig) -> Result<Vec<RateRow>, RunnerError> {
    let mut rows = Vec::with_capacity(RATE_SWEEP.len());
    for &rate in RATE_SWEEP {
        let mut config = base.clone();
        config.packet_generation_rate = rate;
        info!(rate, "rate sweep point");
        let initial_energy = config.initial_energy;

        let mut sim = Simulator::new(config)?;
        sim.run()?;
        let snapshot = sim.snapshot();
        let consumed: f64 = snapshot
            .nodes
            .iter()
            .map(|n| initial_energy - n.residual_energy)
            .sum::<f64>()
            / snapshot.nodes.len() as f64;
        let metrics = sim.metrics();
        rows.push(RateRow {
            rate,
            pdr: metrics.pdr(),
            energy_j: consumed,
            throughput_bps: metrics.throughput_bps(sim.now()),
        });
    }
    Ok(rows)
}

/// E3: a formation change at `trigger_at`, sampled every second over the
/// configured horizon. `overhead` is the per-interval control traffic.
pub fn formation_transition(
    base: &SimulationConfig,
    trigger_at: SimTime,
    leader: NodeId,
) -> Result<Vec<TransitionRow>, RunnerError> {
    let mut sim = Simulator::new(base.clone())?;
    sim.run_until(trigger_at)?;
    sim.trigger_formation_change(leader);
    sim.run()?;

    let samples = &sim.metrics().samples;
    let mut rows = Vec::with_capacity(samples.len());
    let mut last_control = 0u64;
    for sample in samples {
        rows.push(TransitionRow {
            time_s: sample.time.as_secs_f64(),
            pdr: sample.pdr,
            overhead: sample.control_sent - last_control,
        });
        last_control = sample.control_sent;
    }
    Ok(rows)
}

// ----------------------------------------------------------------------
// CSV emission (column order is the contract)
// ----------------------------------------------------------------------

pub fn write_speed_csv(rows: &[SpeedRow], path: impl AsRef<Path>) -> Result<(), RunnerError> {
    let mut out = std::fs::File::create(path)?;
    writeln!(out, "Speed,Latency")?;
    for row in rows {
        writeln!(out, "{},{:.3}", row.speed, row.latency_ms)?;
    }
    Ok(())
}

pub fn write_rate_csv(rows: &[RateRow], path: impl AsRef<Path>) -> Result<(), RunnerError> {
    let mut out = std::fs::File::create(path)?;
    writeln!(out, "Rate,PDR,Energy,Throughput")?;
    for row in rows {
        writeln!(
            out,
            "{},{:.4},{:.2},{:.1}",
            row.rate, row.pdr, row.energy_j, row.throughput_bps
        )?;
    }
    Ok(())
}

pub fn write_transition_csv(
    rows: &[TransitionRow],
    path: impl AsRef<Path>,
) -> Result<(), RunnerError> {
    let mut out = std::fs::File::create(path)?;
    writeln!(out, "Time,PDR,Overhead")?;
    for row in rows {
        writeln!(out, "{:.0},{:.4},{}", row.time_s, row.pdr, row.overhead)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_base() -> SimulationConfig {
        let mut config = SimulationConfig::default();
        config.sim_time = 1_000_000;
        config.number_of_drones = 5;
        config.packet_generation_rate = 2.0;
        config.seed = 3;
        config
    }

    #[test]
    fn test_speed_sweep_covers_all_points() {
        let rows = speed_sweep(&small_base()).unwrap();
        let speeds: Vec<f64> = rows.iter().map(|r| r.speed).collect();
        assert_eq!(speeds, SPEED_SWEEP);
        assert!(rows.iter().all(|r| r.latency_ms >= 0.0));
    }

    #[test]
    fn test_rate_sweep_energy_monotone() {
        let mut base = small_base();
        base.sim_time = 2_000_000;
        let rows = rate_sweep(&base).unwrap();
        assert_eq!(rows.len(), RATE_SWEEP.len());
        // Offered load only ever adds communication energy.
        for pair in rows.windows(2) {
            assert!(pair[1].energy_j >= pair[0].energy_j - 1e-6);
        }
        for row in &rows {
            assert!((0.0..=1.0).contains(&row.pdr));
        }
    }

    #[test]
    fn test_transition_rows_cover_run() {
        let mut base = small_base();
        base.sim_time = 5_000_000;
        let rows =
            formation_transition(&base, SimTime::from_secs(2), NodeId(0)).unwrap();
        assert_eq!(rows.len(), 5);
        assert!((rows[0].time_s - 1.0).abs() < 1e-9);
        assert!((rows.last().unwrap().time_s - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_csv_headers_are_contractual() {
        let dir = std::env::temp_dir().join("fanetsim-csv-test");
        std::fs::create_dir_all(&dir).unwrap();

        let speed = dir.join("e1.csv");
        write_speed_csv(
            &[SpeedRow {
                speed: 10.0,
                latency_ms: 1.5,
            }],
            &speed,
        )
        .unwrap();
        let text = std::fs::read_to_string(&speed).unwrap();
        assert!(text.starts_with("Speed,Latency\n"));
        assert!(text.contains("10,1.500"));

        let rate = dir.join("e2.csv");
        write_rate_csv(
            &[RateRow {
                rate: 5.0,
                pdr: 0.9,
                energy_j: 12.0,
                throughput_bps: 800.0,
            }],
            &rate,
        )
        .unwrap();
        let text = std::fs::read_to_string(&rate).unwrap();
        assert!(text.starts_with("Rate,PDR,Energy,Throughput\n"));

        let transition = dir.join("e3.csv");
        write_transition_csv(
            &[TransitionRow {
                time_s: 300.0,
                pdr: 0.8,
                overhead: 42,
            }],
            &transition,
        )
        .unwrap();
        let text = std::fs::read_to_string(&transition).unwrap();
        assert!(text.starts_with("Time,PDR,Overhead\n"));
        assert!(text.contains("300,0.8000,42"));
    }
}
