//! fanetsim CLI.
//!
//! `run` executes one headless simulation and reports its metrics;
//! `speed-sweep`, `rate-sweep` and `formation` drive the canonical batch
//! experiments and emit their CSV files; `watch` runs the engine in
//! virtual-time slices on this thread and prints a world snapshot as one
//! JSON line per sample for an external viewer to consume.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use fanetsim_common::{NodeId, SimTime};
use fanetsim_config::SimulationConfig;
use fanetsim_engine::Simulator;
use fanetsim_runner::{experiments, report, RunnerError};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fanetsim", about = "Discrete-event FANET simulator")]
struct Cli {
    /// Path to a YAML configuration; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured RNG seed.
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one simulation and print its metrics.
    Run {
        /// Also write the full metrics as JSON.
        #[arg(long)]
        json: Option<PathBuf>,
    },
    /// E1: sweep node speed, emit Speed,Latency.
    SpeedSweep {
        #[arg(long, default_value = "e1_speed_latency.csv")]
        out: PathBuf,
    },
    /// E2: sweep packet generation rate, emit Rate,PDR,Energy,Throughput.
    RateSweep {
        #[arg(long, default_value = "e2_rate_metrics.csv")]
        out: PathBuf,
    },
    /// E3: formation change mid-run, emit Time,PDR,Overhead.
    Formation {
        #[arg(long, default_value = "e3_transition.csv")]
        out: PathBuf,
        /// Virtual time of the formation trigger, seconds.
        #[arg(long, default_value_t = 300)]
        trigger_at: u64,
        /// Leader node id.
        #[arg(long, default_value_t = 0)]
        leader: u32,
    },
    /// Emit one snapshot JSON line per virtual-time interval.
    Watch {
        /// Snapshot cadence in virtual seconds.
        #[arg(long, default_value_t = 1)]
        every: u64,
        /// Trigger a formation change at this virtual second.
        #[arg(long)]
        formation_at: Option<u64>,
        /// Leader for the formation trigger.
        #[arg(long, default_value_t = 0)]
        leader: u32,
    },
}

fn load_config(cli: &Cli) -> Result<SimulationConfig, RunnerError> {
    let mut config = match &cli.config {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }
    Ok(config)
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    fanetsim_metrics::describe_metrics();

    let cli = Cli::parse();
    match execute(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: &Cli) -> Result<(), RunnerError> {
    let config = load_config(cli)?;
    match &cli.command {
        Command::Run { json } => {
            let mut sim = Simulator::new(config.clone())?;
            sim.run()?;
            report::print_summary(&sim);
            if let Some(path) = json {
                report::write_json(&config, sim.metrics(), path)?;
            }
            Ok(())
        }
        Command::SpeedSweep { out } => {
            let mut base = config;
            base.number_of_drones = 25;
            let rows = experiments::speed_sweep(&base)?;
            experiments::write_speed_csv(&rows, out)?;
            println!("wrote {} rows to {}", rows.len(), out.display());
            Ok(())
        }
        Command::RateSweep { out } => {
            let rows = experiments::rate_sweep(&config)?;
            experiments::write_rate_csv(&rows, out)?;
            println!("wrote {} rows to {}", rows.len(), out.display());
            Ok(())
        }
        Command::Formation {
            out,
            trigger_at,
            leader,
        } => {
            let mut base = config;
            // The canonical transition runs 600 s unless the file says
            // otherwise.
            if cli.config.is_none() {
                base.sim_time = 600_000_000;
            }
            let rows = experiments::formation_transition(
                &base,
                SimTime::from_secs(*trigger_at),
                NodeId(*leader),
            )?;
            experiments::write_transition_csv(&rows, out)?;
            println!("wrote {} rows to {}", rows.len(), out.display());
            Ok(())
        }
        Command::Watch {
            every,
            formation_at,
            leader,
        } => {
            let mut sim = Simulator::new(config)?;
            let step = SimTime::from_secs((*every).max(1));
            let trigger = (*formation_at).map(SimTime::from_secs);
            let mut triggered = false;
            while sim.now() < sim.horizon() {
                let mut next = sim.now() + step;
                if let Some(at) = trigger {
                    if !triggered && at > sim.now() && at < next {
                        next = at;
                    }
                }
                sim.run_until(next)?;
                if let (Some(at), false) = (trigger, triggered) {
                    if sim.now() >= at {
                        sim.trigger_formation_change(NodeId(*leader));
                        triggered = true;
                    }
                }
                println!("{}", serde_json::to_string(&sim.snapshot())?);
            }
            Ok(())
        }
    }
}
