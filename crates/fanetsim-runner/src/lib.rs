//! Headless experiment drivers and reporting for fanetsim.
//!
//! The binary in this crate wraps [`fanetsim_engine::Simulator`] with a
//! CLI: single runs with a metrics report, the three canonical parameter
//! sweeps with their CSV contracts, and a same-thread watch mode that
//! emits periodic world snapshots for external viewers.

pub mod experiments;
pub mod report;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Sim(#[from] fanetsim_engine::SimError),

    #[error(transparent)]
    Config(#[from] fanetsim_config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
