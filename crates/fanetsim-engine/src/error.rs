//! Engine error types.
//!
//! Packet drops are never errors; they are counted outcomes. Errors here
//! are either fatal configuration problems surfaced before the run starts,
//! or invariant violations that abort the run with enough context to
//! debug it (node, virtual time, invariant name).

use fanetsim_common::{NodeId, SimTime};
use fanetsim_config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invariant `{invariant}` violated at {time} on {node}")]
    Invariant {
        invariant: &'static str,
        node: NodeId,
        time: SimTime,
    },
}

impl SimError {
    pub fn invariant(invariant: &'static str, node: NodeId, time: SimTime) -> Self {
        SimError::Invariant {
            invariant,
            node,
            time,
        }
    }
}
