//! Discrete-event simulation engine for flying ad-hoc networks.
//!
//! A swarm of UAV nodes moves through a 3D volume and exchanges data over
//! a shared lossy wireless medium, with a CSMA/CA link layer, AODV-style
//! on-demand routing, and per-node flight + communication energy
//! accounting. Everything runs on one cooperative virtual timeline in
//! integer microseconds; given a seed, runs are bit-identical.
//!
//! The entry point is [`Simulator`]: construct it from a
//! [`fanetsim_config::SimulationConfig`], call [`Simulator::run`] (or
//! [`Simulator::run_until`] in slices, interleaving [`Simulator::snapshot`]
//! and commands), then read [`Simulator::metrics`].

mod energy;
mod error;
mod mac;
mod metrics;
mod mobility;
mod node;
mod packet;
mod phy;
mod routing;
mod scheduler;
mod sim;
mod snapshot;
mod world;

pub use energy::{flight_power, CommPower, EnergyModel, RadioState, ENERGY_TICK};
pub use error::SimError;
pub use mac::{Mac, MacProtocol, MacState};
pub use metrics::{DropCause, RunMetrics, SeriesSample};
pub use mobility::{GaussMarkov3D, LeaderFollower, MobilityModel, RandomWaypoint3D, Step};
pub use packet::{Packet, PacketBody, RouteError, RouteReply, RouteRequest};
pub use phy::{transmission_time, Frame};
pub use routing::{Aodv, Buffered, RouteEntry};
pub use scheduler::{EventQueue, PastSchedule};
pub use sim::Simulator;
pub use snapshot::{MetricsSummary, NodeSnapshot, WorldSnapshot};
pub use world::{max_receive_range, sinr_db, Channel};
