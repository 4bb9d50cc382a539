//! Shared primitives for the fanetsim simulator.
//!
//! This crate holds the vocabulary types every other crate speaks:
//! virtual time, node and packet identifiers, 3D geometry, and the seeded
//! RNG sub-stream factory that keeps the simulation deterministic.

mod geometry;
mod ids;
mod rng;
mod time;

pub use geometry::{BoundingBox, Point3};
pub use ids::{NodeId, PacketId};
pub use rng::RngStreams;
pub use time::SimTime;
