//! Read-only snapshots for external observers.
//!
//! The visualizer contract: a serializable view of node state, neighbor
//! edges, and the current metrics, producible at any instant between
//! dispatched events. Snapshots copy data out; they never alias live
//! simulation state.

use fanetsim_common::{NodeId, Point3, SimTime};
use serde::Serialize;

/// One node as an observer sees it.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub position: Point3,
    pub speed: f64,
    pub residual_energy: f64,
    pub sleeping: bool,
    /// Where a follower is converging to, if it follows a leader.
    pub target: Option<Point3>,
}

/// Headline metrics at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub generated: u64,
    pub delivered: u64,
    pub pdr: f64,
    pub dropped_queue: u64,
    pub dropped_ttl: u64,
    pub dropped_retry: u64,
    pub collisions: u64,
    pub control_sent: u64,
    pub avg_latency_us: Option<f64>,
    pub throughput_bps: f64,
}

/// The full observer view.
#[derive(Debug, Clone, Serialize)]
pub struct WorldSnapshot {
    pub time: SimTime,
    pub nodes: Vec<NodeSnapshot>,
    /// Directed neighbor edges (observer, observed), live entries only.
    pub neighbor_edges: Vec<(NodeId, NodeId)>,
    pub metrics: MetricsSummary,
}
