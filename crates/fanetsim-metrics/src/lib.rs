//! Metric definitions for the fanetsim simulator.
//!
//! Re-exports the `metrics` facade and declares every series the engine
//! emits as a structured [`Metric`] constant, so call sites never spell a
//! metric name twice and exporters can be primed with descriptions via
//! [`describe_metrics`].
//!
//! Note that the engine's authoritative, deterministic run statistics live
//! in `fanetsim-engine`; the facade emission defined here is for live
//! exporters and is additive.

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// The kind of metric (counter, gauge, or histogram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

/// A metric declaration with its metadata.
///
/// Const-constructible so the full set can be declared at compile time.
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name (e.g. `fanetsim.mac.collisions`).
    pub name: &'static str,
    pub kind: MetricKind,
    pub description: &'static str,
    pub unit: Option<Unit>,
    /// Expected label keys for this metric.
    pub labels: &'static [&'static str],
}

impl Metric {
    pub const fn counter(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Counter,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    pub const fn gauge(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Gauge,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    pub const fn histogram(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Histogram,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Registers this metric's description with the recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description)
            }
            (MetricKind::Counter, None) => describe_counter!(self.name, self.description),
            (MetricKind::Gauge, Some(unit)) => describe_gauge!(self.name, unit, self.description),
            (MetricKind::Gauge, None) => describe_gauge!(self.name, self.description),
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description)
            }
            (MetricKind::Histogram, None) => describe_histogram!(self.name, self.description),
        }
    }
}

/// All metric definitions for the simulator.
pub mod metric_defs {
    use super::{Metric, Unit};

    /// Standard labels present on node-scoped metrics.
    pub const NODE_LABELS: &[&str] = &["node"];

    // ========================================================================
    // Traffic and delivery
    // ========================================================================

    /// Data packets created by traffic generators.
    pub const DATA_GENERATED: Metric = Metric::counter("fanetsim.data.generated")
        .with_description("Data packets created by traffic generators")
        .with_unit(Unit::Count)
        .with_labels(NODE_LABELS);

    /// Data packets delivered to their destination.
    pub const DATA_DELIVERED: Metric = Metric::counter("fanetsim.data.delivered")
        .with_description("Data packets delivered to their destination")
        .with_unit(Unit::Count)
        .with_labels(NODE_LABELS);

    /// Data packets dropped, by terminal cause.
    ///
    /// `cause` is one of `queue`, `ttl`, `retry`.
    pub const DATA_DROPPED: Metric = Metric::counter("fanetsim.data.dropped")
        .with_description("Data packets dropped, by terminal cause")
        .with_unit(Unit::Count)
        .with_labels(&["node", "cause"]);

    /// End-to-end latency of delivered data packets.
    pub const DATA_LATENCY: Metric = Metric::histogram("fanetsim.data.latency_us")
        .with_description("End-to-end latency of delivered data packets in microseconds")
        .with_unit(Unit::Microseconds);

    // ========================================================================
    // PHY and MAC
    // ========================================================================

    /// Frames discarded at the receiver PHY (Bernoulli loss or SINR below threshold).
    pub const PHY_FRAMES_LOST: Metric = Metric::counter("fanetsim.phy.frames_lost")
        .with_description("Frames discarded at the receiver PHY")
        .with_unit(Unit::Count)
        .with_labels(&["node", "reason"]);

    /// Frames handed up by the PHY after a successful decode.
    pub const PHY_FRAMES_RECEIVED: Metric = Metric::counter("fanetsim.phy.frames_received")
        .with_description("Frames handed up by the PHY after a successful decode")
        .with_unit(Unit::Count)
        .with_labels(NODE_LABELS);

    /// Channel-token contention events resolved by queueing.
    pub const MAC_COLLISIONS: Metric = Metric::counter("fanetsim.mac.collisions")
        .with_description("Channel-token contention events resolved by queueing")
        .with_unit(Unit::Count)
        .with_labels(NODE_LABELS);

    /// Unicast retransmission attempts.
    pub const MAC_RETRIES: Metric = Metric::counter("fanetsim.mac.retries")
        .with_description("Unicast retransmission attempts")
        .with_unit(Unit::Count)
        .with_labels(NODE_LABELS);

    // ========================================================================
    // Routing
    // ========================================================================

    /// Control packets sent, by kind (`hello`, `rreq`, `rrep`, `rerr`, `ack`).
    pub const CONTROL_SENT: Metric = Metric::counter("fanetsim.routing.control_sent")
        .with_description("Control packets sent, by kind")
        .with_unit(Unit::Count)
        .with_labels(&["node", "kind"]);

    /// Route discoveries initiated.
    pub const ROUTE_DISCOVERIES: Metric = Metric::counter("fanetsim.routing.discoveries")
        .with_description("Route discoveries initiated")
        .with_unit(Unit::Count)
        .with_labels(NODE_LABELS);

    /// Routing entries invalidated by link failure or expiry.
    pub const ROUTES_INVALIDATED: Metric = Metric::counter("fanetsim.routing.invalidated")
        .with_description("Routing entries invalidated by link failure or expiry")
        .with_unit(Unit::Count)
        .with_labels(NODE_LABELS);

    // ========================================================================
    // Energy
    // ========================================================================

    /// Residual energy per node.
    pub const ENERGY_RESIDUAL: Metric = Metric::gauge("fanetsim.energy.residual_j")
        .with_description("Residual energy per node in joules")
        .with_labels(NODE_LABELS);

    /// Nodes that exhausted their energy and went to sleep.
    pub const ENERGY_EXHAUSTED: Metric = Metric::counter("fanetsim.energy.exhausted")
        .with_description("Nodes that exhausted their energy and went to sleep")
        .with_unit(Unit::Count);

    /// Returns a slice of all defined metrics.
    pub const ALL: &[&Metric] = &[
        &DATA_GENERATED,
        &DATA_DELIVERED,
        &DATA_DROPPED,
        &DATA_LATENCY,
        &PHY_FRAMES_LOST,
        &PHY_FRAMES_RECEIVED,
        &MAC_COLLISIONS,
        &MAC_RETRIES,
        &CONTROL_SENT,
        &ROUTE_DISCOVERIES,
        &ROUTES_INVALIDATED,
        &ENERGY_RESIDUAL,
        &ENERGY_EXHAUSTED,
    ];
}

/// Registers all metric descriptions with the recorder.
///
/// Call once at startup, after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_builder() {
        const M: Metric = Metric::counter("test.counter")
            .with_description("a counter")
            .with_unit(Unit::Count)
            .with_labels(&["node"]);
        assert_eq!(M.name, "test.counter");
        assert_eq!(M.kind, MetricKind::Counter);
        assert_eq!(M.unit, Some(Unit::Count));
        assert_eq!(M.labels, &["node"]);
    }

    #[test]
    fn test_all_names_unique() {
        let mut names: Vec<&str> = metric_defs::ALL.iter().map(|m| m.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), metric_defs::ALL.len());
    }

    #[test]
    fn test_all_names_namespaced() {
        for metric in metric_defs::ALL {
            assert!(
                metric.name.starts_with("fanetsim."),
                "unnamespaced metric: {}",
                metric.name
            );
        }
    }
}
