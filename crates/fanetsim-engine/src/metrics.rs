//! Run metrics.
//!
//! `RunMetrics` is the authoritative, readable record of a run: plain
//! counters and series owned by the simulator, updated synchronously on
//! the virtual timeline, so two runs with the same seed produce identical
//! values. Each update is mirrored to the `metrics` facade for live
//! exporters; the facade is write-only and never read back.

use fanetsim_common::{NodeId, SimTime};
use fanetsim_metrics::metric_defs;
use serde::Serialize;

/// Terminal causes a data packet can be dropped for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropCause {
    /// Transmit queue overflow (tail-drop) or sleep-time queue drain.
    Queue,
    /// TTL reached zero, or the packet out-waited its buffered lifetime.
    Ttl,
    /// Unicast retransmissions exhausted.
    Retry,
}

impl DropCause {
    fn label(self) -> &'static str {
        match self {
            DropCause::Queue => "queue",
            DropCause::Ttl => "ttl",
            DropCause::Retry => "retry",
        }
    }
}

/// One entry of the 1-second time series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSample {
    pub time: SimTime,
    pub pdr: f64,
    /// Cumulative control packets sent up to this instant.
    pub control_sent: u64,
    /// Cumulative data packets delivered up to this instant.
    pub delivered: u64,
    /// Residual energy per node, joules.
    pub residual_energy: Vec<f64>,
}

/// Counters and series for one simulation run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunMetrics {
    pub data_generated: u64,
    pub data_delivered: u64,
    pub dropped_queue: u64,
    pub dropped_ttl: u64,
    pub dropped_retry: u64,

    /// Frames lost at the receiver PHY to the Bernoulli channel trial.
    pub phy_lost_channel: u64,
    /// Frames lost at the receiver PHY to SINR below threshold.
    pub phy_lost_sinr: u64,
    /// Frames that arrived while the receiver radio could not decode.
    pub phy_lost_deaf: u64,
    pub frames_received: u64,

    /// Channel-token contention events (backoff winners queueing).
    pub collisions: u64,
    pub mac_retries: u64,

    pub control_hello: u64,
    pub control_rreq: u64,
    pub control_rrep: u64,
    pub control_rerr: u64,
    pub control_ack: u64,

    pub route_discoveries: u64,
    pub routes_invalidated: u64,
    pub nodes_exhausted: u64,

    pub delivered_payload_bits: u64,
    /// End-to-end latency of each delivered data packet, microseconds.
    pub latencies_us: Vec<u64>,
    pub samples: Vec<SeriesSample>,
}

impl RunMetrics {
    pub fn record_generated(&mut self, node: NodeId) {
        self.data_generated += 1;
        metrics::counter!(metric_defs::DATA_GENERATED.name, "node" => node.to_string())
            .increment(1);
    }

    pub fn record_delivered(&mut self, node: NodeId, latency: SimTime, payload_bits: u32) {
        self.data_delivered += 1;
        self.delivered_payload_bits += payload_bits as u64;
        self.latencies_us.push(latency.as_micros());
        metrics::counter!(metric_defs::DATA_DELIVERED.name, "node" => node.to_string())
            .increment(1);
        metrics::histogram!(metric_defs::DATA_LATENCY.name).record(latency.as_micros() as f64);
    }

    pub fn record_drop(&mut self, node: NodeId, cause: DropCause) {
        match cause {
            DropCause::Queue => self.dropped_queue += 1,
            DropCause::Ttl => self.dropped_ttl += 1,
            DropCause::Retry => self.dropped_retry += 1,
        }
        metrics::counter!(
            metric_defs::DATA_DROPPED.name,
            "node" => node.to_string(),
            "cause" => cause.label()
        )
        .increment(1);
    }

    pub fn record_phy_loss(&mut self, node: NodeId, reason: &'static str) {
        match reason {
            "channel" => self.phy_lost_channel += 1,
            "sinr" => self.phy_lost_sinr += 1,
            _ => self.phy_lost_deaf += 1,
        }
        metrics::counter!(
            metric_defs::PHY_FRAMES_LOST.name,
            "node" => node.to_string(),
            "reason" => reason
        )
        .increment(1);
    }

    pub fn record_frame_received(&mut self, node: NodeId) {
        self.frames_received += 1;
        metrics::counter!(metric_defs::PHY_FRAMES_RECEIVED.name, "node" => node.to_string())
            .increment(1);
    }

    pub fn record_collision(&mut self, node: NodeId) {
        self.collisions += 1;
        metrics::counter!(metric_defs::MAC_COLLISIONS.name, "node" => node.to_string())
            .increment(1);
    }

    pub fn record_retry(&mut self, node: NodeId) {
        self.mac_retries += 1;
        metrics::counter!(metric_defs::MAC_RETRIES.name, "node" => node.to_string()).increment(1);
    }

    /// Counts a control frame at the instant it hits the air.
    pub fn record_control(&mut self, node: NodeId, kind: &'static str) {
        match kind {
            "hello" => self.control_hello += 1,
            "rreq" => self.control_rreq += 1,
            "rrep" => self.control_rrep += 1,
            "rerr" => self.control_rerr += 1,
            "ack" => self.control_ack += 1,
            _ => return,
        }
        metrics::counter!(
            metric_defs::CONTROL_SENT.name,
            "node" => node.to_string(),
            "kind" => kind
        )
        .increment(1);
    }

    pub fn record_discovery(&mut self, node: NodeId) {
        self.route_discoveries += 1;
        metrics::counter!(metric_defs::ROUTE_DISCOVERIES.name, "node" => node.to_string())
            .increment(1);
    }

    pub fn record_invalidated(&mut self, node: NodeId, count: u64) {
        self.routes_invalidated += count;
        metrics::counter!(metric_defs::ROUTES_INVALIDATED.name, "node" => node.to_string())
            .increment(count);
    }

    pub fn record_exhausted(&mut self) {
        self.nodes_exhausted += 1;
        metrics::counter!(metric_defs::ENERGY_EXHAUSTED.name).increment(1);
    }

    pub fn push_sample(&mut self, sample: SeriesSample) {
        for (i, residual) in sample.residual_energy.iter().enumerate() {
            metrics::gauge!(
                metric_defs::ENERGY_RESIDUAL.name,
                "node" => NodeId(i as u32).to_string()
            )
            .set(*residual);
        }
        self.samples.push(sample);
    }

    // ------------------------------------------------------------------
    // Derived values
    // ------------------------------------------------------------------

    pub fn control_sent_total(&self) -> u64 {
        self.control_hello + self.control_rreq + self.control_rrep + self.control_rerr
            + self.control_ack
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_queue + self.dropped_ttl + self.dropped_retry
    }

    /// Packet delivery ratio; 1.0 before any traffic exists.
    pub fn pdr(&self) -> f64 {
        if self.data_generated == 0 {
            1.0
        } else {
            self.data_delivered as f64 / self.data_generated as f64
        }
    }

    pub fn avg_latency_us(&self) -> Option<f64> {
        if self.latencies_us.is_empty() {
            None
        } else {
            Some(self.latencies_us.iter().sum::<u64>() as f64 / self.latencies_us.len() as f64)
        }
    }

    /// Delivered payload bits over elapsed virtual time.
    pub fn throughput_bps(&self, elapsed: SimTime) -> f64 {
        if elapsed.is_zero() {
            0.0
        } else {
            self.delivered_payload_bits as f64 / elapsed.as_secs_f64()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdr_and_throughput() {
        let mut m = RunMetrics::default();
        assert_eq!(m.pdr(), 1.0);
        m.record_generated(NodeId(0));
        m.record_generated(NodeId(0));
        m.record_delivered(NodeId(1), SimTime::from_millis(3), 1_000);
        assert_eq!(m.pdr(), 0.5);
        assert_eq!(m.throughput_bps(SimTime::from_secs(2)), 500.0);
        assert_eq!(m.avg_latency_us(), Some(3_000.0));
    }

    #[test]
    fn test_drop_causes_are_separate() {
        let mut m = RunMetrics::default();
        m.record_drop(NodeId(0), DropCause::Queue);
        m.record_drop(NodeId(0), DropCause::Ttl);
        m.record_drop(NodeId(0), DropCause::Ttl);
        m.record_drop(NodeId(0), DropCause::Retry);
        assert_eq!(m.dropped_queue, 1);
        assert_eq!(m.dropped_ttl, 2);
        assert_eq!(m.dropped_retry, 1);
        assert_eq!(m.dropped_total(), 4);
    }

    #[test]
    fn test_control_total_sums_kinds() {
        let mut m = RunMetrics::default();
        m.record_control(NodeId(0), "hello");
        m.record_control(NodeId(0), "rreq");
        m.record_control(NodeId(0), "ack");
        assert_eq!(m.control_sent_total(), 3);
    }
}
