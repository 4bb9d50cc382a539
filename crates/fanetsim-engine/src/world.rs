//! The shared medium: channel tokens, channel activity, and propagation.
//!
//! Each sub-channel carries an exclusive-access token (at most one MAC
//! holds it at any virtual-time instant; acquirers queue FIFO) and an
//! activity ledger of transmissions currently in the air, which drives
//! both carrier sensing and interference evaluation.
//!
//! Propagation follows log-distance path loss with exponent 2:
//! `gain(d) = (c / (4 pi f d))^2`. A frame is decodable when its SINR in
//! dB clears the configured threshold.

use fanetsim_common::{NodeId, Point3, SimTime};

use crate::error::SimError;

const SPEED_OF_LIGHT: f64 = 3.0e8;

/// A transmission currently occupying the air on one sub-channel.
#[derive(Debug, Clone, Copy)]
pub struct ActiveTx {
    pub node: NodeId,
    pub until: SimTime,
}

/// One sub-channel: exclusive token plus activity ledger.
#[derive(Debug)]
pub struct Channel {
    token_holder: Option<NodeId>,
    waiters: std::collections::VecDeque<NodeId>,
    active: Vec<ActiveTx>,
    /// Instant the air last went quiet; start of the current idle period.
    idle_since: SimTime,
    /// Start of the most recent transmission, for backoff freeze detection.
    last_busy_start: SimTime,
}

impl Channel {
    pub fn new() -> Self {
        Channel {
            token_holder: None,
            waiters: std::collections::VecDeque::new(),
            active: Vec::new(),
            idle_since: SimTime::ZERO,
            last_busy_start: SimTime::ZERO,
        }
    }

    // ------------------------------------------------------------------
    // Token (exclusive access, FIFO)
    // ------------------------------------------------------------------

    /// Grabs the token if free. Returns whether the caller now holds it.
    pub fn try_acquire(&mut self, node: NodeId) -> bool {
        if self.token_holder.is_none() {
            self.token_holder = Some(node);
            true
        } else {
            false
        }
    }

    /// Queues behind the current holder.
    pub fn enqueue_waiter(&mut self, node: NodeId) {
        self.waiters.push_back(node);
    }

    /// Releases the token held by `node` and hands it to the head waiter,
    /// if any. The new holder is returned so the caller can wake it.
    pub fn release(&mut self, node: NodeId, now: SimTime) -> Result<Option<NodeId>, SimError> {
        if self.token_holder != Some(node) {
            return Err(SimError::invariant("channel-token-owner", node, now));
        }
        self.token_holder = self.waiters.pop_front();
        Ok(self.token_holder)
    }

    pub fn token_holder(&self) -> Option<NodeId> {
        self.token_holder
    }

    // ------------------------------------------------------------------
    // Activity ledger (carrier sense, interference)
    // ------------------------------------------------------------------

    pub fn begin_air(&mut self, node: NodeId, until: SimTime, now: SimTime) {
        self.active.push(ActiveTx { node, until });
        self.last_busy_start = now;
    }

    pub fn end_air(&mut self, node: NodeId, now: SimTime) {
        if let Some(i) = self.active.iter().position(|t| t.node == node) {
            self.active.swap_remove(i);
        }
        if self.active.is_empty() {
            self.idle_since = now;
        }
    }

    pub fn is_busy(&self) -> bool {
        !self.active.is_empty()
    }

    /// Latest end time among transmissions in the air.
    pub fn busy_until(&self) -> Option<SimTime> {
        self.active.iter().map(|t| t.until).max()
    }

    pub fn idle_since(&self) -> SimTime {
        self.idle_since
    }

    pub fn last_busy_start(&self) -> SimTime {
        self.last_busy_start
    }

    /// Transmitters currently in the air other than `except`.
    pub fn interferers(&self, except: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.active
            .iter()
            .filter(move |t| t.node != except)
            .map(|t| t.node)
    }
}

impl Default for Channel {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------
// Propagation
// ----------------------------------------------------------------------

/// Free-space gain at distance `d` meters for carrier frequency `f` Hz.
///
/// Distances below one meter are clamped so co-located nodes do not
/// produce infinite receive power.
pub fn path_gain(distance_m: f64, frequency_hz: f64) -> f64 {
    let d = distance_m.max(1.0);
    let x = SPEED_OF_LIGHT / (4.0 * std::f64::consts::PI * frequency_hz * d);
    x * x
}

/// Received power in watts.
pub fn received_power(tx_power_w: f64, distance_m: f64, frequency_hz: f64) -> f64 {
    tx_power_w * path_gain(distance_m, frequency_hz)
}

/// SINR in dB at `receiver` for a transmission from `transmitter`, summing
/// the powers of every interferer over the noise floor.
pub fn sinr_db(
    receiver: Point3,
    transmitter: Point3,
    interferers: &[Point3],
    tx_power_w: f64,
    frequency_hz: f64,
    noise_w: f64,
) -> f64 {
    let signal = received_power(tx_power_w, receiver.distance_to(&transmitter), frequency_hz);
    let interference: f64 = interferers
        .iter()
        .map(|p| received_power(tx_power_w, receiver.distance_to(p), frequency_hz))
        .sum();
    10.0 * (signal / (noise_w + interference)).log10()
}

/// The distance at which zero-interference SINR meets the threshold: the
/// geometric receive range used by the PHY when fanning out deliveries.
pub fn max_receive_range(
    tx_power_w: f64,
    frequency_hz: f64,
    noise_w: f64,
    snr_threshold_db: f64,
) -> f64 {
    let threshold = 10f64.powf(snr_threshold_db / 10.0);
    let x = SPEED_OF_LIGHT / (4.0 * std::f64::consts::PI * frequency_hz);
    x * (tx_power_w / (noise_w * threshold)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FREQ: f64 = 2.4e9;
    const NOISE: f64 = 4e-11;
    const TX_W: f64 = 0.1;

    #[test]
    fn test_token_exclusive_and_fifo() {
        let mut ch = Channel::new();
        assert!(ch.try_acquire(NodeId(0)));
        assert!(!ch.try_acquire(NodeId(1)));
        ch.enqueue_waiter(NodeId(1));
        ch.enqueue_waiter(NodeId(2));

        let next = ch.release(NodeId(0), SimTime::ZERO).unwrap();
        assert_eq!(next, Some(NodeId(1)));
        assert_eq!(ch.token_holder(), Some(NodeId(1)));

        let next = ch.release(NodeId(1), SimTime::ZERO).unwrap();
        assert_eq!(next, Some(NodeId(2)));
        let next = ch.release(NodeId(2), SimTime::ZERO).unwrap();
        assert_eq!(next, None);
    }

    #[test]
    fn test_release_by_non_holder_is_invariant_violation() {
        let mut ch = Channel::new();
        assert!(ch.try_acquire(NodeId(0)));
        let err = ch.release(NodeId(5), SimTime::from_micros(7)).unwrap_err();
        assert!(matches!(err, SimError::Invariant { node: NodeId(5), .. }));
    }

    #[test]
    fn test_activity_ledger_tracks_idle_period() {
        let mut ch = Channel::new();
        assert!(!ch.is_busy());

        ch.begin_air(NodeId(0), SimTime::from_micros(100), SimTime::from_micros(10));
        assert!(ch.is_busy());
        assert_eq!(ch.busy_until(), Some(SimTime::from_micros(100)));
        assert_eq!(ch.last_busy_start(), SimTime::from_micros(10));

        ch.end_air(NodeId(0), SimTime::from_micros(100));
        assert!(!ch.is_busy());
        assert_eq!(ch.idle_since(), SimTime::from_micros(100));
    }

    #[test]
    fn test_overlapping_air_and_interferers() {
        let mut ch = Channel::new();
        ch.begin_air(NodeId(0), SimTime::from_micros(100), SimTime::ZERO);
        ch.begin_air(NodeId(1), SimTime::from_micros(80), SimTime::from_micros(20));
        assert_eq!(ch.busy_until(), Some(SimTime::from_micros(100)));

        let others: Vec<NodeId> = ch.interferers(NodeId(0)).collect();
        assert_eq!(others, vec![NodeId(1)]);

        ch.end_air(NodeId(1), SimTime::from_micros(80));
        assert!(ch.is_busy());
    }

    #[test]
    fn test_sinr_decreases_with_distance() {
        let tx = Point3::new(0.0, 0.0, 0.0);
        let near = sinr_db(Point3::new(50.0, 0.0, 0.0), tx, &[], TX_W, FREQ, NOISE);
        let far = sinr_db(Point3::new(200.0, 0.0, 0.0), tx, &[], TX_W, FREQ, NOISE);
        assert!(near > far);
    }

    #[test]
    fn test_interference_lowers_sinr() {
        let tx = Point3::new(0.0, 0.0, 0.0);
        let rx = Point3::new(100.0, 0.0, 0.0);
        let clean = sinr_db(rx, tx, &[], TX_W, FREQ, NOISE);
        let jammed = sinr_db(rx, tx, &[Point3::new(120.0, 0.0, 0.0)], TX_W, FREQ, NOISE);
        assert!(clean > jammed);
    }

    #[test]
    fn test_range_is_threshold_crossing() {
        let range = max_receive_range(TX_W, FREQ, NOISE, 6.0);
        let tx = Point3::new(0.0, 0.0, 0.0);
        let just_inside = sinr_db(Point3::new(range * 0.99, 0.0, 0.0), tx, &[], TX_W, FREQ, NOISE);
        let just_outside = sinr_db(Point3::new(range * 1.01, 0.0, 0.0), tx, &[], TX_W, FREQ, NOISE);
        assert!(just_inside >= 6.0);
        assert!(just_outside < 6.0);
    }
}
