//! Per-node energy accounting.
//!
//! Communication energy is integrated exactly: the model keeps the instant
//! of the last state transition and settles `power(state) * elapsed` into
//! an accumulator on every transition, so the total over a run equals the
//! sum of state-duration products regardless of when the periodic tick
//! lands. Flight energy is charged per 100 ms tick from a rotary-wing
//! power curve that is U-shaped in speed.

use fanetsim_common::SimTime;
use serde::Serialize;

/// How often residual energy is settled and deducted.
pub const ENERGY_TICK: SimTime = SimTime::from_millis(100);

// Rotary-wing power model constants (blade profile, induced, parasite).
const BLADE_PROFILE_POWER_W: f64 = 79.86;
const INDUCED_POWER_W: f64 = 88.63;
const TIP_SPEED_MS: f64 = 120.0;
const MEAN_ROTOR_VELOCITY_MS: f64 = 4.03;
const FUSELAGE_DRAG_RATIO: f64 = 0.6;
const AIR_DENSITY: f64 = 1.225;
const ROTOR_SOLIDITY: f64 = 0.05;
const ROTOR_DISC_AREA_M2: f64 = 0.503;

/// Radio state the communication power draw follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RadioState {
    Tx,
    Rx,
    Idle,
    Sleep,
}

/// Communication power levels in watts, one per radio state.
#[derive(Debug, Clone, Copy)]
pub struct CommPower {
    pub tx: f64,
    pub rx: f64,
    pub idle: f64,
    pub sleep: f64,
}

impl CommPower {
    pub fn for_state(&self, state: RadioState) -> f64 {
        match state {
            RadioState::Tx => self.tx,
            RadioState::Rx => self.rx,
            RadioState::Idle => self.idle,
            RadioState::Sleep => self.sleep,
        }
    }
}

/// Rotary-wing propulsion power in watts at the given forward speed.
///
/// Blade-profile power grows quadratically with speed, induced power falls
/// from its hover value, and parasite power grows cubically: the sum is
/// U-shaped with its minimum near hover-to-low speed.
pub fn flight_power(speed_ms: f64) -> f64 {
    let v = speed_ms.max(0.0);
    let blade = BLADE_PROFILE_POWER_W * (1.0 + 3.0 * v * v / (TIP_SPEED_MS * TIP_SPEED_MS));
    let v0 = MEAN_ROTOR_VELOCITY_MS;
    let induced_term = (1.0 + v.powi(4) / (4.0 * v0.powi(4))).sqrt() - v * v / (2.0 * v0 * v0);
    let induced = INDUCED_POWER_W * induced_term.max(0.0).sqrt();
    let parasite =
        0.5 * FUSELAGE_DRAG_RATIO * AIR_DENSITY * ROTOR_SOLIDITY * ROTOR_DISC_AREA_M2 * v.powi(3);
    blade + induced + parasite
}

/// One node's residual energy and radio-state integrator.
#[derive(Debug)]
pub struct EnergyModel {
    residual_j: f64,
    state: RadioState,
    state_since: SimTime,
    /// Communication energy accrued since the last tick, joules.
    accrued_j: f64,
    powers: CommPower,
}

impl EnergyModel {
    pub fn new(initial_j: f64, powers: CommPower) -> Self {
        EnergyModel {
            residual_j: initial_j,
            state: RadioState::Idle,
            state_since: SimTime::ZERO,
            accrued_j: 0.0,
            powers,
        }
    }

    pub fn residual(&self) -> f64 {
        self.residual_j
    }

    pub fn state(&self) -> RadioState {
        self.state
    }

    /// Transitions the radio state, settling the closed interval exactly.
    pub fn set_state(&mut self, now: SimTime, state: RadioState) {
        self.settle(now);
        self.state = state;
    }

    fn settle(&mut self, now: SimTime) {
        let elapsed = now.saturating_sub(self.state_since);
        self.accrued_j += self.powers.for_state(self.state) * elapsed.as_secs_f64();
        self.state_since = now;
    }

    /// Periodic settlement: deducts accrued communication energy plus
    /// flight power over the tick interval. Returns the new residual,
    /// which may be negative by at most one tick's worth before the
    /// caller transitions the node to sleep.
    pub fn tick(&mut self, now: SimTime, speed_ms: f64) -> f64 {
        self.settle(now);
        let flight_j = flight_power(speed_ms) * ENERGY_TICK.as_secs_f64();
        self.residual_j -= self.accrued_j + flight_j;
        self.accrued_j = 0.0;
        self.residual_j
    }

    /// Terminal transition on exhaustion: clamps residual to zero and
    /// pins the radio in SLEEP.
    pub fn exhaust(&mut self, now: SimTime) {
        self.settle(now);
        self.accrued_j = 0.0;
        self.residual_j = 0.0;
        self.state = RadioState::Sleep;
    }

    /// The largest plausible deficit of a single tick, used as the
    /// tolerance for the residual-energy invariant.
    pub fn tick_tolerance(&self, speed_ms: f64) -> f64 {
        (flight_power(speed_ms) + self.powers.tx) * ENERGY_TICK.as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POWERS: CommPower = CommPower {
        tx: 1.5,
        rx: 1.0,
        idle: 0.1,
        sleep: 0.001,
    };

    #[test]
    fn test_flight_power_is_u_shaped() {
        let hover = flight_power(0.0);
        let slow = flight_power(5.0);
        let cruise = flight_power(20.0);
        let fast = flight_power(50.0);
        // The minimum sits near hover-to-low speed; both extremes are higher.
        assert!(slow < hover);
        assert!(cruise > slow);
        assert!(fast > cruise);
        assert!(fast > hover);
    }

    #[test]
    fn test_flight_power_monotonic_past_minimum() {
        let mut last = flight_power(10.0);
        for v in 11..=60 {
            let p = flight_power(v as f64);
            assert!(p > last, "power not increasing at {v} m/s");
            last = p;
        }
    }

    #[test]
    fn test_integration_equals_state_duration_products() {
        let mut m = EnergyModel::new(1_000.0, POWERS);
        // 40 ms idle, 20 ms tx, 30 ms rx, 10 ms idle within one tick.
        m.set_state(SimTime::from_millis(40), RadioState::Tx);
        m.set_state(SimTime::from_millis(60), RadioState::Rx);
        m.set_state(SimTime::from_millis(90), RadioState::Idle);
        let residual = m.tick(SimTime::from_millis(100), 0.0);

        let comm = 0.040 * 0.1 + 0.020 * 1.5 + 0.030 * 1.0 + 0.010 * 0.1;
        let expected = 1_000.0 - comm - flight_power(0.0) * 0.1;
        assert!((residual - expected).abs() < 1e-9);
    }

    #[test]
    fn test_transitions_spanning_ticks_do_not_double_count() {
        let mut m = EnergyModel::new(1_000.0, POWERS);
        m.set_state(SimTime::from_millis(80), RadioState::Tx);
        let after_first = m.tick(SimTime::from_millis(100), 0.0);
        // TX continues into the second tick.
        m.set_state(SimTime::from_millis(150), RadioState::Idle);
        let after_second = m.tick(SimTime::from_millis(200), 0.0);

        let comm_first = 0.080 * 0.1 + 0.020 * 1.5;
        let comm_second = 0.050 * 1.5 + 0.050 * 0.1;
        let flight = flight_power(0.0) * 0.1;
        assert!((after_first - (1_000.0 - comm_first - flight)).abs() < 1e-9);
        assert!(
            (after_second - (1_000.0 - comm_first - comm_second - 2.0 * flight)).abs() < 1e-9
        );
    }

    #[test]
    fn test_exhaust_clamps_and_sleeps() {
        let mut m = EnergyModel::new(0.001, POWERS);
        let residual = m.tick(SimTime::from_millis(100), 10.0);
        assert!(residual <= 0.0);
        m.exhaust(SimTime::from_millis(100));
        assert_eq!(m.residual(), 0.0);
        assert_eq!(m.state(), RadioState::Sleep);
    }
}
