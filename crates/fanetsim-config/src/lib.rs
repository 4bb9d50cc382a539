//! Simulation configuration.
//!
//! A flat, immutable parameter set read once at start-up and threaded into
//! the simulator constructor. Every field has a default, so a YAML file
//! only needs to name what it changes; `validate` turns out-of-range
//! values into fatal, human-readable errors before any simulation state
//! exists.
//!
//! Times are integer microseconds of virtual time, distances meters,
//! powers watts, energies joules.

use fanetsim_common::SimTime;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which mobility model nodes start with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MobilityKind {
    RandomWaypoint,
    GaussMarkov,
}

/// Which MAC protocol nodes run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacKind {
    CsmaCa,
    PureAloha,
}

/// The complete simulation parameter set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Simulation horizon in microseconds of virtual time.
    pub sim_time: u64,
    /// Node count; ids are `0..number_of_drones`.
    pub number_of_drones: u32,

    // Bounding box, meters.
    pub map_length: f64,
    pub map_width: f64,
    pub map_height: f64,

    /// Initial scalar speed of every node, m/s.
    pub default_speed: f64,
    pub mobility_model: MobilityKind,
    /// Inter-step delay of the mobility processes, microseconds.
    pub mobility_step_interval: u64,

    // Traffic.
    /// Data packets generated per second per node.
    pub packet_generation_rate: f64,
    /// Data payload length in bits.
    pub average_payload_length: u32,

    // Energy.
    pub initial_energy: f64,
    pub power_tx: f64,
    pub power_rx: f64,
    pub power_idle: f64,
    pub power_sleep: f64,

    // Channel.
    pub data_loss_probability: f64,
    /// SINR threshold in dB below which a frame is discarded.
    pub snr_threshold: f64,
    pub carrier_frequency: f64,
    pub transmitting_power: f64,
    /// Ambient noise power at the receiver, watts.
    pub noise_power: f64,
    /// Link bit rate, bits per second.
    pub bit_rate: f64,
    /// Fixed propagation delay per frame, microseconds.
    pub propagation_delay: u64,
    /// Number of exclusive-access sub-channels.
    pub channel_count: u32,

    // MAC.
    pub mac_protocol: MacKind,
    pub slot_duration: u64,
    pub sifs_duration: u64,
    pub difs_duration: u64,
    /// Extra slack added to the ACK wait beyond SIFS + ACK airtime, microseconds.
    pub ack_timeout_extra: u64,
    pub cw_min: u32,
    pub cw_max: u32,
    pub max_retransmission_attempt: u8,

    // Routing.
    pub hello_interval: u64,
    pub neighbor_timeout: u64,
    pub active_route_timeout: u64,

    // Queues and lifetimes.
    pub max_queue_size: usize,
    /// Initial TTL of generated packets; decremented per forward.
    pub max_ttl: u8,
    /// How long a packet may sit buffered awaiting a route, microseconds.
    pub packet_lifetime: u64,

    /// Master RNG seed; fixes the entire run.
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            sim_time: 10_000_000,
            number_of_drones: 10,
            map_length: 600.0,
            map_width: 600.0,
            map_height: 120.0,
            default_speed: 10.0,
            mobility_model: MobilityKind::RandomWaypoint,
            mobility_step_interval: 50_000,
            packet_generation_rate: 5.0,
            average_payload_length: 8_192,
            initial_energy: 20_000.0,
            power_tx: 1.5,
            power_rx: 1.0,
            power_idle: 0.1,
            power_sleep: 0.001,
            data_loss_probability: 0.05,
            snr_threshold: 6.0,
            carrier_frequency: 2.4e9,
            transmitting_power: 0.1,
            noise_power: 4e-11,
            bit_rate: 2e6,
            propagation_delay: 1,
            channel_count: 1,
            mac_protocol: MacKind::CsmaCa,
            slot_duration: 20,
            sifs_duration: 10,
            difs_duration: 30,
            ack_timeout_extra: 50,
            cw_min: 31,
            cw_max: 1023,
            max_retransmission_attempt: 5,
            hello_interval: 1_000_000,
            neighbor_timeout: 2_500_000,
            active_route_timeout: 3_000_000,
            max_queue_size: 200,
            max_ttl: 11,
            packet_lifetime: 5_000_000,
            seed: 1,
        }
    }
}

impl SimulationConfig {
    /// Loads a configuration from a YAML file and validates it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Parses a configuration from YAML text and validates it.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: SimulationConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every parameter range; the first violation is fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn fail(msg: impl Into<String>) -> Result<(), ConfigError> {
            Err(ConfigError::Invalid(msg.into()))
        }

        if self.number_of_drones == 0 {
            return fail("number_of_drones must be at least 1");
        }
        if self.map_length <= 0.0 || self.map_width <= 0.0 || self.map_height <= 0.0 {
            return fail("map dimensions must all be positive");
        }
        if self.default_speed < 0.0 || !self.default_speed.is_finite() {
            return fail("default_speed must be finite and non-negative");
        }
        if !(10_000..=100_000).contains(&self.mobility_step_interval) {
            return fail("mobility_step_interval must be within 10ms..100ms");
        }
        if self.packet_generation_rate < 0.0 || !self.packet_generation_rate.is_finite() {
            return fail("packet_generation_rate must be finite and non-negative");
        }
        if self.average_payload_length == 0 {
            return fail("average_payload_length must be positive");
        }
        if self.initial_energy <= 0.0 {
            return fail("initial_energy must be positive");
        }
        for (name, value) in [
            ("power_tx", self.power_tx),
            ("power_rx", self.power_rx),
            ("power_idle", self.power_idle),
            ("power_sleep", self.power_sleep),
        ] {
            if value < 0.0 || !value.is_finite() {
                return fail(format!("{name} must be finite and non-negative"));
            }
        }
        if !(0.0..=1.0).contains(&self.data_loss_probability) {
            return fail("data_loss_probability must be within [0, 1]");
        }
        if self.carrier_frequency <= 0.0 {
            return fail("carrier_frequency must be positive");
        }
        if self.transmitting_power <= 0.0 {
            return fail("transmitting_power must be positive");
        }
        if self.noise_power <= 0.0 {
            return fail("noise_power must be positive");
        }
        if self.bit_rate <= 0.0 {
            return fail("bit_rate must be positive");
        }
        if self.channel_count == 0 {
            return fail("channel_count must be at least 1");
        }
        if self.slot_duration == 0 || self.sifs_duration == 0 || self.difs_duration == 0 {
            return fail("slot_duration, sifs_duration and difs_duration must be positive");
        }
        if self.cw_min > self.cw_max {
            return fail("cw_min must not exceed cw_max");
        }
        if self.max_queue_size == 0 {
            return fail("max_queue_size must be at least 1");
        }
        if self.max_ttl == 0 {
            return fail("max_ttl must be at least 1");
        }
        if self.hello_interval == 0 || self.neighbor_timeout == 0 {
            return fail("hello_interval and neighbor_timeout must be positive");
        }
        if self.active_route_timeout == 0 || self.packet_lifetime == 0 {
            return fail("active_route_timeout and packet_lifetime must be positive");
        }
        Ok(())
    }

    pub fn horizon(&self) -> SimTime {
        SimTime::from_micros(self.sim_time)
    }

    pub fn slot(&self) -> SimTime {
        SimTime::from_micros(self.slot_duration)
    }

    pub fn sifs(&self) -> SimTime {
        SimTime::from_micros(self.sifs_duration)
    }

    pub fn difs(&self) -> SimTime {
        SimTime::from_micros(self.difs_duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        SimulationConfig::default().validate().unwrap();
    }

    #[test]
    fn test_yaml_overrides_subset() {
        let config = SimulationConfig::from_yaml(
            "number_of_drones: 25\npacket_generation_rate: 20\nseed: 7\n",
        )
        .unwrap();
        assert_eq!(config.number_of_drones, 25);
        assert_eq!(config.packet_generation_rate, 20.0);
        assert_eq!(config.seed, 7);
        // Untouched fields keep defaults.
        assert_eq!(config.cw_min, 31);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = SimulationConfig::from_yaml("warp_speed: 9\n").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn test_out_of_range_probability() {
        let mut config = SimulationConfig::default();
        config.data_loss_probability = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("data_loss_probability"));
    }

    #[test]
    fn test_cw_ordering_enforced() {
        let mut config = SimulationConfig::default();
        config.cw_min = 2048;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_nodes_rejected() {
        let mut config = SimulationConfig::default();
        config.number_of_drones = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_box_rejected() {
        let mut config = SimulationConfig::default();
        config.map_height = 0.0;
        assert!(config.validate().is_err());
    }
}
