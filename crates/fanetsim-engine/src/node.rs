//! A drone node.
//!
//! The node owns everything with node scope: position and speed, the
//! energy model, the mobility model (with its swap epoch), the bounded
//! transmit queue, the MAC instance, and the AODV state. Long-lived node
//! behavior (traffic generator, dispatcher, beaconing, energy ticks,
//! mobility steps) lives in the simulator's wakeup handlers; the node is
//! the state they act on.

use fanetsim_common::{NodeId, PacketId, Point3, SimTime};
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, VecDeque};

use crate::energy::EnergyModel;
use crate::mac::Mac;
use crate::mobility::MobilityModel;
use crate::packet::Packet;
use crate::routing::Aodv;

#[derive(Debug)]
pub struct Node {
    pub id: NodeId,
    pub position: Point3,
    /// Scalar speed, m/s.
    pub speed: f64,
    /// Terminal low-power state; set on energy exhaustion.
    pub sleeping: bool,

    pub energy: EnergyModel,
    pub mobility: MobilityModel,
    /// Bumped on mobility swap; stale step wakeups are discarded.
    pub mobility_epoch: u64,

    /// Bounded FIFO transmit queue; overflow is a counted tail-drop.
    pub queue: VecDeque<Packet>,
    pub mac: Mac,
    pub aodv: Aodv,

    /// Data packet ids already handled by this node, with the instant
    /// they were first seen. A retransmission after a lost ACK would
    /// otherwise deliver or forward the same packet twice.
    pub seen_data: BTreeMap<PacketId, SimTime>,
    /// Frames currently inbound, for exact RX energy bracketing.
    pub incoming_frames: u32,
    /// Sub-channel this node transmits on.
    pub channel: usize,

    pub traffic_rng: ChaCha8Rng,
    pub mobility_rng: ChaCha8Rng,
    pub mac_rng: ChaCha8Rng,
}

impl Node {
    /// Pushes onto the transmit queue unless it is full.
    /// Returns `false` on tail-drop.
    pub fn try_enqueue(&mut self, packet: Packet, capacity: usize) -> bool {
        if self.queue.len() >= capacity {
            return false;
        }
        self.queue.push_back(packet);
        true
    }
}
