//! The physical layer.
//!
//! A transmission fans out into per-receiver event pairs: a frame-start
//! at `propagation_delay` after the first bit (bracketing the receiver's
//! RX energy state) and a frame-arrival one airtime later, where the
//! frame is decoded or discarded. Receivers are the nodes inside the
//! geometric receive range — the distance at which zero-interference
//! SINR meets the threshold.
//!
//! Unicast deliveries additionally sample the Bernoulli channel trial;
//! reliability on top of that is the MAC's business, via ACKs. ACKs
//! themselves are emitted SIFS after a successful unicast decode and
//! bypass both queue and token, which makes them the one source of
//! overlapping transmissions on a single-token channel.

use fanetsim_common::{NodeId, PacketId, Point3, SimTime};
use rand::Rng;
use tracing::trace;

use crate::energy::RadioState;
use crate::error::SimError;
use crate::packet::{Packet, PacketBody, ACK_LENGTH_BITS};
use crate::sim::{Simulator, Wakeup};
use crate::world;

/// A frame as it reaches one receiver.
#[derive(Debug, Clone)]
pub struct Frame {
    pub packet: Packet,
    pub sender: NodeId,
    pub channel: usize,
    /// Whether this delivery was addressed (true) or overheard broadcast.
    pub unicast: bool,
}

/// Airtime of a frame: `bits / bit_rate`, never below one microsecond.
pub fn transmission_time(bits: u32, bit_rate: f64) -> SimTime {
    let micros = (bits as f64 / bit_rate * 1e6).ceil() as u64;
    SimTime::from_micros(micros.max(1))
}

impl Simulator {
    /// Fans a transmission out to its receivers, scheduling the
    /// frame-start / frame-arrival pair per receiver.
    pub(crate) fn phy_transmit(&mut self, sender: NodeId, packet: Packet, airtime: SimTime) {
        let prop = SimTime::from_micros(self.config.propagation_delay);
        let channel = self.nodes[sender.index()].channel;
        let sender_pos = self.nodes[sender.index()].position;

        let targets: Vec<NodeId> = match packet.next_hop {
            Some(hop) if !hop.is_broadcast() => vec![hop],
            _ => (0..self.nodes.len() as u32)
                .map(NodeId)
                .filter(|id| *id != sender)
                .collect(),
        };
        let unicast = matches!(packet.next_hop, Some(hop) if !hop.is_broadcast());

        for target in targets {
            let receiver = &self.nodes[target.index()];
            if receiver.sleeping {
                continue;
            }
            if sender_pos.distance_to(&receiver.position) > self.max_range {
                continue;
            }
            // The Bernoulli channel trial applies to addressed deliveries;
            // flooded frames live or die by SINR alone.
            if unicast && self.config.data_loss_probability > 0.0 {
                let lost = self
                    .phy_rng
                    .gen_bool(self.config.data_loss_probability);
                if lost {
                    trace!(sender = %sender, receiver = %target, packet = %packet.id, "frame lost on channel");
                    self.metrics.record_phy_loss(target, "channel");
                    continue;
                }
            }
            self.queue
                .schedule_in(prop, Wakeup::FrameStart { node: target });
            self.queue.schedule_in(
                prop + airtime,
                Wakeup::FrameArrival {
                    node: target,
                    frame: Frame {
                        packet: packet.clone(),
                        sender,
                        channel,
                        unicast,
                    },
                },
            );
        }
    }

    /// First bit of a frame reaches a receiver: enter RX.
    pub(crate) fn frame_start(&mut self, n: NodeId) {
        let now = self.queue.now();
        let node = &mut self.nodes[n.index()];
        node.incoming_frames += 1;
        if !node.sleeping && node.energy.state() == RadioState::Idle {
            node.energy.set_state(now, RadioState::Rx);
        }
    }

    /// Last bit of a frame reaches a receiver: leave RX, then decode.
    pub(crate) fn frame_arrival(&mut self, n: NodeId, frame: Frame) -> Result<(), SimError> {
        let now = self.queue.now();
        let (sleeping, deaf) = {
            let node = &mut self.nodes[n.index()];
            node.incoming_frames = node.incoming_frames.saturating_sub(1);
            let deaf = node.energy.state() == RadioState::Tx;
            if node.incoming_frames == 0 && node.energy.state() == RadioState::Rx {
                node.energy.set_state(now, RadioState::Idle);
            }
            (node.sleeping, deaf)
        };

        if sleeping {
            return Ok(());
        }
        if deaf {
            // The radio was mid-transmission; nothing was decoded.
            self.metrics.record_phy_loss(n, "deaf");
            return Ok(());
        }

        // SINR against whatever else is in the air right now.
        let interferer_positions: Vec<Point3> = self.channels[frame.channel]
            .interferers(frame.sender)
            .filter(|id| *id != n)
            .map(|id| self.nodes[id.index()].position)
            .collect();
        let sinr = world::sinr_db(
            self.nodes[n.index()].position,
            self.nodes[frame.sender.index()].position,
            &interferer_positions,
            self.config.transmitting_power,
            self.config.carrier_frequency,
            self.config.noise_power,
        );
        if sinr < self.config.snr_threshold {
            trace!(receiver = %n, sender = %frame.sender, sinr, "frame below sinr threshold");
            self.metrics.record_phy_loss(n, "sinr");
            return Ok(());
        }

        self.metrics.record_frame_received(n);

        // Unicast decodes are acknowledged SIFS later; never ACK an ACK.
        if frame.unicast && !matches!(frame.packet.body, PacketBody::Ack { .. }) {
            self.queue.schedule_in(
                self.config.sifs(),
                Wakeup::AckSend {
                    node: n,
                    to: frame.sender,
                    acked: frame.packet.id,
                },
            );
        }

        self.receive_dispatch(n, frame)
    }

    /// Emits a MAC-level ACK, bypassing queue and token.
    pub(crate) fn ack_send(
        &mut self,
        n: NodeId,
        to: NodeId,
        acked: PacketId,
    ) -> Result<(), SimError> {
        let now = self.queue.now();
        if self.nodes[n.index()].sleeping {
            return Ok(());
        }
        if self.nodes[n.index()].energy.state() == RadioState::Tx {
            // The radio is already occupied; the sender's timeout covers it.
            return Ok(());
        }

        let mut packet = self.make_packet(n, to, PacketBody::Ack { acked });
        packet.ttl = 1;
        packet.next_hop = Some(to);

        let airtime = transmission_time(ACK_LENGTH_BITS, self.config.bit_rate);
        let channel = self.nodes[n.index()].channel;
        self.nodes[n.index()].energy.set_state(now, RadioState::Tx);
        self.channels[channel].begin_air(n, now + airtime, now);
        self.queue
            .schedule_in(airtime, Wakeup::AckTxDone { node: n });

        self.metrics.record_control(n, "ack");
        self.phy_transmit(n, packet, airtime);
        Ok(())
    }

    /// ACK left the air: restore the radio state.
    pub(crate) fn ack_tx_done(&mut self, n: NodeId) {
        let now = self.queue.now();
        let channel = self.nodes[n.index()].channel;
        self.channels[channel].end_air(n, now);
        let node = &mut self.nodes[n.index()];
        let state = if node.sleeping {
            RadioState::Sleep
        } else if node.incoming_frames > 0 {
            RadioState::Rx
        } else {
            RadioState::Idle
        };
        node.energy.set_state(now, state);
    }
}
