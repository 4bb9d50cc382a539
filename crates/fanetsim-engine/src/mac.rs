//! Link-layer protocols.
//!
//! `Mac` holds one node's link-layer state machine. CSMA/CA follows
//! `IDLE -> SENSE -> BACKOFF -> TX -> AWAIT_ACK -> {IDLE | RETRY}`:
//! carrier sense waits for a full DIFS of continuous idle, backoff counts
//! down slot by slot (freezing whenever the air goes busy mid-slot), the
//! channel token is held for exactly the frame duration, and unicast
//! frames wait for an ACK with doubling contention window on timeout.
//! Pure ALOHA transmits immediately without sensing or token and backs
//! off a random number of slots after a missed ACK.
//!
//! All timing runs on simulator wakeups carrying the MAC epoch; any state
//! change that abandons pending wakeups bumps the epoch so stale wakeups
//! are discarded on dispatch. The epoch is never bumped while a frame is
//! on the air, so the transmit-complete wakeup (which releases the token)
//! cannot be lost.

use fanetsim_common::{NodeId, PacketId, SimTime};
use rand::Rng;
use tracing::{debug, trace};

use crate::error::SimError;
use crate::metrics::DropCause;
use crate::packet::{Packet, ACK_LENGTH_BITS};
use crate::phy::transmission_time;
use crate::sim::{MacWakeKind, Simulator, Wakeup};

/// The closed set of link-layer protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacProtocol {
    CsmaCa,
    PureAloha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacState {
    Idle,
    /// Waiting for the channel to stay idle a full DIFS.
    Sensing,
    /// Counting down backoff slots; `slot_start` marks the running slot.
    Backoff { slots_left: u32, slot_start: SimTime },
    /// Queued on the channel token, FIFO.
    AwaitingToken,
    Transmitting,
    AwaitingAck,
    /// Pure ALOHA retransmission wait.
    AlohaBackoff,
}

#[derive(Debug)]
pub struct Mac {
    pub protocol: MacProtocol,
    pub state: MacState,
    /// Current contention window.
    pub cw: u32,
    /// Guards pending wakeups; bump to cancel them.
    pub epoch: u64,
    /// The frame being worked on, if any.
    pub current: Option<Packet>,
    /// Remaining slots preserved across a backoff freeze.
    pub frozen_slots: Option<u32>,
}

impl Mac {
    pub fn new(protocol: MacProtocol, cw_min: u32) -> Self {
        Mac {
            protocol,
            state: MacState::Idle,
            cw: cw_min,
            epoch: 0,
            current: None,
            frozen_slots: None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == MacState::Idle && self.current.is_none()
    }

    /// Doubles the contention window, clamped to `cw_max`.
    pub fn widen_cw(&mut self, cw_max: u32) {
        self.cw = (self.cw * 2 + 1).min(cw_max);
    }

    pub fn reset_cw(&mut self, cw_min: u32) {
        self.cw = cw_min;
    }

    /// Cancels every pending wakeup scheduled under the old epoch.
    pub fn cancel_pending(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }
}

// ======================================================================
// Simulator-side handlers
// ======================================================================

impl Simulator {
    /// Begins link-layer work on `mac.current`, set by the dispatcher.
    pub(crate) fn mac_begin(&mut self, n: NodeId) -> Result<(), SimError> {
        let protocol = {
            let mac = &mut self.nodes[n.index()].mac;
            mac.cancel_pending();
            mac.frozen_slots = None;
            mac.protocol
        };
        match protocol {
            MacProtocol::CsmaCa => {
                self.nodes[n.index()].mac.state = MacState::Sensing;
                self.mac_sense(n)
            }
            MacProtocol::PureAloha => {
                // No carrier sense: collisions are the channel's problem.
                if self.channels[self.nodes[n.index()].channel].is_busy() {
                    self.metrics.record_collision(n);
                }
                self.mac_transmit(n)
            }
        }
    }

    /// Carrier sense: proceed once the channel has been continuously idle
    /// for DIFS, otherwise come back when that can first be true.
    pub(crate) fn mac_sense(&mut self, n: NodeId) -> Result<(), SimError> {
        let now = self.queue.now();
        let difs = self.config.difs();
        let (busy, busy_until, idle_since) = {
            let ch = &self.channels[self.nodes[n.index()].channel];
            (ch.is_busy(), ch.busy_until(), ch.idle_since())
        };

        let ready_at = if busy {
            busy_until.expect("busy channel has an end time") + difs
        } else {
            (idle_since + difs).max(now)
        };

        if ready_at <= now {
            return self.mac_enter_backoff(n);
        }
        let epoch = self.nodes[n.index()].mac.epoch;
        self.schedule_at(
            ready_at,
            Wakeup::Mac {
                node: n,
                epoch,
                kind: MacWakeKind::Difs,
            },
            n,
        )
    }

    /// DIFS elapsed idle: draw (or resume) the backoff countdown.
    fn mac_enter_backoff(&mut self, n: NodeId) -> Result<(), SimError> {
        let now = self.queue.now();
        let slot = self.config.slot();
        let (slots, epoch) = {
            let node = &mut self.nodes[n.index()];
            let cw = node.mac.cw;
            let slots = node
                .mac
                .frozen_slots
                .take()
                .unwrap_or_else(|| node.mac_rng.gen_range(0..=cw));
            (slots, node.mac.epoch)
        };

        if slots == 0 {
            return self.mac_backoff_done(n);
        }
        self.nodes[n.index()].mac.state = MacState::Backoff {
            slots_left: slots,
            slot_start: now,
        };
        self.queue.schedule_in(
            slot,
            Wakeup::Mac {
                node: n,
                epoch,
                kind: MacWakeKind::Slot,
            },
        );
        Ok(())
    }

    /// One backoff slot elapsed: freeze on activity, else count down.
    pub(crate) fn mac_slot(&mut self, n: NodeId) -> Result<(), SimError> {
        let now = self.queue.now();
        let slot = self.config.slot();

        let MacState::Backoff {
            slots_left,
            slot_start,
        } = self.nodes[n.index()].mac.state
        else {
            return Ok(());
        };

        let interrupted = {
            let ch = &self.channels[self.nodes[n.index()].channel];
            ch.is_busy() || ch.last_busy_start() >= slot_start
        };
        if interrupted {
            // Freeze the countdown and wait for the next DIFS-idle period.
            let node = &mut self.nodes[n.index()];
            node.mac.frozen_slots = Some(slots_left);
            node.mac.state = MacState::Sensing;
            trace!(node = %n, slots_left, "backoff frozen");
            return self.mac_sense(n);
        }

        let slots_left = slots_left - 1;
        if slots_left == 0 {
            return self.mac_backoff_done(n);
        }
        let epoch = {
            let node = &mut self.nodes[n.index()];
            node.mac.state = MacState::Backoff {
                slots_left,
                slot_start: now,
            };
            node.mac.epoch
        };
        self.queue.schedule_in(
            slot,
            Wakeup::Mac {
                node: n,
                epoch,
                kind: MacWakeKind::Slot,
            },
        );
        Ok(())
    }

    /// Backoff exhausted: take the channel token or queue for it.
    fn mac_backoff_done(&mut self, n: NodeId) -> Result<(), SimError> {
        let ch = self.nodes[n.index()].channel;
        if self.channels[ch].try_acquire(n) {
            return self.mac_transmit(n);
        }
        // Someone else won the instant; contention resolved by queueing.
        self.metrics.record_collision(n);
        self.channels[ch].enqueue_waiter(n);
        self.nodes[n.index()].mac.state = MacState::AwaitingToken;
        Ok(())
    }

    /// Token granted by a releasing holder.
    pub(crate) fn mac_granted(&mut self, n: NodeId, stale: bool) -> Result<(), SimError> {
        let sleeping = self.nodes[n.index()].sleeping;
        if stale || sleeping {
            // The waiter moved on (slept or was cancelled); pass the token.
            return self.release_channel_token(n);
        }
        self.mac_transmit(n)
    }

    /// Puts the current frame on the air for exactly its duration.
    pub(crate) fn mac_transmit(&mut self, n: NodeId) -> Result<(), SimError> {
        let now = self.queue.now();
        let (packet, epoch, channel) = {
            let node = &mut self.nodes[n.index()];
            let packet = node
                .mac
                .current
                .clone()
                .expect("mac_transmit without a frame");
            node.mac.state = MacState::Transmitting;
            node.energy.set_state(now, crate::energy::RadioState::Tx);
            (packet, node.mac.epoch, node.channel)
        };

        let airtime = transmission_time(packet.length_bits(), self.config.bit_rate);
        self.channels[channel].begin_air(n, now + airtime, now);
        self.queue.schedule_in(
            airtime,
            Wakeup::Mac {
                node: n,
                epoch,
                kind: MacWakeKind::TxComplete,
            },
        );

        if !packet.is_data() {
            self.metrics.record_control(n, packet.body.kind());
        }
        debug!(node = %n, packet = %packet.id, kind = packet.body.kind(), "transmitting");
        self.phy_transmit(n, packet, airtime);
        Ok(())
    }

    /// Frame fully on the air: release the token, then either finish
    /// (broadcast) or start the ACK wait (unicast).
    pub(crate) fn mac_tx_complete(&mut self, n: NodeId) -> Result<(), SimError> {
        let now = self.queue.now();
        let channel = self.nodes[n.index()].channel;
        self.channels[channel].end_air(n, now);
        if self.nodes[n.index()].mac.protocol == MacProtocol::CsmaCa {
            self.release_channel_token(n)?;
        }

        let sleeping = self.nodes[n.index()].sleeping;
        {
            let node = &mut self.nodes[n.index()];
            let state = if sleeping {
                crate::energy::RadioState::Sleep
            } else {
                crate::energy::RadioState::Idle
            };
            node.energy.set_state(now, state);
        }

        let broadcast = self.nodes[n.index()]
            .mac
            .current
            .as_ref()
            .map(|p| p.body.is_broadcast_frame())
            .unwrap_or(true);

        if broadcast || sleeping {
            // Broadcast frames carry no ACK; a sleeping node abandons the
            // ACK wait (its frame may still deliver).
            let node = &mut self.nodes[n.index()];
            node.mac.current = None;
            node.mac.state = MacState::Idle;
            if !sleeping {
                self.pump_queue(n)?;
            }
            return Ok(());
        }

        let epoch = {
            let node = &mut self.nodes[n.index()];
            node.mac.state = MacState::AwaitingAck;
            node.mac.epoch
        };
        let ack_airtime = transmission_time(ACK_LENGTH_BITS, self.config.bit_rate);
        let timeout = ack_airtime
            + self.config.sifs()
            + SimTime::from_micros(self.config.ack_timeout_extra);
        self.queue.schedule_in(
            timeout,
            Wakeup::Mac {
                node: n,
                epoch,
                kind: MacWakeKind::AckTimeout,
            },
        );
        Ok(())
    }

    /// An ACK frame reached this node.
    pub(crate) fn mac_on_ack(&mut self, n: NodeId, acked: PacketId) -> Result<(), SimError> {
        let matched = {
            let node = &mut self.nodes[n.index()];
            node.mac.state == MacState::AwaitingAck
                && node.mac.current.as_ref().map(|p| p.id) == Some(acked)
        };
        if !matched {
            // Late or duplicate ACK; its wait was already resolved.
            return Ok(());
        }
        let cw_min = self.config.cw_min;
        {
            let node = &mut self.nodes[n.index()];
            node.mac.cancel_pending();
            node.mac.reset_cw(cw_min);
            node.mac.current = None;
            node.mac.state = MacState::Idle;
        }
        trace!(node = %n, packet = %acked, "acked");
        self.pump_queue(n)
    }

    /// The ACK wait ran out: retry with a wider window or give up.
    pub(crate) fn mac_ack_timeout(&mut self, n: NodeId) -> Result<(), SimError> {
        if self.nodes[n.index()].mac.state != MacState::AwaitingAck {
            return Ok(());
        }
        if self.nodes[n.index()].sleeping {
            let node = &mut self.nodes[n.index()];
            node.mac.current = None;
            node.mac.state = MacState::Idle;
            return Ok(());
        }

        let max_attempts = self.config.max_retransmission_attempt;
        let exhausted = {
            let node = &mut self.nodes[n.index()];
            let packet = node.mac.current.as_mut().expect("awaiting ack with a frame");
            packet.attempts += 1;
            packet.attempts > max_attempts
        };

        if exhausted {
            let cw_min = self.config.cw_min;
            let packet = {
                let node = &mut self.nodes[n.index()];
                node.mac.reset_cw(cw_min);
                node.mac.state = MacState::Idle;
                node.mac.current.take().expect("awaiting ack with a frame")
            };
            debug!(node = %n, packet = %packet.id, "retries exhausted, reporting link break");
            if packet.is_data() {
                self.metrics.record_drop(n, DropCause::Retry);
            }
            self.routing_on_link_break(n, &packet)?;
            return self.pump_queue(n);
        }

        self.metrics.record_retry(n);
        let cw_max = self.config.cw_max;
        let protocol = {
            let node = &mut self.nodes[n.index()];
            node.mac.widen_cw(cw_max);
            node.mac.protocol
        };
        match protocol {
            MacProtocol::CsmaCa => {
                self.nodes[n.index()].mac.state = MacState::Sensing;
                self.mac_sense(n)
            }
            MacProtocol::PureAloha => {
                let slot = self.config.slot();
                let (wait_slots, epoch) = {
                    let node = &mut self.nodes[n.index()];
                    let attempts = node
                        .mac
                        .current
                        .as_ref()
                        .map(|p| p.attempts as u32)
                        .unwrap_or(1);
                    let bound = self.config.cw_min * attempts.max(1);
                    let wait = node.mac_rng.gen_range(0..=bound);
                    node.mac.state = MacState::AlohaBackoff;
                    (wait, node.mac.epoch)
                };
                self.queue.schedule_in(
                    slot.scaled(wait_slots as u64),
                    Wakeup::Mac {
                        node: n,
                        epoch,
                        kind: MacWakeKind::AlohaRetry,
                    },
                );
                Ok(())
            }
        }
    }

    /// Pure ALOHA backoff expired: transmit again.
    pub(crate) fn mac_aloha_retry(&mut self, n: NodeId) -> Result<(), SimError> {
        if self.nodes[n.index()].mac.state != MacState::AlohaBackoff {
            return Ok(());
        }
        if self.channels[self.nodes[n.index()].channel].is_busy() {
            self.metrics.record_collision(n);
        }
        self.mac_transmit(n)
    }

    /// Releases the channel token and wakes the next FIFO waiter.
    pub(crate) fn release_channel_token(&mut self, n: NodeId) -> Result<(), SimError> {
        let now = self.queue.now();
        let channel = self.nodes[n.index()].channel;
        if let Some(next) = self.channels[channel].release(n, now)? {
            let epoch = self.nodes[next.index()].mac.epoch;
            self.queue.schedule_in(
                SimTime::ZERO,
                Wakeup::Mac {
                    node: next,
                    epoch,
                    kind: MacWakeKind::Granted,
                },
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cw_doubling_and_clamp() {
        let mut mac = Mac::new(MacProtocol::CsmaCa, 31);
        mac.widen_cw(1023);
        assert_eq!(mac.cw, 63);
        mac.widen_cw(1023);
        assert_eq!(mac.cw, 127);
        for _ in 0..10 {
            mac.widen_cw(1023);
        }
        assert_eq!(mac.cw, 1023);
        mac.reset_cw(31);
        assert_eq!(mac.cw, 31);
    }

    #[test]
    fn test_cancel_pending_bumps_epoch() {
        let mut mac = Mac::new(MacProtocol::CsmaCa, 31);
        let e0 = mac.epoch;
        let e1 = mac.cancel_pending();
        assert_eq!(e1, e0 + 1);
        assert_eq!(mac.epoch, e1);
    }

    #[test]
    fn test_idle_requires_no_frame() {
        let mut mac = Mac::new(MacProtocol::PureAloha, 31);
        assert!(mac.is_idle());
        mac.current = Some(crate::packet::Packet::new(
            fanetsim_common::PacketId(1),
            NodeId(0),
            NodeId(1),
            SimTime::ZERO,
            4,
            crate::packet::PacketBody::Hello,
        ));
        assert!(!mac.is_idle());
    }
}
