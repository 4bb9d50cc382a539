//! AODV-style on-demand routing.
//!
//! Neighbors are learned from periodic Hello beacons and expire after
//! `neighbor_timeout`. Routes are discovered on demand: a RREQ flood with
//! per-originator broadcast ids and duplicate suppression builds reverse
//! routes on the way out, and the RREP unicast back along them builds the
//! forward route. Freshness follows sequence numbers: an install is
//! accepted if its sequence is higher, or equal with a smaller hop count.
//! MAC retry exhaustion invalidates every route through the broken hop
//! and floods a RERR; receivers invalidate matching entries and propagate
//! when they invalidated something.
//!
//! Packets with no route wait in a per-destination buffer. The 1 s sweep
//! purges expired routes, neighbors and suppression entries, drops
//! buffered packets past their lifetime, and re-issues discovery while
//! buffered traffic remains.

use fanetsim_common::{NodeId, SimTime};
use std::collections::BTreeMap;
use tracing::{debug, trace};

use crate::error::SimError;
use crate::metrics::DropCause;
use crate::packet::{Packet, PacketBody, RouteError, RouteReply, RouteRequest};
use crate::sim::Simulator;

/// How long a `(originator, broadcast_id)` pair suppresses duplicates.
pub const RREQ_DUPLICATE_WINDOW: SimTime = SimTime::from_secs(5);

/// A forward or reverse route.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteEntry {
    pub next_hop: NodeId,
    pub hop_count: u32,
    /// Destination sequence number this entry was learned under.
    pub seq: u32,
    pub expires_at: SimTime,
}

impl RouteEntry {
    pub fn is_valid(&self, now: SimTime) -> bool {
        self.expires_at > now
    }
}

/// A packet parked while its destination is being discovered.
#[derive(Debug, Clone)]
pub struct Buffered {
    pub packet: Packet,
    pub since: SimTime,
}

/// Per-node AODV state. All tables are `BTreeMap` so iteration order —
/// and therefore every simulation decision derived from it — is
/// deterministic.
#[derive(Debug, Default)]
pub struct Aodv {
    pub routes: BTreeMap<NodeId, RouteEntry>,
    /// Peer -> absolute expiry of the neighbor relationship.
    pub neighbors: BTreeMap<NodeId, SimTime>,
    /// This node's own monotonic sequence number.
    pub seq: u32,
    /// This node's monotonic RREQ flood id.
    pub rreq_id: u32,
    /// Seen `(originator, broadcast_id)` pairs -> suppression expiry.
    pub seen_rreq: BTreeMap<(NodeId, u32), SimTime>,
    /// Packets waiting for a route, keyed by destination.
    pub buffer: BTreeMap<NodeId, Vec<Buffered>>,
}

impl Aodv {
    /// Installs or refreshes a route under the freshness rule. Entries
    /// whose expiry has passed are always overwritten.
    pub fn consider_install(
        &mut self,
        dst: NodeId,
        via: NodeId,
        hop_count: u32,
        seq: u32,
        now: SimTime,
        lifetime: SimTime,
    ) -> bool {
        if let Some(existing) = self.routes.get(&dst) {
            if existing.is_valid(now)
                && (seq < existing.seq || (seq == existing.seq && hop_count >= existing.hop_count))
            {
                return false;
            }
        }
        self.routes.insert(
            dst,
            RouteEntry {
                next_hop: via,
                hop_count,
                seq,
                expires_at: now + lifetime,
            },
        );
        true
    }

    pub fn valid_route(&self, dst: NodeId, now: SimTime) -> Option<&RouteEntry> {
        self.routes.get(&dst).filter(|e| e.is_valid(now))
    }

    /// Last sequence number known for `dst`, valid or stale; 0 if none.
    pub fn last_known_seq(&self, dst: NodeId) -> u32 {
        self.routes.get(&dst).map(|e| e.seq).unwrap_or(0)
    }

    pub fn neighbor_alive(&self, peer: NodeId, now: SimTime) -> bool {
        self.neighbors.get(&peer).is_some_and(|expiry| *expiry > now)
    }
}

// ======================================================================
// Simulator-side handlers
// ======================================================================

impl Simulator {
    /// Resolves the next hop toward `dst`: a valid routing entry (whose
    /// expiry is refreshed by use), or the destination itself when it is
    /// a live neighbor.
    pub(crate) fn route_resolve(&mut self, n: NodeId, dst: NodeId) -> Option<NodeId> {
        let now = self.queue.now();
        let lifetime = SimTime::from_micros(self.config.active_route_timeout);
        let aodv = &mut self.nodes[n.index()].aodv;

        if let Some(entry) = aodv.routes.get_mut(&dst) {
            if entry.is_valid(now) {
                entry.expires_at = now + lifetime;
                return Some(entry.next_hop);
            }
        }
        if aodv.neighbor_alive(dst, now) {
            // One-hop reachability doubles as a route.
            aodv.consider_install(dst, dst, 1, aodv.last_known_seq(dst), now, lifetime);
            return Some(dst);
        }
        None
    }

    /// Parks a packet awaiting discovery, starting the discovery if this
    /// destination has no flood outstanding.
    pub(crate) fn route_buffer_and_discover(
        &mut self,
        n: NodeId,
        packet: Packet,
    ) -> Result<(), SimError> {
        let now = self.queue.now();
        let dst = packet.dst;
        let fresh_destination = {
            let aodv = &mut self.nodes[n.index()].aodv;
            let fresh = !aodv.buffer.contains_key(&dst);
            aodv.buffer
                .entry(dst)
                .or_default()
                .push(Buffered { packet, since: now });
            fresh
        };
        if fresh_destination {
            self.route_start_discovery(n, dst)?;
        }
        Ok(())
    }

    /// Increments the node's sequence and flood id and broadcasts a RREQ.
    pub(crate) fn route_start_discovery(&mut self, n: NodeId, dst: NodeId) -> Result<(), SimError> {
        let now = self.queue.now();
        let rreq = {
            let aodv = &mut self.nodes[n.index()].aodv;
            aodv.seq += 1;
            aodv.rreq_id += 1;
            let rreq = RouteRequest {
                originator: n,
                destination: dst,
                broadcast_id: aodv.rreq_id,
                originator_seq: aodv.seq,
                dest_seq: aodv.last_known_seq(dst),
                hop_count: 0,
            };
            // Never re-forward our own flood when a copy echoes back.
            aodv.seen_rreq
                .insert((n, aodv.rreq_id), now + RREQ_DUPLICATE_WINDOW);
            rreq
        };
        self.metrics.record_discovery(n);
        debug!(node = %n, destination = %dst, id = rreq.broadcast_id, "route discovery");

        let packet = self.make_packet(n, NodeId::BROADCAST, PacketBody::RouteRequest(rreq));
        self.enqueue_packet(n, packet)
    }

    /// Hello received: refresh the sender's neighbor entry.
    pub(crate) fn routing_on_hello(&mut self, n: NodeId, peer: NodeId) {
        let expiry = self.queue.now() + SimTime::from_micros(self.config.neighbor_timeout);
        self.nodes[n.index()].aodv.neighbors.insert(peer, expiry);
    }

    /// RREQ received, possibly answering or re-flooding it.
    pub(crate) fn routing_on_rreq(
        &mut self,
        n: NodeId,
        packet: &Packet,
        rreq: &RouteRequest,
        mac_sender: NodeId,
    ) -> Result<(), SimError> {
        let now = self.queue.now();
        let lifetime = SimTime::from_micros(self.config.active_route_timeout);

        let duplicate = {
            let aodv = &mut self.nodes[n.index()].aodv;
            let key = (rreq.originator, rreq.broadcast_id);
            let seen = aodv.seen_rreq.get(&key).is_some_and(|expiry| *expiry > now);
            if !seen {
                aodv.seen_rreq.insert(key, now + RREQ_DUPLICATE_WINDOW);
            }
            seen
        };
        if duplicate {
            trace!(node = %n, originator = %rreq.originator, id = rreq.broadcast_id, "duplicate rreq");
            return Ok(());
        }

        // Reverse route toward the originator through whoever relayed this.
        self.nodes[n.index()].aodv.consider_install(
            rreq.originator,
            mac_sender,
            rreq.hop_count + 1,
            rreq.originator_seq,
            now,
            lifetime,
        );

        if n == rreq.destination {
            let dest_seq = {
                let aodv = &mut self.nodes[n.index()].aodv;
                aodv.seq = aodv.seq.max(rreq.dest_seq);
                aodv.seq
            };
            return self.route_send_reply(n, rreq.originator, rreq.destination, dest_seq, 0);
        }

        let known = self.nodes[n.index()]
            .aodv
            .valid_route(rreq.destination, now)
            .filter(|e| e.seq >= rreq.dest_seq)
            .map(|e| (e.seq, e.hop_count));
        if let Some((seq, hops)) = known {
            // Fresh enough intermediate knowledge answers on the
            // destination's behalf.
            return self.route_send_reply(n, rreq.originator, rreq.destination, seq, hops);
        }

        // Re-flood one hop wider.
        if packet.ttl <= 1 {
            return Ok(());
        }
        let forward = RouteRequest {
            hop_count: rreq.hop_count + 1,
            ..rreq.clone()
        };
        let mut relay = self.make_packet(n, NodeId::BROADCAST, PacketBody::RouteRequest(forward));
        relay.ttl = packet.ttl - 1;
        self.enqueue_packet(n, relay)
    }

    fn route_send_reply(
        &mut self,
        n: NodeId,
        originator: NodeId,
        destination: NodeId,
        dest_seq: u32,
        hop_count: u32,
    ) -> Result<(), SimError> {
        let rrep = RouteReply {
            destination,
            dest_seq,
            hop_count,
            originator,
        };
        debug!(node = %n, destination = %destination, originator = %originator, "sending rrep");
        let packet = self.make_packet(n, originator, PacketBody::RouteReply(rrep));
        self.enqueue_packet(n, packet)
    }

    /// RREP received: install the forward route; at the originator drain
    /// the waiting packets, elsewhere forward along the reverse route.
    pub(crate) fn routing_on_rrep(
        &mut self,
        n: NodeId,
        packet: &Packet,
        rrep: &RouteReply,
        mac_sender: NodeId,
    ) -> Result<(), SimError> {
        let now = self.queue.now();
        let lifetime = SimTime::from_micros(self.config.active_route_timeout);

        self.nodes[n.index()].aodv.consider_install(
            rrep.destination,
            mac_sender,
            rrep.hop_count + 1,
            rrep.dest_seq,
            now,
            lifetime,
        );

        if n == rrep.originator {
            return self.route_drain_buffer(n, rrep.destination);
        }

        if packet.ttl <= 1 {
            return Ok(());
        }
        let forward = RouteReply {
            hop_count: rrep.hop_count + 1,
            ..rrep.clone()
        };
        let mut relay = self.make_packet(n, rrep.originator, PacketBody::RouteReply(forward));
        relay.ttl = packet.ttl - 1;
        self.enqueue_packet(n, relay)
    }

    /// Moves every packet waiting for `dst` back into the transmit queue.
    pub(crate) fn route_drain_buffer(&mut self, n: NodeId, dst: NodeId) -> Result<(), SimError> {
        let waiting = self.nodes[n.index()].aodv.buffer.remove(&dst);
        let Some(waiting) = waiting else {
            return Ok(());
        };
        debug!(node = %n, destination = %dst, count = waiting.len(), "draining packet buffer");
        for buffered in waiting {
            self.enqueue_packet(n, buffered.packet)?;
        }
        Ok(())
    }

    /// MAC gave up on a frame toward `next_hop`: invalidate every route
    /// through it and advertise the loss.
    pub(crate) fn routing_on_link_break(
        &mut self,
        n: NodeId,
        packet: &Packet,
    ) -> Result<(), SimError> {
        let Some(broken_hop) = packet.next_hop else {
            return Ok(());
        };
        let unreachable = {
            let aodv = &mut self.nodes[n.index()].aodv;
            aodv.neighbors.remove(&broken_hop);
            let lost: Vec<(NodeId, u32)> = aodv
                .routes
                .iter()
                .filter(|(_, e)| e.next_hop == broken_hop)
                .map(|(dst, e)| (*dst, e.seq))
                .collect();
            for (dst, _) in &lost {
                aodv.routes.remove(dst);
            }
            lost
        };
        if unreachable.is_empty() {
            return Ok(());
        }
        self.metrics.record_invalidated(n, unreachable.len() as u64);
        debug!(node = %n, broken = %broken_hop, routes = unreachable.len(), "link break, sending rerr");

        let rerr = RouteError { unreachable };
        let packet = self.make_packet(n, NodeId::BROADCAST, PacketBody::RouteError(rerr));
        self.enqueue_packet(n, packet)
    }

    /// RERR received: invalidate matching entries, propagate if any fell.
    pub(crate) fn routing_on_rerr(
        &mut self,
        n: NodeId,
        rerr: &RouteError,
        mac_sender: NodeId,
    ) -> Result<(), SimError> {
        let invalidated = {
            let aodv = &mut self.nodes[n.index()].aodv;
            let mut fell = Vec::new();
            for (dst, seq) in &rerr.unreachable {
                if aodv
                    .routes
                    .get(dst)
                    .is_some_and(|e| e.next_hop == mac_sender)
                {
                    aodv.routes.remove(dst);
                    fell.push((*dst, *seq));
                }
            }
            fell
        };
        if invalidated.is_empty() {
            return Ok(());
        }
        self.metrics.record_invalidated(n, invalidated.len() as u64);

        let rerr = RouteError {
            unreachable: invalidated,
        };
        let packet = self.make_packet(n, NodeId::BROADCAST, PacketBody::RouteError(rerr));
        self.enqueue_packet(n, packet)
    }

    /// Periodic 1 s sweep: purge expired state, expire buffered packets,
    /// and re-issue discovery while buffered traffic remains.
    pub(crate) fn routing_sweep(&mut self, n: NodeId) -> Result<(), SimError> {
        let now = self.queue.now();
        let lifetime = SimTime::from_micros(self.config.packet_lifetime);

        self.nodes[n.index()]
            .seen_data
            .retain(|_, since| *since + lifetime > now);

        let (expired_routes, retry_dsts, expired_packets) = {
            let aodv = &mut self.nodes[n.index()].aodv;

            let before = aodv.routes.len();
            aodv.routes.retain(|_, e| e.is_valid(now));
            let expired_routes = (before - aodv.routes.len()) as u64;

            aodv.neighbors.retain(|_, expiry| *expiry > now);
            aodv.seen_rreq.retain(|_, expiry| *expiry > now);

            let mut expired_packets = 0u64;
            for waiting in aodv.buffer.values_mut() {
                let before = waiting.len();
                waiting.retain(|b| b.since + lifetime > now);
                expired_packets += (before - waiting.len()) as u64;
            }
            aodv.buffer.retain(|_, waiting| !waiting.is_empty());

            let retry_dsts: Vec<NodeId> = aodv
                .buffer
                .keys()
                .copied()
                .filter(|dst| aodv.valid_route(*dst, now).is_none())
                .collect();
            (expired_routes, retry_dsts, expired_packets)
        };

        if expired_routes > 0 {
            self.metrics.record_invalidated(n, expired_routes);
        }
        for _ in 0..expired_packets {
            self.metrics.record_drop(n, DropCause::Ttl);
        }

        for dst in retry_dsts {
            self.route_start_discovery(n, dst)?;
        }

        // Destinations that gained a route by other means drain now.
        let ready: Vec<NodeId> = {
            let aodv = &self.nodes[n.index()].aodv;
            aodv.buffer
                .keys()
                .copied()
                .filter(|dst| aodv.valid_route(*dst, now).is_some())
                .collect()
        };
        for dst in ready {
            self.route_drain_buffer(n, dst)?;
        }
        Ok(())
    }

    /// Periodic Hello broadcast.
    pub(crate) fn hello_beacon(&mut self, n: NodeId) -> Result<(), SimError> {
        if self.nodes[n.index()].sleeping {
            return Ok(());
        }
        let mut packet = self.make_packet(n, NodeId::BROADCAST, PacketBody::Hello);
        packet.ttl = 1;
        self.enqueue_packet(n, packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIFETIME: SimTime = SimTime::from_secs(3);

    #[test]
    fn test_freshness_rule() {
        let now = SimTime::from_secs(1);
        let mut aodv = Aodv::default();
        assert!(aodv.consider_install(NodeId(9), NodeId(1), 3, 5, now, LIFETIME));

        // Lower sequence: rejected.
        assert!(!aodv.consider_install(NodeId(9), NodeId(2), 1, 4, now, LIFETIME));
        // Same sequence, more hops: rejected.
        assert!(!aodv.consider_install(NodeId(9), NodeId(2), 4, 5, now, LIFETIME));
        // Same sequence, fewer hops: accepted.
        assert!(aodv.consider_install(NodeId(9), NodeId(2), 2, 5, now, LIFETIME));
        // Higher sequence always wins, hops notwithstanding.
        assert!(aodv.consider_install(NodeId(9), NodeId(3), 9, 6, now, LIFETIME));
        assert_eq!(aodv.routes[&NodeId(9)].next_hop, NodeId(3));
    }

    #[test]
    fn test_expired_entry_is_always_replaced() {
        let mut aodv = Aodv::default();
        aodv.consider_install(NodeId(9), NodeId(1), 3, 5, SimTime::ZERO, LIFETIME);
        let later = SimTime::from_secs(10);
        assert!(aodv.valid_route(NodeId(9), later).is_none());
        // A stale high-seq entry does not outrank a fresh lower-seq one.
        assert!(aodv.consider_install(NodeId(9), NodeId(2), 7, 1, later, LIFETIME));
        assert_eq!(aodv.routes[&NodeId(9)].next_hop, NodeId(2));
    }

    #[test]
    fn test_validity_is_expiry_based() {
        let mut aodv = Aodv::default();
        aodv.consider_install(NodeId(4), NodeId(1), 1, 1, SimTime::ZERO, LIFETIME);
        assert!(aodv.valid_route(NodeId(4), SimTime::from_secs(2)).is_some());
        assert!(aodv.valid_route(NodeId(4), SimTime::from_secs(3)).is_none());
        assert_eq!(aodv.last_known_seq(NodeId(4)), 1);
        assert_eq!(aodv.last_known_seq(NodeId(5)), 0);
    }

    #[test]
    fn test_neighbor_liveness() {
        let mut aodv = Aodv::default();
        aodv.neighbors.insert(NodeId(2), SimTime::from_secs(5));
        assert!(aodv.neighbor_alive(NodeId(2), SimTime::from_secs(4)));
        assert!(!aodv.neighbor_alive(NodeId(2), SimTime::from_secs(5)));
        assert!(!aodv.neighbor_alive(NodeId(3), SimTime::ZERO));
    }
}
