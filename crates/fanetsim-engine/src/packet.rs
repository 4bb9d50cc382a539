//! Packets and frames.
//!
//! A packet is immutable once created except for its forwarding metadata:
//! next hop, TTL, and the per-hop transmission attempt counter. The
//! attempt counter deliberately travels with the packet — a node that
//! re-routes a packet after a route error keeps the accumulated count,
//! while a downstream node receiving it for forwarding starts at zero.

use fanetsim_common::{NodeId, PacketId, SimTime};

// Control frame lengths in bits, header included.
pub const HELLO_LENGTH_BITS: u32 = 256;
pub const RREQ_LENGTH_BITS: u32 = 384;
pub const RREP_LENGTH_BITS: u32 = 320;
pub const RERR_BASE_LENGTH_BITS: u32 = 288;
pub const RERR_ENTRY_LENGTH_BITS: u32 = 64;
pub const ACK_LENGTH_BITS: u32 = 128;
/// Link-layer and network-layer header bits carried by a data frame.
pub const DATA_HEADER_BITS: u32 = 320;

/// Route request flooded during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRequest {
    pub originator: NodeId,
    pub destination: NodeId,
    /// Per-originator monotonic flood identifier.
    pub broadcast_id: u32,
    pub originator_seq: u32,
    /// Last destination sequence number known to the originator; 0 if none.
    pub dest_seq: u32,
    pub hop_count: u32,
}

/// Route reply unicast back along the reverse path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteReply {
    pub destination: NodeId,
    pub dest_seq: u32,
    pub hop_count: u32,
    pub originator: NodeId,
}

/// Route error advertising broken destinations upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteError {
    /// (unreachable destination, last known sequence number)
    pub unreachable: Vec<(NodeId, u32)>,
}

/// The closed set of packet kinds on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketBody {
    Data {
        payload_bits: u32,
    },
    /// Periodic one-hop presence beacon; never forwarded.
    Hello,
    RouteRequest(RouteRequest),
    RouteReply(RouteReply),
    RouteError(RouteError),
    /// One-hop acknowledgment of a unicast frame.
    Ack {
        acked: PacketId,
    },
}

impl PacketBody {
    /// Frames that are sent without ACK or retry.
    pub fn is_broadcast_frame(&self) -> bool {
        matches!(
            self,
            PacketBody::Hello | PacketBody::RouteRequest(_) | PacketBody::RouteError(_)
        )
    }

    /// Short label used in logs and control-traffic metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PacketBody::Data { .. } => "data",
            PacketBody::Hello => "hello",
            PacketBody::RouteRequest(_) => "rreq",
            PacketBody::RouteReply(_) => "rrep",
            PacketBody::RouteError(_) => "rerr",
            PacketBody::Ack { .. } => "ack",
        }
    }
}

/// A packet in flight or queued.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub id: PacketId,
    pub src: NodeId,
    pub dst: NodeId,
    pub created_at: SimTime,
    pub ttl: u8,
    pub body: PacketBody,

    // Forwarding metadata, mutable per hop.
    pub next_hop: Option<NodeId>,
    /// Transmission attempts by the node currently holding the packet.
    pub attempts: u8,
}

impl Packet {
    pub fn new(id: PacketId, src: NodeId, dst: NodeId, created_at: SimTime, ttl: u8, body: PacketBody) -> Self {
        Packet {
            id,
            src,
            dst,
            created_at,
            ttl,
            body,
            next_hop: None,
            attempts: 0,
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self.body, PacketBody::Data { .. })
    }

    /// On-air length in bits, headers included.
    pub fn length_bits(&self) -> u32 {
        match &self.body {
            PacketBody::Data { payload_bits } => DATA_HEADER_BITS + payload_bits,
            PacketBody::Hello => HELLO_LENGTH_BITS,
            PacketBody::RouteRequest(_) => RREQ_LENGTH_BITS,
            PacketBody::RouteReply(_) => RREP_LENGTH_BITS,
            PacketBody::RouteError(e) => {
                RERR_BASE_LENGTH_BITS + RERR_ENTRY_LENGTH_BITS * e.unreachable.len() as u32
            }
            PacketBody::Ack { .. } => ACK_LENGTH_BITS,
        }
    }

    /// Payload bits counted toward delivered throughput.
    pub fn payload_bits(&self) -> u32 {
        match self.body {
            PacketBody::Data { payload_bits } => payload_bits,
            _ => 0,
        }
    }
}
