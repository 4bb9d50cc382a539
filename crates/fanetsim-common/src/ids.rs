//! Node and packet identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Dense node identifier, `0..number_of_drones`.
///
/// Cross-component references (a follower's leader, a packet's next hop)
/// are id-indexed lookups into the node registry, never owning handles.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Destination sentinel for one-hop and flooded frames.
    pub const BROADCAST: NodeId = NodeId(u32::MAX);

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub const fn is_broadcast(self) -> bool {
        self.0 == u32::MAX
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_broadcast() {
            write!(f, "uav-*")
        } else {
            write!(f, "uav-{}", self.0)
        }
    }
}

/// Globally unique, ascending packet identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PacketId(pub u64);

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pkt-{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_sentinel() {
        assert!(NodeId::BROADCAST.is_broadcast());
        assert!(!NodeId(0).is_broadcast());
        assert_eq!(NodeId::BROADCAST.to_string(), "uav-*");
        assert_eq!(NodeId(3).to_string(), "uav-3");
    }
}
