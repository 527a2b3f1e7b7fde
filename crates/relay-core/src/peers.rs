//! Peer-list construction for a joining client.

use crate::member::Member;

/// Drop `own` from a store snapshot, keeping the store's order.
pub fn filter_peers(members: Vec<Member>, own: &Member) -> Vec<Member> {
    members.into_iter().filter(|m| m != own).collect()
}

/// Encode a peer list as the UTF-8 JSON array sent to a joining client.
///
/// An empty list encodes as `[]`.
pub fn encode_peer_list(peers: &[Member]) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(peers)
}
