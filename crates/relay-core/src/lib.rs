//! relay-core: Shared model for the peer-discovery relay.
//!
//! This crate provides:
//! - `Member`, the per-host identity peers are registered under
//! - The `MembershipStore` trait and an in-memory implementation
//! - Peer-list filtering and wire encoding

pub mod member;
pub mod peers;
pub mod store;

pub use member::Member;
pub use peers::{encode_peer_list, filter_peers};
pub use store::{InMemoryStore, MembershipStore, StoreError};
