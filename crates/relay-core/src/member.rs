//! Member: the identity a connected peer is registered under.
//!
//! A member is the peer's IP address with the port stripped. Two connections
//! from the same host map to the same member.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::net::SocketAddr;

/// A registered peer identity in the shared membership set.
///
/// # Examples
/// ```
/// use relay_core::Member;
///
/// let addr = "192.168.1.10:53122".parse().unwrap();
/// assert_eq!(Member::from_socket_addr(addr).as_str(), "192.168.1.10");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Member(String);

impl Member {
    /// Wrap a raw store value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive a member from a transport endpoint by stripping the port.
    ///
    /// IPv4-mapped IPv6 addresses (as reported by dual-stack listeners)
    /// collapse to their IPv4 form. IPv6 addresses carry no brackets.
    pub fn from_socket_addr(addr: SocketAddr) -> Self {
        Self(addr.ip().to_canonical().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Member {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<SocketAddr> for Member {
    fn from(addr: SocketAddr) -> Self {
        Self::from_socket_addr(addr)
    }
}
