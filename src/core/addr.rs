//! Peer address helpers shared by the session table and the endpoints.
//!
//! Dual-stack sockets report IPv4 peers as IPv4-mapped IPv6 addresses
//! (`[::ffff:192.0.2.1]:5684`), while callers usually hold the plain IPv4 form.
//! Sessions store the canonical form so both spellings find the same peer.

use std::net::{IpAddr, SocketAddr};

/// Canonical form of a peer address: IPv4-mapped IPv6 collapses to IPv4.
pub fn canonical_peer(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => SocketAddr::new(IpAddr::V4(v4), addr.port()),
            None => addr,
        },
        IpAddr::V4(_) => addr,
    }
}

/// Whether two addresses name the same peer.
pub fn same_peer(a: SocketAddr, b: SocketAddr) -> bool {
    canonical_peer(a) == canonical_peer(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_peer_unmaps_ipv4() {
        let mapped: SocketAddr = "[::ffff:192.0.2.1]:5684".parse().unwrap();
        let plain: SocketAddr = "192.0.2.1:5684".parse().unwrap();
        assert_eq!(canonical_peer(mapped), plain);
        assert_eq!(canonical_peer(plain), plain);
    }

    #[test]
    fn test_canonical_peer_keeps_native_ipv6() {
        let v6: SocketAddr = "[2001:db8::1]:5684".parse().unwrap();
        assert_eq!(canonical_peer(v6), v6);
    }

    #[test]
    fn test_same_peer() {
        let mapped: SocketAddr = "[::ffff:10.1.2.3]:9000".parse().unwrap();
        let plain: SocketAddr = "10.1.2.3:9000".parse().unwrap();
        let other_port: SocketAddr = "10.1.2.3:9001".parse().unwrap();
        assert!(same_peer(mapped, plain));
        assert!(!same_peer(plain, other_port));
    }
}
