use std::net::IpAddr;

use indexmap::IndexMap;

use super::peer_id::PeerId;

/// Key under which a peer lives inside a torrent's seeder/leecher map.
///
/// Composed the same way the upstream tracker builds it: one byte of the
/// peer id chosen by the owning torrent's id (so that two swarms sharing a
/// peer-id-reusing client don't collide if their maps were ever merged),
/// the user id (so that two users behind the same NAT-translated peer id are
/// tracked as distinct peers), and the full peer id.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct PeerKey {
    pub disambiguator: u8,
    pub user_id: u32,
    pub peer_id: PeerId,
}

pub type PeerMap = IndexMap<PeerKey, Peer>;

/// A single client's state within one torrent's swarm.
///
/// Peers are not globally indexed; a `Peer` lives exclusively inside the
/// `PeerMap` of the torrent that owns it. The `user_id` field is a lookup
/// key into the user store, never an owning reference.
#[derive(Clone, Debug)]
pub struct Peer {
    pub uploaded: u64,
    pub downloaded: u64,
    pub corrupt: u64,
    pub left: u64,
    pub first_announced: i64,
    pub last_announced: i64,
    pub announces: u32,
    pub port: u16,
    pub ip: IpAddr,
    pub ip_port: Option<[u8; 6]>,
    pub invalid_ip: bool,
    pub visible: bool,
    pub user_id: u32,
}

impl Peer {
    pub fn is_seeder(&self) -> bool {
        self.left == 0
    }
}

/// Packs an IPv4 address and port into the 6-byte compact peer entry.
/// Returns `None` for anything that isn't representable as 4 address bytes
/// plus 2 port bytes (i.e. any IPv6 address; see spec §1 Non-goals).
pub fn pack_ip_port(ip: IpAddr, port: u16) -> Option<[u8; 6]> {
    match ip {
        IpAddr::V4(v4) => {
            let octets = v4.octets();
            let port = port.to_be_bytes();
            Some([octets[0], octets[1], octets[2], octets[3], port[0], port[1]])
        }
        IpAddr::V6(_) => None,
    }
}

/// An address is invalid for tracker purposes if it isn't a routable IPv4
/// address a remote peer could dial back.
pub fn is_invalid_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private() || v4.is_loopback() || v4.is_unspecified() || is_reserved_v4(v4)
        }
        IpAddr::V6(_) => true,
    }
}

fn is_reserved_v4(v4: std::net::Ipv4Addr) -> bool {
    // 240.0.0.0/4 reserved, 100.64.0.0/10 carrier-grade NAT, 169.254.0.0/16 link-local.
    let octets = v4.octets();
    octets[0] >= 240
        || (octets[0] == 100 && (64..=127).contains(&octets[1]))
        || (octets[0] == 169 && octets[1] == 254)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn packs_ipv4_big_endian() {
        let ip = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 5));
        assert_eq!(pack_ip_port(ip, 0x1A2B), Some([203, 0, 113, 5, 0x1A, 0x2B]));
    }

    #[test]
    fn ipv6_has_no_compact_form() {
        let ip: IpAddr = "2001:db8::1".parse().unwrap();
        assert_eq!(pack_ip_port(ip, 1), None);
        assert!(is_invalid_ip(ip));
    }

    #[test]
    fn private_and_loopback_are_invalid() {
        assert!(is_invalid_ip(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))));
        assert!(is_invalid_ip(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))));
        assert!(is_invalid_ip(IpAddr::V4(Ipv4Addr::UNSPECIFIED)));
        assert!(!is_invalid_ip(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 5))));
    }
}
