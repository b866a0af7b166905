//! Reportable-address predicate.
//!
//! A sensor must only report globally routable unicast addresses. IPv4
//! excludes RFC 1918 private space, loopback, link-local, multicast,
//! shared (CGN), documentation, benchmarking and the reserved 240/4 block.
//! IPv6 only accepts the global unicast block 2000::/3, minus the
//! documentation and IETF protocol assignment ranges; this rejects
//! loopback, unspecified, IPv4-mapped, unique-local, link-local,
//! site-local, multicast and every reserved prefix in one rule.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::error::EligibilityError;

/// Decides whether an address may appear in a report.
pub trait EligibilityOracle: Send + Sync {
    fn is_reportable(&self, address: &IpAddr) -> bool;

    fn check(&self, address: IpAddr) -> Result<IpAddr, EligibilityError> {
        if self.is_reportable(&address) {
            Ok(address)
        } else {
            Err(EligibilityError(address))
        }
    }
}

/// The standard exclusion list described in the module docs.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalUnicast;

impl EligibilityOracle for GlobalUnicast {
    fn is_reportable(&self, address: &IpAddr) -> bool {
        is_reportable(address)
    }
}

pub fn is_reportable(address: &IpAddr) -> bool {
    match address {
        IpAddr::V4(v4) => is_reportable_v4(v4),
        IpAddr::V6(v6) => is_reportable_v6(v6),
    }
}

fn is_reportable_v4(address: &Ipv4Addr) -> bool {
    let [a, b, c, _] = address.octets();

    let this_network = a == 0;
    let shared = a == 100 && (b & 0xc0) == 64;
    let ietf_assignments = a == 192 && b == 0 && c == 0;
    let benchmarking = a == 198 && (b & 0xfe) == 18;
    let reserved = a >= 240;

    !(this_network
        || address.is_private()
        || address.is_loopback()
        || address.is_link_local()
        || address.is_multicast()
        || address.is_documentation()
        || shared
        || ietf_assignments
        || benchmarking
        || reserved)
}

fn is_reportable_v6(address: &Ipv6Addr) -> bool {
    let segments = address.segments();

    let global_unicast = (segments[0] & 0xe000) == 0x2000;
    let documentation = segments[0] == 0x2001 && segments[1] == 0x0db8;
    let ietf_assignments = segments[0] == 0x2001 && segments[1] < 0x0200;

    global_unicast && !documentation && !ietf_assignments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_public_ipv4_is_reportable() {
        for addr in ["5.79.73.204", "93.184.216.34", "8.8.8.8", "1.1.1.1"] {
            assert!(is_reportable(&ip(addr)), "{addr} should be reportable");
        }
    }

    #[test]
    fn test_excluded_ipv4_ranges() {
        for addr in [
            "0.0.0.0",
            "10.0.0.1",
            "172.16.5.4",
            "192.168.1.1",
            "127.0.0.1",
            "169.254.10.10",
            "224.0.0.1",
            "239.255.255.250",
            "100.64.0.1",
            "192.0.0.8",
            "192.0.2.1",
            "198.18.0.1",
            "198.51.100.7",
            "203.0.113.9",
            "240.0.0.1",
            "255.255.255.255",
        ] {
            assert!(!is_reportable(&ip(addr)), "{addr} should be excluded");
        }
    }

    #[test]
    fn test_public_ipv6_is_reportable() {
        assert!(is_reportable(&ip("2606:2800:220:1:248:1893:25c8:1946")));
        assert!(is_reportable(&ip("2a00:1450:4001:82a::200e")));
    }

    #[test]
    fn test_excluded_ipv6_ranges() {
        for addr in [
            "::",
            "::1",
            "::ffff:8.8.8.8",
            "fc00::1",
            "fd12:3456::1",
            "fe80::1",
            "fec0::1",
            "ff02::1",
            "2001:db8::1",
            "2001:10::1",
            "4000::1",
        ] {
            assert!(!is_reportable(&ip(addr)), "{addr} should be excluded");
        }
    }

    #[test]
    fn test_oracle_check_returns_error() {
        let oracle = GlobalUnicast;
        assert_eq!(
            oracle.check(ip("127.0.0.1")),
            Err(EligibilityError(ip("127.0.0.1")))
        );
        assert_eq!(oracle.check(ip("8.8.4.4")), Ok(ip("8.8.4.4")));
    }
}
