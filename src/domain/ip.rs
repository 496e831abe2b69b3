use std::net::IpAddr;

/// IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) compare as plain IPv4.
fn canonical(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    }
}

/// True when `client` is one of the department's registered addresses.
/// An empty allow-list means IP check-in has not been set up.
pub fn is_ip_check_in_allowed(client: IpAddr, allowed: &[IpAddr]) -> bool {
    let client = canonical(client);
    allowed.iter().any(|ip| canonical(*ip) == client)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn exact_match_is_allowed() {
        let allowed = vec![ip("203.0.113.7"), ip("198.51.100.1")];
        assert!(is_ip_check_in_allowed(ip("198.51.100.1"), &allowed));
        assert!(!is_ip_check_in_allowed(ip("198.51.100.2"), &allowed));
    }

    #[test]
    fn empty_allow_list_denies() {
        assert!(!is_ip_check_in_allowed(ip("127.0.0.1"), &[]));
    }

    #[test]
    fn mapped_ipv6_matches_ipv4_entry() {
        let allowed = vec![ip("203.0.113.7")];
        assert!(is_ip_check_in_allowed(ip("::ffff:203.0.113.7"), &allowed));

        let allowed = vec![ip("::ffff:203.0.113.7")];
        assert!(is_ip_check_in_allowed(ip("203.0.113.7"), &allowed));
    }

    #[test]
    fn native_ipv6() {
        let allowed = vec![ip("2001:db8::1")];
        assert!(is_ip_check_in_allowed(ip("2001:db8::1"), &allowed));
        assert!(!is_ip_check_in_allowed(ip("2001:db8::2"), &allowed));
    }
}
