//! Expand subnet specs into the addresses to probe.

use std::collections::HashSet;
use std::net::IpAddr;

use ipnet::IpNet;

/// Parse a subnet in CIDR notation. Host bits in the base address are
/// tolerated and truncated; a bare address is a single-host network.
pub fn parse_network(subnet: &str) -> Result<IpNet, ipnet::AddrParseError> {
    let subnet = subnet.trim();
    match subnet.parse::<IpAddr>() {
        Ok(addr) => format!("{addr}/{}", max_prefix(addr)).parse(),
        Err(_) => subnet.parse::<IpNet>().map(|net| net.trunc()),
    }
}

fn max_prefix(addr: IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

/// Parse exclusion entries, warning about and dropping anything that is not
/// an IP address.
pub fn parse_exclusions(entries: &[String]) -> HashSet<IpAddr> {
    entries
        .iter()
        .filter_map(|entry| match entry.trim().parse::<IpAddr>() {
            Ok(ip) => Some(ip),
            Err(e) => {
                tracing::warn!(entry = %entry, error = %e, "Ignoring invalid excluded address");
                None
            }
        })
        .collect()
}

/// Lazily yield every usable host address of `subnets`, in input order and
/// ascending within a subnet.
///
/// Network and broadcast addresses are never produced. Excluded addresses
/// and addresses already produced by an earlier subnet are skipped. Invalid
/// subnets are logged and skipped.
pub fn enumerate<'a>(
    subnets: &'a [String],
    exclude: &'a HashSet<IpAddr>,
) -> impl Iterator<Item = IpAddr> + 'a {
    let mut seen = HashSet::new();

    subnets
        .iter()
        .filter_map(|subnet| match parse_network(subnet) {
            Ok(net) => {
                tracing::debug!(subnet = %subnet, network = %net, "Enumerating subnet");
                Some(net)
            }
            Err(e) => {
                tracing::warn!(subnet = %subnet, error = %e, "Skipping invalid subnet");
                None
            }
        })
        .flat_map(usable_hosts)
        .filter(move |ip| !exclude.contains(ip))
        .filter(move |ip| seen.insert(*ip))
}

/// Host addresses of `net`. Below /127 the IPv6 network address is the
/// subnet-router anycast address and is left out.
fn usable_hosts(net: IpNet) -> impl Iterator<Item = IpAddr> {
    let anycast = match net {
        IpNet::V6(v6) if v6.prefix_len() < 127 => Some(IpAddr::V6(v6.network())),
        _ => None,
    };
    net.hosts().filter(move |ip| Some(*ip) != anycast)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn subnets(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn collect(list: &[&str], exclude: &[&str]) -> Vec<IpAddr> {
        let subnets = subnets(list);
        let exclude: HashSet<IpAddr> = exclude.iter().map(|s| ip(s)).collect();
        enumerate(&subnets, &exclude).collect()
    }

    #[test]
    fn slash_30_has_two_usable_addresses() {
        assert_eq!(
            collect(&["10.0.0.0/30"], &[]),
            vec![ip("10.0.0.1"), ip("10.0.0.2")]
        );
    }

    #[test]
    fn enumerated_set_is_hosts_minus_exclusions() {
        let excluded = ["192.168.1.1", "192.168.1.7", "10.9.9.9"];
        let addrs = collect(&["192.168.1.0/28"], &excluded);

        let expected: Vec<IpAddr> = (1..15)
            .map(|n| ip(&format!("192.168.1.{n}")))
            .filter(|a| !excluded.contains(&a.to_string().as_str()))
            .collect();
        assert_eq!(addrs, expected);
        assert!(!addrs.contains(&ip("192.168.1.0")));
        assert!(!addrs.contains(&ip("192.168.1.15")));
    }

    #[test]
    fn host_bits_are_tolerated() {
        assert_eq!(
            collect(&["10.0.0.5/30"], &[]),
            vec![ip("10.0.0.5"), ip("10.0.0.6")]
        );
    }

    #[test]
    fn invalid_subnets_are_skipped() {
        assert_eq!(
            collect(&["not-a-subnet", "10.0.0.0/33", "10.0.0.0/30"], &[]),
            vec![ip("10.0.0.1"), ip("10.0.0.2")]
        );
    }

    #[test]
    fn overlapping_subnets_are_deduplicated() {
        let addrs = collect(&["10.0.0.0/30", "10.0.0.0/29"], &[]);
        assert_eq!(addrs.len(), 6);
        assert_eq!(&addrs[..2], &[ip("10.0.0.1"), ip("10.0.0.2")]);
        let unique: HashSet<_> = addrs.iter().collect();
        assert_eq!(unique.len(), addrs.len());
    }

    #[test]
    fn point_to_point_and_single_hosts() {
        assert_eq!(
            collect(&["10.0.0.0/31"], &[]),
            vec![ip("10.0.0.0"), ip("10.0.0.1")]
        );
        assert_eq!(collect(&["10.0.0.9/32"], &[]), vec![ip("10.0.0.9")]);
        assert_eq!(collect(&["10.0.0.9"], &[]), vec![ip("10.0.0.9")]);
    }

    #[test]
    fn ipv6_skips_the_network_address() {
        assert_eq!(
            collect(&["2001:db8::/126"], &[]),
            vec![ip("2001:db8::1"), ip("2001:db8::2"), ip("2001:db8::3")]
        );
        assert_eq!(
            collect(&["2001:db8::/127"], &[]),
            vec![ip("2001:db8::"), ip("2001:db8::1")]
        );
        assert_eq!(collect(&["2001:db8::5"], &[]), vec![ip("2001:db8::5")]);
    }

    #[test]
    fn exclusions_ignore_garbage_entries() {
        let excluded = parse_exclusions(&subnets(&["10.0.0.1", "gateway", " 10.0.0.2 "]));
        assert_eq!(excluded.len(), 2);
        assert!(excluded.contains(&ip("10.0.0.2")));
    }
}
