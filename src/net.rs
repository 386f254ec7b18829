//! IPv4 endpoint selection for the host role.
//!
//! Enumerating interfaces belongs to the surrounding application; this module
//! takes whatever it found and turns it into the address we advertise and the
//! broadcast address we advertise to.

use std::net::{IpAddr, Ipv4Addr};

use crate::error::ConfigError;

/// One address assigned to a network interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceAddress {
    pub name: String,
    pub ip: IpAddr,
    pub netmask: IpAddr,
}

/// Resolved host endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostEndpoint {
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub broadcast: Ipv4Addr,
}

impl HostEndpoint {
    pub fn new(ip: Ipv4Addr, netmask: Ipv4Addr) -> Self {
        Self {
            ip,
            netmask,
            broadcast: broadcast_address(ip, netmask),
        }
    }

    /// Parse `a.b.c.d/prefix`, or a bare address paired with a dotted netmask.
    pub fn parse(address: &str, netmask: Option<&str>) -> Result<Self, ConfigError> {
        let (ip_part, prefix) = match address.split_once('/') {
            Some((ip, prefix)) => (ip, Some(prefix)),
            None => (address, None),
        };

        let ip: Ipv4Addr = ip_part
            .parse()
            .map_err(|_| ConfigError::InvalidHostAddress(ip_part.to_string()))?;

        let netmask = match (prefix, netmask) {
            (Some(prefix), _) => {
                let bits: u8 = prefix
                    .parse()
                    .ok()
                    .filter(|b| *b <= 32)
                    .ok_or_else(|| ConfigError::InvalidNetmask(prefix.to_string()))?;
                prefix_to_netmask(bits)
            }
            (None, Some(mask)) => mask
                .parse()
                .map_err(|_| ConfigError::InvalidNetmask(mask.to_string()))?,
            (None, None) => prefix_to_netmask(24),
        };

        Ok(Self::new(ip, netmask))
    }
}

/// Directed broadcast address of the subnet `ip` lives in
pub fn broadcast_address(ip: Ipv4Addr, netmask: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(ip) | !u32::from(netmask))
}

pub fn prefix_to_netmask(bits: u8) -> Ipv4Addr {
    match bits {
        0 => Ipv4Addr::UNSPECIFIED,
        b if b >= 32 => Ipv4Addr::BROADCAST,
        b => Ipv4Addr::from(u32::MAX << (32 - u32::from(b))),
    }
}

/// Pick the IPv4 address of `interface`. When an interface carries several,
/// the last one listed wins.
pub fn select_ipv4(
    addresses: &[InterfaceAddress],
    interface: &str,
) -> Result<HostEndpoint, ConfigError> {
    let mut seen = false;
    let mut chosen = None;

    for addr in addresses.iter().filter(|a| a.name == interface) {
        seen = true;
        if let (IpAddr::V4(ip), IpAddr::V4(mask)) = (addr.ip, addr.netmask) {
            chosen = Some(HostEndpoint::new(ip, mask));
        }
    }

    match chosen {
        Some(endpoint) => Ok(endpoint),
        None if seen => Err(ConfigError::NoIpv4(interface.to_string())),
        None => Err(ConfigError::UnknownInterface(interface.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    fn v4(name: &str, ip: [u8; 4], mask: [u8; 4]) -> InterfaceAddress {
        InterfaceAddress {
            name: name.into(),
            ip: IpAddr::V4(Ipv4Addr::from(ip)),
            netmask: IpAddr::V4(Ipv4Addr::from(mask)),
        }
    }

    #[test]
    fn test_broadcast_address() {
        let b = broadcast_address(Ipv4Addr::new(192, 168, 1, 23), Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(b, Ipv4Addr::new(192, 168, 1, 255));

        let b = broadcast_address(Ipv4Addr::new(10, 1, 2, 3), Ipv4Addr::new(255, 0, 0, 0));
        assert_eq!(b, Ipv4Addr::new(10, 255, 255, 255));
    }

    #[test]
    fn test_select_ipv4_prefers_last_v4() {
        let addrs = vec![
            v4("eth0", [10, 0, 0, 5], [255, 0, 0, 0]),
            InterfaceAddress {
                name: "eth0".into(),
                ip: IpAddr::V6(Ipv6Addr::LOCALHOST),
                netmask: IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            },
            v4("eth0", [192, 168, 0, 7], [255, 255, 255, 0]),
            v4("lo", [127, 0, 0, 1], [255, 0, 0, 0]),
        ];
        let ep = select_ipv4(&addrs, "eth0").unwrap();
        assert_eq!(ep.ip, Ipv4Addr::new(192, 168, 0, 7));
        assert_eq!(ep.broadcast, Ipv4Addr::new(192, 168, 0, 255));
    }

    #[test]
    fn test_select_ipv4_errors() {
        let addrs = vec![InterfaceAddress {
            name: "utun0".into(),
            ip: IpAddr::V6(Ipv6Addr::LOCALHOST),
            netmask: IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        }];
        assert_eq!(
            select_ipv4(&addrs, "utun0"),
            Err(ConfigError::NoIpv4("utun0".into()))
        );
        assert_eq!(
            select_ipv4(&addrs, "eth9"),
            Err(ConfigError::UnknownInterface("eth9".into()))
        );
    }

    #[test]
    fn test_parse_endpoint() {
        let ep = HostEndpoint::parse("172.16.4.9/20", None).unwrap();
        assert_eq!(ep.netmask, Ipv4Addr::new(255, 255, 240, 0));
        assert_eq!(ep.broadcast, Ipv4Addr::new(172, 16, 15, 255));

        let ep = HostEndpoint::parse("192.168.2.2", Some("255.255.0.0")).unwrap();
        assert_eq!(ep.broadcast, Ipv4Addr::new(192, 168, 255, 255));

        assert!(HostEndpoint::parse("not-an-ip", None).is_err());
        assert!(HostEndpoint::parse("10.0.0.1/33", None).is_err());
    }
}
