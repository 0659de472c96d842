// src/discovery/subnets.rs - local /24 enumeration
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs, UdpSocket};

/// Public address used only to learn which local interface routes outward. Nothing is sent.
const ROUTE_PROBE_ADDR: &str = "8.8.8.8:80";

/// A /24 network, identified by its first three octets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Subnet24 {
    prefix: [u8; 3],
}

impl Subnet24 {
    /// The /24 containing `addr`, unless it is loopback, link-local or unspecified.
    pub fn containing(addr: Ipv4Addr) -> Option<Self> {
        if addr.is_loopback() || addr.is_link_local() || addr.is_unspecified() {
            return None;
        }
        let [a, b, c, _] = addr.octets();
        Some(Self { prefix: [a, b, c] })
    }

    /// Usable host addresses `.1` through `.254`.
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        let [a, b, c] = self.prefix;
        (1u8..=254).map(move |host| Ipv4Addr::new(a, b, c, host))
    }
}

impl fmt::Display for Subnet24 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c] = self.prefix;
        write!(f, "{}.{}.{}.0/24", a, b, c)
    }
}

/// IPv4 addresses this host answers on: hostname resolution plus the outbound route address.
pub fn local_ipv4_addresses() -> Vec<Ipv4Addr> {
    let mut addresses = Vec::new();
    match hostname::get() {
        Ok(name) => {
            let name = name.to_string_lossy().into_owned();
            match (name.as_str(), 0).to_socket_addrs() {
                Ok(resolved) => addresses.extend(resolved.filter_map(|addr| match addr.ip() {
                    IpAddr::V4(ip) => Some(ip),
                    IpAddr::V6(_) => None,
                })),
                Err(e) => tracing::debug!("Could not resolve hostname {}: {}", name, e),
            }
        }
        Err(e) => tracing::debug!("Could not read hostname: {}", e),
    }
    if let Some(ip) = outbound_ipv4() {
        addresses.push(ip);
    }
    addresses
}

fn outbound_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect(ROUTE_PROBE_ADDR).ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) => Some(ip),
        IpAddr::V6(_) => None,
    }
}

/// Distinct /24 subnets of `addresses`, in first-seen order.
pub fn subnets_for(addresses: &[Ipv4Addr]) -> Vec<Subnet24> {
    let mut subnets: Vec<Subnet24> = Vec::new();
    for subnet in addresses.iter().copied().filter_map(Subnet24::containing) {
        if !subnets.contains(&subnet) {
            subnets.push(subnet);
        }
    }
    subnets
}

pub fn local_subnets() -> Vec<Subnet24> {
    subnets_for(&local_ipv4_addresses())
}
