//! IPv4 network interface enumeration for Art-Net binding.

use std::net::Ipv4Addr;

/// One usable (up, non-loopback) IPv4 interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetInterface {
    pub name: String,
    pub ip: Ipv4Addr,
    pub broadcast: Ipv4Addr,
    pub subnet: Ipv4Addr,
}

impl NetInterface {
    /// Label for selectors: "eth0 (192.168.1.10)".
    pub fn display_label(&self) -> String {
        format!("{} ({})", self.name, self.ip)
    }
}

/// Enumerate non-loopback IPv4 interfaces. A missing broadcast address is
/// derived from the netmask; enumeration failure yields an empty list (the
/// caller can still bind the wildcard address).
pub fn interfaces() -> Vec<NetInterface> {
    let addrs = match if_addrs::get_if_addrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            log::warn!("failed to enumerate network interfaces: {e}");
            return Vec::new();
        }
    };

    let mut out = Vec::new();
    for iface in addrs {
        if iface.is_loopback() {
            continue;
        }
        let if_addrs::IfAddr::V4(v4) = iface.addr else {
            continue;
        };
        let broadcast = v4
            .broadcast
            .unwrap_or_else(|| directed_broadcast(v4.ip, v4.netmask));
        out.push(NetInterface {
            name: iface.name,
            ip: v4.ip,
            broadcast,
            subnet: v4.netmask,
        });
    }
    out
}

fn directed_broadcast(ip: Ipv4Addr, netmask: Ipv4Addr) -> Ipv4Addr {
    let ip = u32::from(ip);
    let mask = u32::from(netmask);
    Ipv4Addr::from(ip | !mask)
}
