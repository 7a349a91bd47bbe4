//! Usable-host enumeration from an interface address and netmask.
//!
//! Pure u32 math: network = addr AND mask, broadcast = network OR NOT mask,
//! and every address strictly between the two is scannable. The range is
//! capped so a misread mask can never trigger a runaway scan.

use std::net::Ipv4Addr;

/// Upper bound on enumerated hosts per scan (a /20, class-B-plus guard).
pub const HOST_CAP: usize = 4094;

/// The scannable host addresses of one subnet.
#[derive(Debug, Clone)]
pub struct SubnetHosts {
    network: Ipv4Addr,
    broadcast: Ipv4Addr,
    truncated: bool,
    len: usize,
}

impl SubnetHosts {
    /// Network address (excluded from the range).
    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// Broadcast address (excluded from the range).
    pub fn broadcast(&self) -> Ipv4Addr {
        self.broadcast
    }

    /// `true` when the subnet exceeded [`HOST_CAP`] and was cut short.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Number of addresses the iterator will yield.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Point-to-point masks (/30 and narrower) leave at most the device
    /// itself and one peer in range; a full scan over them is treated as
    /// having no scannable hosts.
    pub fn is_degenerate(&self) -> bool {
        self.len <= 2
    }

    /// Iterate the usable hosts in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = Ipv4Addr> + use<> {
        let start = u32::from(self.network) + 1;
        (start..start + self.len as u32).map(Ipv4Addr::from)
    }
}

/// Compute the scannable host range for `addr` under `mask`.
///
/// Degenerate masks (/31, /32) yield an empty range; the caller decides
/// whether that aborts the operation.
pub fn host_range(addr: Ipv4Addr, mask: Ipv4Addr) -> SubnetHosts {
    let addr = u32::from(addr);
    let mask = u32::from(mask);
    let network = addr & mask;
    let broadcast = network | !mask;

    let usable = if broadcast <= network.saturating_add(1) {
        0
    } else {
        (broadcast - network - 1) as usize
    };
    let truncated = usable > HOST_CAP;

    SubnetHosts {
        network: Ipv4Addr::from(network),
        broadcast: Ipv4Addr::from(broadcast),
        truncated,
        len: usable.min(HOST_CAP),
    }
}
