//! The device's network-interface seam.
//!
//! Credential handling, MAC randomization mechanics, and the actual
//! association dance belong to the platform; the scout only needs to
//! start a join, observe addressability, and read its own address and
//! netmask. The trait keeps the scheduler and intake testable with
//! scripted interfaces.

use std::net::Ipv4Addr;
use std::sync::Mutex;

use async_trait::async_trait;
use scout_core::ScoutError;
use tracing::info;

#[async_trait]
pub trait NetControl: Send + Sync {
    /// Start joining the named network. Completion is observed through
    /// [`NetControl::ip_info`] becoming `Some`.
    async fn begin_join(&self, ssid: &str, password: &str) -> Result<(), ScoutError>;

    /// The interface's current address and netmask, when joined.
    fn ip_info(&self) -> Option<(Ipv4Addr, Ipv4Addr)>;

    /// Request a randomized MAC before the next join.
    fn randomize_mac(&self) -> Result<(), ScoutError>;
}

/// `NetControl` backed by the host OS's interfaces via `if-addrs`.
///
/// Association itself is the platform's job; `begin_join` records the
/// request and the join loop then waits for a usable IPv4 interface to
/// appear.
pub struct OsNet {
    /// Restrict introspection to one interface name, when set.
    preferred: Option<String>,
    requested_ssid: Mutex<Option<String>>,
    randomize_pending: Mutex<bool>,
}

impl OsNet {
    pub fn new(preferred: Option<String>) -> Self {
        Self {
            preferred,
            requested_ssid: Mutex::new(None),
            randomize_pending: Mutex::new(false),
        }
    }
}

#[async_trait]
impl NetControl for OsNet {
    async fn begin_join(&self, ssid: &str, _password: &str) -> Result<(), ScoutError> {
        let randomized = {
            let mut pending = self.randomize_pending.lock().expect("netctl poisoned");
            std::mem::take(&mut *pending)
        };
        if randomized {
            info!(ssid, "joining with randomized MAC");
        } else {
            info!(ssid, "joining");
        }
        *self.requested_ssid.lock().expect("netctl poisoned") = Some(ssid.to_string());
        Ok(())
    }

    fn ip_info(&self) -> Option<(Ipv4Addr, Ipv4Addr)> {
        let ifaces = if_addrs::get_if_addrs().ok()?;
        ifaces.into_iter().find_map(|iface| {
            if let Some(name) = &self.preferred {
                if &iface.name != name {
                    return None;
                }
            }
            match iface.addr {
                if_addrs::IfAddr::V4(v4) if !v4.ip.is_loopback() => Some((v4.ip, v4.netmask)),
                _ => None,
            }
        })
    }

    fn randomize_mac(&self) -> Result<(), ScoutError> {
        *self.randomize_pending.lock().expect("netctl poisoned") = true;
        info!("MAC randomization requested for next join");
        Ok(())
    }
}
