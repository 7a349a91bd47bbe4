//! The host → device command grammar.
//!
//! Commands travel as newline-terminated ASCII lines. Parsing validates
//! argument shape before anything reaches the scheduler; an unrecognized
//! verb or malformed argument produces `ScoutError::InvalidCommand` and
//! must cause no state change on the device.

use crate::error::ScoutError;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// All commands a device understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Join a Wi-Fi network: `join <ssid> <password>`.
    Join { ssid: String, password: String },
    /// Scan the whole current subnet: `scan -all`.
    ScanAll,
    /// Probe one host: `scan -t <dotted-address>`.
    ScanTarget(Ipv4Addr),
    /// Randomize the MAC before the next join: `randomize_mac`.
    RandomizeMac,
    /// Unconditional restart, abandoning all state: `reboot`.
    Reboot,
}

impl FromStr for DeviceCommand {
    type Err = ScoutError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut tokens = line.split_whitespace();
        let verb = tokens
            .next()
            .ok_or_else(|| ScoutError::InvalidCommand("empty line".to_string()))?;

        match verb {
            "join" => {
                let ssid = tokens.next();
                let password = tokens.next();
                match (ssid, password, tokens.next()) {
                    (Some(ssid), Some(password), None) => Ok(DeviceCommand::Join {
                        ssid: ssid.to_string(),
                        password: password.to_string(),
                    }),
                    _ => Err(ScoutError::InvalidCommand(
                        "usage: join <ssid> <password>".to_string(),
                    )),
                }
            }
            "scan" => match (tokens.next(), tokens.next(), tokens.next()) {
                (Some("-all"), None, _) => Ok(DeviceCommand::ScanAll),
                (Some("-t"), Some(addr), None) => {
                    let target = Ipv4Addr::from_str(addr).map_err(|_| {
                        ScoutError::InvalidCommand(format!("malformed address '{}'", addr))
                    })?;
                    Ok(DeviceCommand::ScanTarget(target))
                }
                _ => Err(ScoutError::InvalidCommand(
                    "usage: scan -all | scan -t <ipv4>".to_string(),
                )),
            },
            "randomize_mac" => Ok(DeviceCommand::RandomizeMac),
            "reboot" => Ok(DeviceCommand::Reboot),
            other => Err(ScoutError::InvalidCommand(format!(
                "unknown verb '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for DeviceCommand {
    /// Renders the exact wire line (without the trailing newline).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceCommand::Join { ssid, password } => write!(f, "join {} {}", ssid, password),
            DeviceCommand::ScanAll => write!(f, "scan -all"),
            DeviceCommand::ScanTarget(addr) => write!(f, "scan -t {}", addr),
            DeviceCommand::RandomizeMac => write!(f, "randomize_mac"),
            DeviceCommand::Reboot => write!(f, "reboot"),
        }
    }
}
