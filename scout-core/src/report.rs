//! Wire record types for device → host reporting.
//!
//! Every report travels as one magic byte followed by a fixed five-byte
//! record: four address octets, then one status byte. There is no length
//! prefix and no checksum; the magic byte exists solely so a decoder can
//! locate record starts inside a stream that also carries free-form
//! diagnostic text.

use crate::error::ScoutError;
use std::fmt;
use std::net::Ipv4Addr;

/// Sentinel marking the start of a binary record on the link.
pub const MAGIC_BYTE: u8 = 0xAB;

/// Size of a serialized [`ScanReport`], excluding the magic byte.
pub const REPORT_LEN: usize = 5;

// ── StatusCode ───────────────────────────────────────────────────

/// All status codes a device may report.
///
/// Discriminants are wire values and must not change.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// The target did not accept a connection within the probe window.
    TargetUnreachable = 1,
    /// The service port accepted the connection.
    PortOpen = 2,
    /// The port was open but nothing came back within the response window.
    ServiceNoResponse = 3,
    /// The service answered the negotiation payload with at least one byte.
    ServiceResponded = 4,
    /// A scan cycle is starting (address field is 0.0.0.0).
    ScanCycleStart = 5,
    /// A scan cycle finished (address field is 0.0.0.0).
    ScanCycleEnd = 6,
    /// The device joined a network; address field carries its new address.
    WifiConnectSuccess = 10,
    /// The network join failed; address field is 0.0.0.0.
    WifiConnectFailure = 11,
    /// The device is about to probe the reported address.
    ScanningTarget = 15,
    /// The device booted and is accepting commands.
    DeviceReady = 16,
}

impl StatusCode {
    /// Returns `true` for the final classification of a single probe.
    ///
    /// Exactly one terminal status is reported per target per cycle.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StatusCode::TargetUnreachable
                | StatusCode::ServiceNoResponse
                | StatusCode::ServiceResponded
        )
    }
}

impl TryFrom<u8> for StatusCode {
    type Error = ScoutError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(StatusCode::TargetUnreachable),
            2 => Ok(StatusCode::PortOpen),
            3 => Ok(StatusCode::ServiceNoResponse),
            4 => Ok(StatusCode::ServiceResponded),
            5 => Ok(StatusCode::ScanCycleStart),
            6 => Ok(StatusCode::ScanCycleEnd),
            10 => Ok(StatusCode::WifiConnectSuccess),
            11 => Ok(StatusCode::WifiConnectFailure),
            15 => Ok(StatusCode::ScanningTarget),
            16 => Ok(StatusCode::DeviceReady),
            _ => Err(ScoutError::UnknownVariant {
                type_name: "StatusCode",
                value,
            }),
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ── ScanReport ───────────────────────────────────────────────────

/// One device event: a target address and a status code.
///
/// Constructed once, serialized, discarded — never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    /// The address the status refers to; 0.0.0.0 for cycle markers.
    pub target: Ipv4Addr,
    /// What happened.
    pub status: StatusCode,
}

impl ScanReport {
    pub fn new(target: Ipv4Addr, status: StatusCode) -> Self {
        Self { target, status }
    }

    /// A report whose address field carries no meaning (cycle markers,
    /// readiness, join failure).
    pub fn marker(status: StatusCode) -> Self {
        Self {
            target: Ipv4Addr::UNSPECIFIED,
            status,
        }
    }

    /// Serialize to the fixed wire layout: four address octets in order,
    /// then the status byte.
    pub fn to_bytes(&self) -> [u8; REPORT_LEN] {
        let o = self.target.octets();
        [o[0], o[1], o[2], o[3], self.status as u8]
    }

    /// Deserialize from the fixed wire layout.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ScoutError> {
        if bytes.len() != REPORT_LEN {
            return Err(ScoutError::InvalidReportLength {
                expected: REPORT_LEN,
                actual: bytes.len(),
            });
        }
        let target = Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]);
        let status = StatusCode::try_from(bytes[4])?;
        Ok(Self { target, status })
    }
}

impl fmt::Display for ScanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.target, self.status)
    }
}
