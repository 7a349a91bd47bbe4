//! # scout-core
//!
//! Core protocol library for the SMB subnet scout.
//!
//! This crate contains:
//! - **Wire types**: `ScanReport`, `StatusCode`, the `0xAB` magic byte
//! - **Codec**: `LinkCodec` for the mixed binary/text device link via `tokio_util`
//! - **Commands**: `DeviceCommand` — the newline-terminated host → device grammar
//! - **Subnet**: usable-host enumeration from an address and netmask
//! - **State**: link/scan state machines for the device, session bookkeeping for the host
//! - **Error**: `ScoutError` — typed, `thiserror`-based error hierarchy

pub mod codec;
pub mod command;
pub mod error;
pub mod report;
pub mod state;
pub mod subnet;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{LinkCodec, LinkFrame};
pub use command::DeviceCommand;
pub use error::ScoutError;
pub use report::{MAGIC_BYTE, REPORT_LEN, ScanReport, StatusCode};
pub use state::{LinkPhase, ScanRequest, ScanRunState, ScanSlot, SessionState, SessionStatus};
pub use subnet::{HOST_CAP, SubnetHosts, host_range};
