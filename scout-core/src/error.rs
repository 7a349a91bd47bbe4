//! Domain-specific error types for the scout protocol.
//!
//! All fallible operations return `Result<T, ScoutError>`.
//! No panics on invalid input — every error is typed and recoverable.

use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the scout protocol.
#[derive(Debug, Error)]
pub enum ScoutError {
    // ── Protocol Errors ──────────────────────────────────────────
    /// A numeric value did not map to any known enum variant.
    #[error("unknown {type_name} discriminant: {value:#x}")]
    UnknownVariant { type_name: &'static str, value: u8 },

    /// A wire record was shorter or longer than the fixed layout.
    #[error("invalid report length: expected {expected}, got {actual}")]
    InvalidReportLength { expected: usize, actual: usize },

    // ── Request Errors ───────────────────────────────────────────
    /// A command line could not be parsed.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// A scan request arrived while another was pending or running.
    #[error("scan already pending or running")]
    ScanBusy,

    /// A scan was requested before the device joined a network.
    #[error("not joined to a network")]
    NotJoined,

    /// A single-target request named the device's own address.
    #[error("refusing to probe own address {0}")]
    SelfTarget(Ipv4Addr),

    /// The computed subnet host range contains no scannable addresses.
    #[error("subnet has no usable host addresses")]
    EmptyRange,

    /// An invalid state transition was attempted.
    #[error("state violation: {0}")]
    StateViolation(&'static str),

    // ── Link Errors ──────────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("link error: {0}")]
    Link(#[from] std::io::Error),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// The network join did not complete within its retry window.
    #[error("network join failed: {0}")]
    JoinFailed(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for ScoutError {
    fn from(s: String) -> Self {
        ScoutError::Other(s)
    }
}

impl From<&str> for ScoutError {
    fn from(s: &str) -> Self {
        ScoutError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for ScoutError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        ScoutError::ChannelClosed
    }
}
