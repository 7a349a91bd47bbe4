//! The probe engine: one bounded connect-and-listen attempt against a
//! single target's service port.
//!
//! A probe is definitive for its scan cycle — no retries. The socket is
//! closed on every exit path.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use scout_core::StatusCode;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::Instant;

/// The fixed SMB service port.
pub const SERVICE_PORT: u16 = 445;

/// How long a target gets to accept the connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(1500);

/// How long an open port gets to answer the negotiation payload.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_millis(750);

/// Idle interval between read polls while waiting for a response.
pub const POLL_INTERVAL: Duration = Duration::from_millis(15);

/// SMB_COM_NEGOTIATE carrying the "NT LM 0.12" dialect, wrapped in a
/// NetBIOS session header. Any reply at all confirms responsiveness;
/// the reply bytes are drained, never parsed.
const NEGOTIATE_PAYLOAD: &[u8] = &[
    // NetBIOS session message, length 47
    0x00, 0x00, 0x00, 0x2f, //
    // SMB header: \xffSMB, command 0x72 (negotiate)
    0xff, 0x53, 0x4d, 0x42, 0x72, //
    0x00, 0x00, 0x00, 0x00, // status
    0x18, // flags
    0x53, 0xc8, // flags2
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // pid high + sig + rsvd
    0xff, 0xff, // tid
    0xff, 0xfe, // pid
    0x00, 0x00, // uid
    0x00, 0x00, // mid
    // negotiate body: word count 0, byte count 12
    0x00, 0x0c, 0x00, //
    // dialect: 0x02 "NT LM 0.12" 0x00
    0x02, 0x4e, 0x54, 0x20, 0x4c, 0x4d, 0x20, 0x30, 0x2e, 0x31, 0x32, 0x00,
];

/// What one probe established about a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// The service port accepted the connection.
    pub port_open: bool,
    /// The terminal classification; exactly one per target per cycle.
    pub terminal: StatusCode,
}

impl ProbeOutcome {
    fn unreachable() -> Self {
        Self {
            port_open: false,
            terminal: StatusCode::TargetUnreachable,
        }
    }
}

/// A single-host probe. The seam lets the scheduler be exercised with a
/// scripted prober in tests.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, target: Ipv4Addr) -> ProbeOutcome;
}

/// The real TCP probe against [`SERVICE_PORT`].
#[derive(Debug, Clone)]
pub struct TcpProber {
    port: u16,
}

impl TcpProber {
    pub fn new() -> Self {
        Self { port: SERVICE_PORT }
    }

    /// Probe an alternate port. Tests point this at ephemeral listeners.
    pub fn with_port(port: u16) -> Self {
        Self { port }
    }
}

impl Default for TcpProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn probe(&self, target: Ipv4Addr) -> ProbeOutcome {
        let addr = SocketAddr::from((target, self.port));

        let mut stream = match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await
        {
            Ok(Ok(stream)) => stream,
            // Refused, unreachable, or connect deadline elapsed.
            _ => return ProbeOutcome::unreachable(),
        };

        let terminal = negotiate(&mut stream).await;
        // Stream dropped here; the socket closes on every path.
        ProbeOutcome {
            port_open: true,
            terminal,
        }
    }
}

/// Write the negotiation payload and poll for any reply bytes.
async fn negotiate(stream: &mut TcpStream) -> StatusCode {
    if stream.write_all(NEGOTIATE_PAYLOAD).await.is_err() || stream.flush().await.is_err() {
        // Port opened but the peer dropped us before we could speak.
        return StatusCode::ServiceNoResponse;
    }

    let deadline = Instant::now() + RESPONSE_TIMEOUT;
    let mut buf = [0u8; 512];

    loop {
        match stream.try_read(&mut buf) {
            Ok(0) => return StatusCode::ServiceNoResponse,
            Ok(_) => {
                // Presence alone confirms responsiveness; drain whatever
                // else is buffered without parsing it.
                while let Ok(n) = stream.try_read(&mut buf) {
                    if n == 0 {
                        break;
                    }
                }
                return StatusCode::ServiceResponded;
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    return StatusCode::ServiceNoResponse;
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
            Err(_) => return StatusCode::ServiceNoResponse,
        }
    }
}
