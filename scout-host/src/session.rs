//! The host session manager: owns one attached device link, pumps the
//! decoder, serializes outbound commands, and dispatches events to
//! observers.
//!
//! Scan exclusivity is the device's job; the session only reflects the
//! device-reported state so the operator can be warned before sending a
//! redundant request.

use std::sync::{Arc, Mutex};

use futures::StreamExt;
use scout_core::{DeviceCommand, LinkCodec, LinkFrame, ScanReport, SessionState, SessionStatus};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tracing::{info, warn};

/// What a session observer gets to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A decoded binary record.
    Report(ScanReport),
    /// The link went away; `unfinished` means a scan cycle never closed.
    Detached { unfinished: bool },
}

pub type Observer = Box<dyn Fn(&SessionEvent) + Send + Sync>;

/// Synchronous audit hook; rotation and format live behind it.
pub type AuditHook = Arc<dyn Fn(&str) + Send + Sync>;

/// One attached device link.
///
/// Dropping the session tears down its reader and writer tasks; partial
/// decode bytes go with the reader's buffer.
pub struct Session {
    state: Arc<Mutex<SessionState>>,
    cmd_tx: mpsc::Sender<DeviceCommand>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Session {
    /// Attach to an accepted device stream.
    pub fn attach(
        stream: TcpStream,
        observers: Arc<Vec<Observer>>,
        audit: AuditHook,
    ) -> Self {
        let (read_half, mut write_half) = stream.into_split();

        let state = Arc::new(Mutex::new(SessionState::new()));
        state.lock().expect("session state poisoned").attach();

        // Single writer to the link: command lines never interleave.
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<DeviceCommand>(32);
        let writer = tokio::spawn(async move {
            while let Some(command) = cmd_rx.recv().await {
                let line = format!("{}\n", command);
                if let Err(e) = write_half.write_all(line.as_bytes()).await {
                    warn!(%e, "command write failed");
                    break;
                }
            }
        });

        let reader_state = state.clone();
        let reader_audit = audit.clone();
        let reader = tokio::spawn(async move {
            let mut frames = FramedRead::new(read_half, LinkCodec);
            loop {
                match frames.next().await {
                    Some(Ok(LinkFrame::Report(report))) => {
                        reader_state
                            .lock()
                            .expect("session state poisoned")
                            .observe(&report);
                        reader_audit(&format!("report {}", report));
                        let event = SessionEvent::Report(report);
                        for observer in observers.iter() {
                            observer(&event);
                        }
                    }
                    Some(Ok(LinkFrame::Diag(text))) => {
                        info!(target: "device", "{}", text);
                        reader_audit(&format!("diag {}", text));
                    }
                    Some(Err(e)) => {
                        warn!(%e, "decode error, detaching");
                        break;
                    }
                    None => break,
                }
            }

            // Buffered partial records die with the framed reader.
            let unfinished = reader_state
                .lock()
                .expect("session state poisoned")
                .detach();
            if unfinished {
                warn!("link lost mid-scan: cycle started but never completed");
            }
            reader_audit("detached");
            let event = SessionEvent::Detached { unfinished };
            for observer in observers.iter() {
                observer(&event);
            }
        });

        Self {
            state,
            cmd_tx,
            reader,
            writer,
        }
    }

    /// Forward a command to the device.
    ///
    /// Returns `true` when a scan cycle is known to be open — the caller
    /// may warn the operator, but the command is still forwarded; the
    /// device decides whether to reject it.
    pub async fn send_command(&self, command: DeviceCommand, audit: &AuditHook) -> anyhow::Result<bool> {
        let busy = self
            .state
            .lock()
            .expect("session state poisoned")
            .cycle_open();
        audit(&format!("command {}", command));
        self.cmd_tx.send(command).await?;
        Ok(busy)
    }

    pub fn status(&self) -> SessionStatus {
        self.state.lock().expect("session state poisoned").status()
    }

    pub fn is_attached(&self) -> bool {
        self.state
            .lock()
            .expect("session state poisoned")
            .is_attached()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::SinkExt;
    use scout_core::StatusCode;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_util::codec::{Framed, FramedRead as DeviceRead, LinesCodec};

    async fn linked_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (server, client)
    }

    fn no_audit() -> AuditHook {
        Arc::new(|_| {})
    }

    #[tokio::test]
    async fn reports_reach_observers_and_status() {
        let (host_side, device_side) = linked_pair().await;

        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let observers: Arc<Vec<Observer>> = Arc::new(vec![Box::new(move |event| {
            let _ = seen_tx.send(*event);
        })]);
        let session = Session::attach(host_side, observers, no_audit());

        let mut device = Framed::new(device_side, LinkCodec);
        device
            .send(LinkFrame::Report(ScanReport::marker(
                StatusCode::ScanCycleStart,
            )))
            .await
            .unwrap();
        device
            .send(LinkFrame::Report(ScanReport::new(
                Ipv4Addr::new(10, 0, 0, 8),
                StatusCode::ServiceResponded,
            )))
            .await
            .unwrap();

        let first = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            first,
            SessionEvent::Report(ScanReport::marker(StatusCode::ScanCycleStart))
        );
        let second = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(second, SessionEvent::Report(_)));

        let status = session.status();
        assert!(status.attached);
        assert!(status.cycle_open);
        assert_eq!(status.last_status, Some(StatusCode::ServiceResponded));
    }

    #[tokio::test]
    async fn commands_arrive_as_single_lines() {
        let (host_side, device_side) = linked_pair().await;
        let session = Session::attach(host_side, Arc::new(Vec::new()), no_audit());
        let audit = no_audit();

        session
            .send_command(DeviceCommand::ScanAll, &audit)
            .await
            .unwrap();
        session
            .send_command(
                DeviceCommand::ScanTarget(Ipv4Addr::new(192, 168, 7, 1)),
                &audit,
            )
            .await
            .unwrap();

        let mut lines = DeviceRead::new(device_side, LinesCodec::new());
        let first = tokio::time::timeout(Duration::from_secs(5), lines.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(first, "scan -all");
        let second = tokio::time::timeout(Duration::from_secs(5), lines.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(second, "scan -t 192.168.7.1");
    }

    #[tokio::test]
    async fn send_during_open_cycle_flags_busy() {
        let (host_side, device_side) = linked_pair().await;
        let session = Session::attach(host_side, Arc::new(Vec::new()), no_audit());
        let audit = no_audit();

        let mut device = Framed::new(device_side, LinkCodec);
        device
            .send(LinkFrame::Report(ScanReport::marker(
                StatusCode::ScanCycleStart,
            )))
            .await
            .unwrap();

        // Wait for the reader task to fold the report in.
        tokio::time::timeout(Duration::from_secs(5), async {
            while !session.status().cycle_open {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let busy = session
            .send_command(DeviceCommand::ScanAll, &audit)
            .await
            .unwrap();
        assert!(busy);
    }

    #[tokio::test]
    async fn detach_mid_cycle_is_surfaced() {
        let (host_side, device_side) = linked_pair().await;

        let unfinished_seen = Arc::new(AtomicBool::new(false));
        let flag = unfinished_seen.clone();
        let observers: Arc<Vec<Observer>> = Arc::new(vec![Box::new(move |event| {
            if let SessionEvent::Detached { unfinished: true } = event {
                flag.store(true, Ordering::SeqCst);
            }
        })]);
        let session = Session::attach(host_side, observers, no_audit());

        let mut device = Framed::new(device_side, LinkCodec);
        device
            .send(LinkFrame::Report(ScanReport::marker(
                StatusCode::ScanCycleStart,
            )))
            .await
            .unwrap();
        drop(device); // link lost mid-scan

        tokio::time::timeout(Duration::from_secs(5), async {
            while session.is_attached() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert!(unfinished_seen.load(Ordering::SeqCst));
        assert!(!session.status().attached);
    }

    #[tokio::test]
    async fn diag_text_does_not_disturb_records() {
        let (host_side, device_side) = linked_pair().await;

        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let observers: Arc<Vec<Observer>> = Arc::new(vec![Box::new(move |event| {
            let _ = seen_tx.send(*event);
        })]);
        let _session = Session::attach(host_side, observers, no_audit());

        let mut device = Framed::new(device_side, LinkCodec);
        device
            .send(LinkFrame::Diag("interleaved text".to_string()))
            .await
            .unwrap();
        device
            .send(LinkFrame::Report(ScanReport::new(
                Ipv4Addr::new(10, 0, 0, 3),
                StatusCode::PortOpen,
            )))
            .await
            .unwrap();

        // Only the record reaches observers; the text went to the logs.
        let event = tokio::time::timeout(Duration::from_secs(5), seen_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            SessionEvent::Report(ScanReport::new(
                Ipv4Addr::new(10, 0, 0, 3),
                StatusCode::PortOpen,
            ))
        );
    }
}
