//! Integration tests — link framing over a real TCP connection on
//! localhost, plus slot/session interplay that spans modules.

use std::net::Ipv4Addr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use scout_core::{
    DeviceCommand, LinkCodec, LinkFrame, ScanReport, ScanRequest, ScanSlot, SessionState,
    StatusCode,
};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, FramedRead, LinesCodec};

// ── Helpers ──────────────────────────────────────────────────────

/// Spin up a listener on an OS-assigned port and return its address.
async fn ephemeral_listener() -> (TcpListener, std::net::SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

async fn next_frame(framed: &mut Framed<TcpStream, LinkCodec>) -> LinkFrame {
    tokio::time::timeout(Duration::from_secs(5), framed.next())
        .await
        .expect("timeout")
        .expect("stream ended")
        .expect("decode error")
}

// ── Link framing over TCP ────────────────────────────────────────

#[tokio::test]
async fn reports_and_diags_cross_the_link() {
    let (listener, addr) = ephemeral_listener().await;

    let device = tokio::spawn(async move {
        let stream = TcpStream::connect(addr).await.unwrap();
        let mut framed = Framed::new(stream, LinkCodec);
        framed
            .send(LinkFrame::Diag("device booted".to_string()))
            .await
            .unwrap();
        framed
            .send(LinkFrame::Report(ScanReport::marker(
                StatusCode::DeviceReady,
            )))
            .await
            .unwrap();
        framed
            .send(LinkFrame::Report(ScanReport::new(
                Ipv4Addr::new(192, 168, 0, 44),
                StatusCode::ServiceResponded,
            )))
            .await
            .unwrap();
    });

    let (stream, _) = listener.accept().await.unwrap();
    let mut host = Framed::new(stream, LinkCodec);

    assert_eq!(
        next_frame(&mut host).await,
        LinkFrame::Diag("device booted".to_string())
    );
    assert_eq!(
        next_frame(&mut host).await,
        LinkFrame::Report(ScanReport::marker(StatusCode::DeviceReady))
    );
    assert_eq!(
        next_frame(&mut host).await,
        LinkFrame::Report(ScanReport::new(
            Ipv4Addr::new(192, 168, 0, 44),
            StatusCode::ServiceResponded,
        ))
    );

    device.await.unwrap();
}

#[tokio::test]
async fn record_split_across_writes_still_decodes() {
    let (listener, addr) = ephemeral_listener().await;

    let device = tokio::spawn(async move {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let report = ScanReport::new(Ipv4Addr::new(10, 1, 2, 3), StatusCode::PortOpen);
        let bytes = report.to_bytes();

        // Magic byte alone, then the record body in two writes.
        stream.write_all(&[scout_core::MAGIC_BYTE]).await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        stream.write_all(&bytes[..2]).await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        stream.write_all(&bytes[2..]).await.unwrap();
        stream.flush().await.unwrap();
    });

    let (stream, _) = listener.accept().await.unwrap();
    let mut host = Framed::new(stream, LinkCodec);

    assert_eq!(
        next_frame(&mut host).await,
        LinkFrame::Report(ScanReport::new(
            Ipv4Addr::new(10, 1, 2, 3),
            StatusCode::PortOpen,
        ))
    );

    device.await.unwrap();
}

#[tokio::test]
async fn command_lines_reach_the_device() {
    let (listener, addr) = ephemeral_listener().await;

    let host = tokio::spawn(async move {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        for cmd in [
            DeviceCommand::ScanAll,
            DeviceCommand::ScanTarget(Ipv4Addr::new(10, 0, 0, 12)),
            DeviceCommand::Reboot,
        ] {
            stream
                .write_all(format!("{}\n", cmd).as_bytes())
                .await
                .unwrap();
        }
    });

    let (stream, _) = listener.accept().await.unwrap();
    let mut lines = FramedRead::new(stream, LinesCodec::new());

    let mut parsed = Vec::new();
    for _ in 0..3 {
        let line = tokio::time::timeout(Duration::from_secs(5), lines.next())
            .await
            .expect("timeout")
            .expect("stream ended")
            .expect("line error");
        parsed.push(line.parse::<DeviceCommand>().unwrap());
    }

    assert_eq!(
        parsed,
        vec![
            DeviceCommand::ScanAll,
            DeviceCommand::ScanTarget(Ipv4Addr::new(10, 0, 0, 12)),
            DeviceCommand::Reboot,
        ]
    );

    host.await.unwrap();
}

// ── Slot / session interplay ─────────────────────────────────────

#[tokio::test]
async fn slot_rejects_while_scheduler_holds_request() {
    use std::sync::Arc;

    let slot = Arc::new(ScanSlot::new());
    slot.offer(ScanRequest::FullSubnet).unwrap();

    let scheduler = {
        let slot = slot.clone();
        tokio::spawn(async move {
            let request = slot.recv().await;
            assert_eq!(request, ScanRequest::FullSubnet);
            // Simulate a running scan; offers during this window fail.
            tokio::time::sleep(Duration::from_millis(50)).await;
            slot.finish();
        })
    };

    // Wait until the scheduler picks the request up.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(slot.offer(ScanRequest::FullSubnet).is_err());

    scheduler.await.unwrap();
    assert!(slot.offer(ScanRequest::FullSubnet).is_ok());
}

#[test]
fn session_surfaces_unfinished_cycle_on_detach() {
    let mut session = SessionState::new();
    session.attach();
    session.observe(&ScanReport::marker(StatusCode::ScanCycleStart));
    session.observe(&ScanReport::new(
        Ipv4Addr::new(10, 0, 0, 3),
        StatusCode::ScanningTarget,
    ));

    // Link drops mid-scan: the caller must learn the cycle never closed.
    assert!(session.detach());
}
