//! Device-side binary: dials the host, then runs two concurrent
//! contexts over fresh per-session state — command intake and the scan
//! scheduler — joined by the single-slot request channel.

mod intake;
mod netctl;
mod probe;
mod scheduler;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use futures::{SinkExt, StreamExt};
use scout_core::{LinkCodec, LinkFrame, LinkPhase, ScanReport, ScanSlot, StatusCode};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use intake::{Flow, Intake};
use netctl::{NetControl, OsNet};
use probe::TcpProber;
use scheduler::Scheduler;

#[derive(Debug, Parser)]
#[command(name = "scout-device", about = "SMB subnet scout, device side")]
struct Args {
    /// Host session manager to attach to.
    #[arg(long, default_value = "127.0.0.1:7445")]
    host: String,

    /// Only introspect this network interface.
    #[arg(long)]
    iface: Option<String>,

    /// Seconds between attach attempts while the host is away.
    #[arg(long, default_value_t = 5)]
    retry_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args = Args::parse();
    let net: Arc<dyn NetControl> = Arc::new(OsNet::new(args.iface.clone()));

    loop {
        info!(host = %args.host, "attaching to host");
        match TcpStream::connect(&args.host).await {
            Ok(stream) => {
                if let Err(e) = run_session(stream, net.clone()).await {
                    warn!(%e, "session ended");
                }
                info!("link lost, will re-attach");
            }
            Err(e) => {
                error!(%e, "host unreachable");
            }
        }
        tokio::time::sleep(Duration::from_secs(args.retry_secs)).await;
    }
}

/// One attached session: fresh state, three tasks, ends on link loss or
/// reboot.
async fn run_session(stream: TcpStream, net: Arc<dyn NetControl>) -> Result<()> {
    let (read_half, write_half) = stream.into_split();
    let mut lines = FramedRead::new(read_half, LinesCodec::new());
    let mut sink = FramedWrite::new(write_half, LinkCodec);

    // Single-writer discipline: every frame funnels through one channel.
    let (frame_tx, mut frame_rx) = mpsc::channel::<LinkFrame>(100);
    let writer = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            if let Err(e) = sink.send(frame).await {
                warn!(%e, "link write failed");
                break;
            }
        }
    });

    // Per-session state: a reboot abandons everything.
    let slot = Arc::new(ScanSlot::new());
    let phase = Arc::new(Mutex::new(LinkPhase::default()));

    let scheduler = Scheduler::new(
        slot.clone(),
        phase.clone(),
        net.clone(),
        Arc::new(TcpProber::new()),
        frame_tx.clone(),
    );
    let scheduler_task = tokio::spawn(scheduler.run());

    let intake = Intake::new(slot, phase, net, frame_tx.clone());

    frame_tx
        .send(LinkFrame::Report(ScanReport::marker(
            StatusCode::DeviceReady,
        )))
        .await?;
    info!("attached, ready for commands");

    let outcome = async {
        while let Some(line) = lines.next().await {
            let line = line?;
            match intake.handle_line(&line).await? {
                Flow::Continue => {}
                Flow::Reboot => {
                    info!("rebooting on host command");
                    break;
                }
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    // Scans cannot outlive the session that requested them.
    scheduler_task.abort();
    let _ = scheduler_task.await;
    // Release every sender so the writer drains and exits.
    drop(intake);
    drop(frame_tx);
    let _ = writer.await;

    outcome
}
