//! Inbound command handling: one newline-terminated line at a time,
//! validated and translated into scan/join requests without ever
//! blocking on the scheduler.
//!
//! Malformed or out-of-place commands are rejected synchronously with a
//! diagnostic line and no protocol record; the request slot enforces
//! scan exclusivity.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use scout_core::{
    DeviceCommand, LinkFrame, LinkPhase, ScanReport, ScanRequest, ScanSlot, ScoutError, StatusCode,
};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};

/// Overall deadline for one network join attempt.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(15);

/// Poll interval while waiting for the join to complete.
pub const JOIN_POLL: Duration = Duration::from_millis(200);

use crate::netctl::NetControl;

/// What the session loop should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Unconditional restart: abandon all state, drop the session.
    Reboot,
}

pub struct Intake {
    slot: Arc<ScanSlot>,
    phase: Arc<Mutex<LinkPhase>>,
    net: Arc<dyn NetControl>,
    frames: mpsc::Sender<LinkFrame>,
    join_timeout: Duration,
    join_poll: Duration,
}

impl Intake {
    pub fn new(
        slot: Arc<ScanSlot>,
        phase: Arc<Mutex<LinkPhase>>,
        net: Arc<dyn NetControl>,
        frames: mpsc::Sender<LinkFrame>,
    ) -> Self {
        Self {
            slot,
            phase,
            net,
            frames,
            join_timeout: JOIN_TIMEOUT,
            join_poll: JOIN_POLL,
        }
    }

    /// Override the join deadline and poll interval. Tests shrink both.
    pub fn with_join_timing(mut self, timeout: Duration, poll: Duration) -> Self {
        self.join_timeout = timeout;
        self.join_poll = poll;
        self
    }

    /// Handle one inbound line.
    ///
    /// Errors only when the frame channel is gone; every command-level
    /// problem turns into a diagnostic instead.
    pub async fn handle_line(&self, line: &str) -> Result<Flow, ScoutError> {
        let command = match line.parse::<DeviceCommand>() {
            Ok(command) => command,
            Err(e) => {
                warn!(line, %e, "rejected command line");
                self.diag(&format!("rejected: {}", e)).await?;
                return Ok(Flow::Continue);
            }
        };

        match command {
            DeviceCommand::Join { ssid, password } => {
                self.handle_join(&ssid, &password).await?;
                Ok(Flow::Continue)
            }
            DeviceCommand::ScanAll => {
                self.queue_scan(ScanRequest::FullSubnet).await?;
                Ok(Flow::Continue)
            }
            DeviceCommand::ScanTarget(target) => {
                self.handle_scan_target(target).await?;
                Ok(Flow::Continue)
            }
            DeviceCommand::RandomizeMac => {
                match self.net.randomize_mac() {
                    Ok(()) => self.diag("MAC will be randomized on next join").await?,
                    Err(e) => self.diag(&format!("randomize_mac failed: {}", e)).await?,
                }
                Ok(Flow::Continue)
            }
            DeviceCommand::Reboot => {
                info!("reboot requested, abandoning all state");
                self.slot.reset();
                self.phase.lock().expect("phase poisoned").drop_link();
                self.diag("rebooting").await?;
                Ok(Flow::Reboot)
            }
        }
    }

    /// Attempt the network join within the bounded retry window and
    /// report the outcome on the link.
    async fn handle_join(&self, ssid: &str, password: &str) -> Result<(), ScoutError> {
        let begin = self.phase.lock().expect("phase poisoned").begin_join();
        if let Err(e) = begin {
            self.diag(&format!("join rejected: {}", e)).await?;
            return Ok(());
        }

        if let Err(e) = self.net.begin_join(ssid, password).await {
            self.phase.lock().expect("phase poisoned").drop_link();
            warn!(ssid, %e, "join could not be started");
            self.report(ScanReport::marker(StatusCode::WifiConnectFailure))
                .await?;
            return Ok(());
        }

        let deadline = Instant::now() + self.join_timeout;
        loop {
            if let Some((addr, _mask)) = self.net.ip_info() {
                let completed = self.phase.lock().expect("phase poisoned").complete_join();
                if let Err(e) = completed {
                    // The join state was torn down underneath us; do not
                    // claim success over a link we no longer hold.
                    warn!(ssid, %e, "join state lost before completion");
                    self.report(ScanReport::marker(StatusCode::WifiConnectFailure))
                        .await?;
                    return Ok(());
                }
                // A fresh join discards any request still queued from
                // the previous session; a running cycle finishes on its
                // own and keeps its exclusivity.
                self.slot.reset();
                info!(ssid, %addr, "joined");
                self.report(ScanReport::new(addr, StatusCode::WifiConnectSuccess))
                    .await?;
                return Ok(());
            }
            if Instant::now() >= deadline {
                self.phase.lock().expect("phase poisoned").drop_link();
                warn!(ssid, "join timed out");
                self.report(ScanReport::marker(StatusCode::WifiConnectFailure))
                    .await?;
                return Ok(());
            }
            tokio::time::sleep(self.join_poll).await;
        }
    }

    async fn handle_scan_target(&self, target: Ipv4Addr) -> Result<(), ScoutError> {
        if let Some((own, _mask)) = self.net.ip_info() {
            if target == own {
                let e = ScoutError::SelfTarget(target);
                warn!(%target, "rejected self-target scan");
                self.diag(&format!("rejected: {}", e)).await?;
                return Ok(());
            }
        }
        self.queue_scan(ScanRequest::SingleTarget(target)).await
    }

    /// Common precondition checks, then hand the request to the slot.
    async fn queue_scan(&self, request: ScanRequest) -> Result<(), ScoutError> {
        let connected = self.phase.lock().expect("phase poisoned").is_connected();
        if !connected {
            warn!(?request, "rejected scan while not joined");
            self.diag(&format!("rejected: {}", ScoutError::NotJoined))
                .await?;
            return Ok(());
        }

        match self.slot.offer(request) {
            Ok(()) => {
                info!(?request, "scan queued");
                self.diag("scan queued").await?;
            }
            Err(e) => {
                warn!(?request, "rejected scan while busy");
                self.diag(&format!("rejected: {}", e)).await?;
            }
        }
        Ok(())
    }

    async fn report(&self, report: ScanReport) -> Result<(), ScoutError> {
        self.frames.send(LinkFrame::Report(report)).await?;
        Ok(())
    }

    async fn diag(&self, text: &str) -> Result<(), ScoutError> {
        self.frames.send(LinkFrame::Diag(text.to_string())).await?;
        Ok(())
    }
}
