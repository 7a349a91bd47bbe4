//! The scan scheduler: owns the request slot's consuming side and drives
//! the probe engine sequentially, one bracketed cycle per accepted
//! request.
//!
//! Runs as its own task so command intake stays responsive while a
//! full-subnet cycle (minutes, worst case) is in flight. All blocking
//! network waits happen here, inside the probe engine's bounded
//! timeouts.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use scout_core::{
    LinkFrame, LinkPhase, ScanReport, ScanRequest, ScanSlot, ScoutError, StatusCode, host_range,
};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::netctl::NetControl;
use crate::probe::Prober;

/// Idle delay between probes so a full cycle never saturates the link.
pub const PROBE_GAP: Duration = Duration::from_millis(50);

pub struct Scheduler {
    slot: Arc<ScanSlot>,
    phase: Arc<Mutex<LinkPhase>>,
    net: Arc<dyn NetControl>,
    prober: Arc<dyn Prober>,
    frames: mpsc::Sender<LinkFrame>,
    probe_gap: Duration,
}

impl Scheduler {
    pub fn new(
        slot: Arc<ScanSlot>,
        phase: Arc<Mutex<LinkPhase>>,
        net: Arc<dyn NetControl>,
        prober: Arc<dyn Prober>,
        frames: mpsc::Sender<LinkFrame>,
    ) -> Self {
        Self {
            slot,
            phase,
            net,
            prober,
            frames,
            probe_gap: PROBE_GAP,
        }
    }

    /// Override the inter-probe delay. Tests run with `Duration::ZERO`.
    pub fn with_probe_gap(mut self, gap: Duration) -> Self {
        self.probe_gap = gap;
        self
    }

    /// Loop forever: wait for a request, run its cycle, release the slot.
    ///
    /// Returns when the frame channel closes (link gone).
    pub async fn run(self) {
        loop {
            let request = self.slot.recv().await;
            let result = self.run_cycle(request).await;
            self.slot.finish();
            if result.is_err() {
                // Writer side is gone; nothing further can be reported.
                return;
            }
        }
    }

    /// Execute one accepted request as a single bracketed cycle.
    async fn run_cycle(&self, request: ScanRequest) -> Result<(), ScoutError> {
        let Some((own, mask)) = self.net.ip_info() else {
            // The join was lost between offer and take.
            self.diag("scan aborted: interface lost its address").await?;
            return Ok(());
        };

        match request {
            ScanRequest::FullSubnet => self.full_subnet_cycle(own, mask).await,
            ScanRequest::SingleTarget(target) => self.single_target_cycle(target).await,
        }
    }

    async fn full_subnet_cycle(&self, own: Ipv4Addr, mask: Ipv4Addr) -> Result<(), ScoutError> {
        let hosts = host_range(own, mask);
        if hosts.is_degenerate() {
            warn!(%own, %mask, "subnet has no scannable hosts");
            self.diag("scan aborted: subnet has no usable host addresses")
                .await?;
            return Ok(());
        }
        if hosts.truncated() {
            warn!(cap = hosts.len(), "subnet exceeds cap, truncating");
            self.diag("subnet larger than host cap; scanning the first 4094 addresses")
                .await?;
        }

        info!(%own, %mask, hosts = hosts.len(), "full subnet cycle starting");
        self.report(ScanReport::marker(StatusCode::ScanCycleStart))
            .await?;

        for target in hosts.iter() {
            if target == own {
                continue;
            }
            self.probe_one(target).await?;
        }

        self.report(ScanReport::marker(StatusCode::ScanCycleEnd))
            .await?;

        // Full scans are one-shot per join: force an explicit rejoin
        // before the next one. A rejoin already in flight is not ours
        // to tear down.
        {
            let mut phase = self.phase.lock().expect("phase poisoned");
            if phase.is_connected() {
                phase.drop_link();
            }
        }
        self.diag("full scan complete; network link dropped, rejoin to scan again")
            .await?;
        info!("full subnet cycle complete, link dropped");
        Ok(())
    }

    async fn single_target_cycle(&self, target: Ipv4Addr) -> Result<(), ScoutError> {
        info!(%target, "single target cycle starting");
        self.report(ScanReport::marker(StatusCode::ScanCycleStart))
            .await?;
        self.probe_one(target).await?;
        self.report(ScanReport::marker(StatusCode::ScanCycleEnd))
            .await?;
        Ok(())
    }

    /// One probe: announce the target, run the engine, report what it
    /// found, then idle briefly.
    async fn probe_one(&self, target: Ipv4Addr) -> Result<(), ScoutError> {
        self.report(ScanReport::new(target, StatusCode::ScanningTarget))
            .await?;

        let outcome = self.prober.probe(target).await;
        if outcome.port_open {
            self.report(ScanReport::new(target, StatusCode::PortOpen))
                .await?;
        }
        self.report(ScanReport::new(target, outcome.terminal))
            .await?;

        if !self.probe_gap.is_zero() {
            tokio::time::sleep(self.probe_gap).await;
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
