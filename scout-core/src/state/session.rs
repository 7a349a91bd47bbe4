//! Host-side session bookkeeping.
//!
//! Tracks whether a link is attached, whether a scan cycle is known to be
//! open (a `ScanCycleStart` observed without its matching `ScanCycleEnd`),
//! and the last status the device reported. The host never enforces scan
//! exclusivity — the device does — it only reflects observed state so the
//! operator can be warned proactively.

use crate::report::{ScanReport, StatusCode};

/// Snapshot returned by [`SessionState::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub attached: bool,
    /// A cycle bracket is open on the device.
    pub cycle_open: bool,
    /// Last status code decoded from the link, if any.
    pub last_status: Option<StatusCode>,
}

/// Mutable session bookkeeping owned by the host's session manager.
#[derive(Debug, Default)]
pub struct SessionState {
    attached: bool,
    cycle_open: bool,
    last_status: Option<StatusCode>,
    reports_seen: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the link attached; bookkeeping from a prior session is
    /// discarded.
    pub fn attach(&mut self) {
        *self = Self {
            attached: true,
            ..Self::default()
        };
    }

    /// Mark the link detached.
    ///
    /// Returns `true` when a scan cycle was left unfinished — the caller
    /// must surface that explicitly rather than silently resetting.
    pub fn detach(&mut self) -> bool {
        let unfinished = self.cycle_open;
        self.attached = false;
        self.cycle_open = false;
        unfinished
    }

    /// Fold one decoded report into the bookkeeping.
    pub fn observe(&mut self, report: &ScanReport) {
        self.reports_seen += 1;
        self.last_status = Some(report.status);
        match report.status {
            StatusCode::ScanCycleStart => self.cycle_open = true,
            StatusCode::ScanCycleEnd => self.cycle_open = false,
            _ => {}
        }
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            attached: self.attached,
            cycle_open: self.cycle_open,
            last_status: self.last_status,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// A cycle bracket is currently open.
    pub fn cycle_open(&self) -> bool {
        self.cycle_open
    }

    /// Total reports decoded this session.
    pub fn reports_seen(&self) -> u64 {
        self.reports_seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn new_session_is_detached() {
        let state = SessionState::new();
        let status = state.status();
        assert!(!status.attached);
        assert!(!status.cycle_open);
        assert!(status.last_status.is_none());
    }

    #[test]
    fn cycle_bracket_tracking() {
        let mut state = SessionState::new();
        state.attach();

        state.observe(&ScanReport::marker(StatusCode::ScanCycleStart));
        assert!(state.cycle_open());

        state.observe(&ScanReport::new(
            Ipv4Addr::new(10, 0, 0, 2),
            StatusCode::ScanningTarget,
        ));
        assert!(state.cycle_open());

        state.observe(&ScanReport::marker(StatusCode::ScanCycleEnd));
        assert!(!state.cycle_open());
        assert_eq!(state.reports_seen(), 3);
    }

    #[test]
    fn detach_mid_cycle_reports_unfinished() {
        let mut state = SessionState::new();
        state.attach();
        state.observe(&ScanReport::marker(StatusCode::ScanCycleStart));

        assert!(state.detach());
        assert!(!state.is_attached());
        assert!(!state.cycle_open());
    }

    #[test]
    fn detach_after_complete_cycle_is_clean() {
        let mut state = SessionState::new();
        state.attach();
        state.observe(&ScanReport::marker(StatusCode::ScanCycleStart));
        state.observe(&ScanReport::marker(StatusCode::ScanCycleEnd));
        assert!(!state.detach());
    }

    #[test]
    fn reattach_discards_stale_bookkeeping() {
        let mut state = SessionState::new();
        state.attach();
        state.observe(&ScanReport::marker(StatusCode::ScanCycleStart));
        state.detach();

        state.attach();
        let status = state.status();
        assert!(status.attached);
        assert!(!status.cycle_open);
        assert!(status.last_status.is_none());
        assert_eq!(state.reports_seen(), 0);
    }

    #[test]
    fn last_status_follows_reports() {
        let mut state = SessionState::new();
        state.attach();
        state.observe(&ScanReport::marker(StatusCode::DeviceReady));
        assert_eq!(state.status().last_status, Some(StatusCode::DeviceReady));
    }
}
