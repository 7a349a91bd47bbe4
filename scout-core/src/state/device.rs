//! Device-side state: the network-join lifecycle and the single-slot
//! scan request channel shared between the command-intake and scheduler
//! contexts.

use std::net::Ipv4Addr;
use std::sync::Mutex;

use tokio::sync::Notify;

use crate::error::ScoutError;

// ── LinkPhase ────────────────────────────────────────────────────

/// The device's network-join lifecycle.
///
/// ```text
///  Disconnected ──► Connecting ──► Connected
///       ▲               │              │
///       └───────────────┴──────────────┘
/// ```
///
/// The transition back to `Disconnected` after a completed full-subnet
/// scan is scheduler policy: full scans are one-shot per join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkPhase {
    /// Not joined to any network. Initial / terminal state.
    #[default]
    Disconnected,

    /// Join attempt in progress.
    Connecting,

    /// Joined; scans may be requested.
    Connected,
}

impl std::fmt::Display for LinkPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

impl LinkPhase {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// Transition to `Connecting`.
    ///
    /// Valid from: `Disconnected`, `Connected` (re-join).
    pub fn begin_join(&mut self) -> Result<(), ScoutError> {
        match self {
            Self::Disconnected | Self::Connected => {
                *self = Self::Connecting;
                Ok(())
            }
            _ => Err(ScoutError::StateViolation(
                "cannot join: a join is already in progress",
            )),
        }
    }

    /// Transition to `Connected`.
    ///
    /// Valid from: `Connecting`.
    pub fn complete_join(&mut self) -> Result<(), ScoutError> {
        match self {
            Self::Connecting => {
                *self = Self::Connected;
                Ok(())
            }
            _ => Err(ScoutError::StateViolation(
                "cannot complete join: not in Connecting state",
            )),
        }
    }

    /// Force-reset to `Disconnected` regardless of current state.
    ///
    /// Used on join failure, after a completed full-subnet scan, and on
    /// reboot.
    pub fn drop_link(&mut self) {
        *self = Self::Disconnected;
    }
}

// ── ScanRequest / ScanRunState ───────────────────────────────────

/// What the scheduler has been asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanRequest {
    /// Enumerate and probe the whole current subnet.
    FullSubnet,
    /// Probe exactly one host.
    SingleTarget(Ipv4Addr),
}

/// The scheduler's run state. `Queued` and `Running` are mutually
/// exclusive with accepting a new request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanRunState {
    #[default]
    Idle,
    Queued(ScanRequest),
    Running,
}

// ── ScanSlot ─────────────────────────────────────────────────────

/// Single-slot request channel between command intake and the scheduler.
///
/// `offer` and `take` are atomic with respect to each other: a request is
/// rejected — never queued behind another — while one is pending or
/// running. This replaces cross-context boolean flags with one guarded
/// state word.
#[derive(Debug, Default)]
pub struct ScanSlot {
    state: Mutex<ScanRunState>,
    wakeup: Notify,
}

impl ScanSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a request, or reject it when one is already pending or
    /// running.
    pub fn offer(&self, request: ScanRequest) -> Result<(), ScoutError> {
        let mut state = self.state.lock().expect("scan slot poisoned");
        match *state {
            ScanRunState::Idle => {
                *state = ScanRunState::Queued(request);
                drop(state);
                self.wakeup.notify_one();
                Ok(())
            }
            _ => Err(ScoutError::ScanBusy),
        }
    }

    /// Take the queued request, marking the slot `Running`.
    ///
    /// Returns `None` when nothing is queued.
    pub fn take(&self) -> Option<ScanRequest> {
        let mut state = self.state.lock().expect("scan slot poisoned");
        match *state {
            ScanRunState::Queued(request) => {
                *state = ScanRunState::Running;
                Some(request)
            }
            _ => None,
        }
    }

    /// Await until a request is queued, then take it.
    pub async fn recv(&self) -> ScanRequest {
        loop {
            if let Some(request) = self.take() {
                return request;
            }
            self.wakeup.notified().await;
        }
    }

    /// Mark the running request complete, returning the slot to `Idle`.
    ///
    /// Only a `Running` slot is released; a request queued in the
    /// meantime stays queued for the next `take`.
    pub fn finish(&self) {
        let mut state = self.state.lock().expect("scan slot poisoned");
        if matches!(*state, ScanRunState::Running) {
            *state = ScanRunState::Idle;
        }
    }

    /// Discard a stale queued request (join success, reboot).
    ///
    /// A running cycle is left alone: the scheduler still holds it, and
    /// forcing the slot to `Idle` underneath would let a second request
    /// in while the first is mid-cycle.
    pub fn reset(&self) {
        let mut state = self.state.lock().expect("scan slot poisoned");
        if matches!(*state, ScanRunState::Queued(_)) {
            *state = ScanRunState::Idle;
        }
    }

    /// Snapshot of the current run state.
    pub fn run_state(&self) -> ScanRunState {
        *self.state.lock().expect("scan slot poisoned")
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.run_state(), ScanRunState::Idle)
    }
}

// ── Tests ────────────────────────────────────────────────────────
