pub mod device;
mod session;

pub use device::{LinkPhase, ScanRequest, ScanRunState, ScanSlot};
pub use session::{SessionState, SessionStatus};
