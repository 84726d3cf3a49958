//! Navigation rules derived from the live scan request
use super::request::{Mode, Phase, ScanRequest};

/// An unresolved dialog holds the user in the scan flow. A scan without a
/// dialog never blocks, so other sections stay reachable mid-review.
pub fn is_blocking(state: &ScanRequest) -> bool {
    state.phase != Phase::Idle && state.active_dialog.is_some()
}

pub fn can_navigate_away(state: &ScanRequest) -> bool {
    !is_blocking(state)
}

pub fn can_start_new_capture(state: &ScanRequest) -> bool {
    state.phase == Phase::Idle
}

/// Answer to a capture request from anywhere in the app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureGate {
    /// No scan is live, a new one may start.
    Start,
    /// A scan is already live; route the user to it and show `notice`
    /// without blocking.
    Resume {
        mode: Mode,
        phase: Phase,
        notice: String,
    },
}

pub fn capture_gate(state: &ScanRequest) -> CaptureGate {
    if can_start_new_capture(state) {
        return CaptureGate::Start;
    }
    let what = match state.mode {
        Mode::Single => "receipt scan",
        Mode::Batch => "batch scan",
        Mode::Statement => "statement scan",
    };
    CaptureGate::Resume {
        mode: state.mode,
        phase: state.effective_phase(),
        notice: format!("You have a {what} in progress. Finish or cancel it first."),
    }
}
