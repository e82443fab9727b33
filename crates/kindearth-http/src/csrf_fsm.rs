//! CSRF bootstrap status machine using rust-fsm.
//!
//! ```text
//!   Idle ──Start──► Fetching ──FetchSucceeded──► Ready
//!                    ▲   │                         │
//!     BackoffElapsed │   │ FetchFailed             │ Refetch
//!                    │   ▼                         │
//!                  BackingOff ◄────────────────────┘ (via Fetching)
//!                        │
//!                        │ Exhausted
//!                        ▼
//!                      Failed ──ManualRetry──► Fetching
//! ```

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub csrf_machine(Idle)

    Idle => {
        Start => Fetching
    },
    Fetching => {
        FetchSucceeded => Ready,
        FetchFailed => BackingOff
    },
    BackingOff => {
        BackoffElapsed => Fetching,
        Exhausted => Failed
    },
    Ready => {
        Refetch => Fetching
    },
    Failed => {
        ManualRetry => Fetching
    }
}

pub use csrf_machine::Input as CsrfMachineInput;
pub use csrf_machine::State as CsrfMachineState;
pub use csrf_machine::StateMachine as CsrfMachine;

/// Bootstrap status as callers see it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CsrfStatus {
    /// Bootstrap has not started.
    Idle,
    /// A fetch is in flight.
    Fetching,
    /// Waiting before the next attempt.
    BackingOff,
    /// A token fetch succeeded.
    Ready,
    /// Every attempt failed; a manual retry is possible.
    Failed,
}

impl CsrfStatus {
    /// Returns true while a bootstrap run is in progress.
    pub fn is_pending(&self) -> bool {
        matches!(self, CsrfStatus::Fetching | CsrfStatus::BackingOff)
    }
}

impl From<&CsrfMachineState> for CsrfStatus {
    fn from(state: &CsrfMachineState) -> Self {
        match state {
            CsrfMachineState::Idle => CsrfStatus::Idle,
            CsrfMachineState::Fetching => CsrfStatus::Fetching,
            CsrfMachineState::BackingOff => CsrfStatus::BackingOff,
            CsrfMachineState::Ready => CsrfStatus::Ready,
            CsrfMachineState::Failed => CsrfStatus::Failed,
        }
    }
}
