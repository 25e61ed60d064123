//! Per-source sync state machine
//!
//! ```text
//! Unseen ──► Ingesting ──► Indexed ──► UpToDate
//!               │  ▲          │           │
//!               ▼  │          │           │
//!             Failed ◄────────┘           │
//!                                         │
//! UpToDate ──► Ingesting ◄────────────────┘
//! ```
//!
//! `Ingesting` covers everything up to a successful index write. Any
//! non-terminal state may become `Cancelled`.

use std::fmt;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Unseen,
    Ingesting,
    Indexed,
    UpToDate,
    Failed,
    Cancelled,
}

impl SourceState {
    pub fn can_become(self, next: SourceState) -> bool {
        use SourceState::*;
        matches!(
            (self, next),
            (Unseen, Ingesting)
                | (UpToDate, Ingesting)
                | (Ingesting, Indexed)
                | (Ingesting, Failed)
                | (Indexed, UpToDate)
                | (Indexed, Failed)
                | (Failed, Ingesting)
                | (Unseen | Ingesting | Indexed | Failed | UpToDate, Cancelled)
        )
    }
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceState::Unseen => "unseen",
            SourceState::Ingesting => "ingesting",
            SourceState::Indexed => "indexed",
            SourceState::UpToDate => "up-to-date",
            SourceState::Failed => "failed",
            SourceState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Current state of one source during a run
#[derive(Debug)]
pub struct SourceTracker {
    path: PathBuf,
    state: SourceState,
    attempts: u32,
}

impl SourceTracker {
    pub fn new(path: PathBuf, seen: bool) -> Self {
        Self {
            path,
            state: if seen {
                SourceState::UpToDate
            } else {
                SourceState::Unseen
            },
            attempts: 0,
        }
    }

    pub fn state(&self) -> SourceState {
        self.state
    }

    /// Attempts started so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn advance(&mut self, next: SourceState) {
        debug_assert!(
            self.state.can_become(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        if next == SourceState::Ingesting {
            self.attempts += 1;
        }
        debug!(
            source = %self.path.display(),
            from = %self.state,
            to = %next,
            attempt = self.attempts,
            "source state"
        );
        self.state = next;
    }
}
