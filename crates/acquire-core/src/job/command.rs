//! Which state changes are legal.
//!
//! User commands and pipeline events both go through this table. The store
//! applies a transition as a compare-and-set on the state column, so a
//! command that loses a race sees the same `InvalidState` as an illegal one.

use super::JobState;
use JobState::*;

/// Commands a caller can issue against a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Pause,
    Resume,
    Cancel,
    Remove,
}

impl Command {
    pub fn name(self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Cancel => "cancel",
            Command::Remove => "remove",
        }
    }

    /// States the command is accepted from.
    pub fn allowed_from(self) -> &'static [JobState] {
        match self {
            // Start doubles as resume for a paused job; it is rejected while
            // a coordinator already runs.
            Command::Start => &[Created, Paused],
            Command::Pause => &[Downloading],
            Command::Resume => &[Paused],
            Command::Cancel => &[Created, Downloading, Paused, Verifying, Extracting],
            Command::Remove => &[Completed, Failed, Cancelled],
        }
    }

    pub fn accepts(self, state: JobState) -> bool {
        self.allowed_from().contains(&state)
    }
}

/// A guarded state change: succeeds only if the job is currently in `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: &'static [JobState],
    pub to: JobState,
}

impl Transition {
    pub const START: Transition = Transition { from: &[Created, Paused], to: Downloading };
    pub const PAUSE: Transition = Transition { from: &[Downloading], to: Paused };
    pub const RESUME: Transition = Transition { from: &[Paused], to: Downloading };
    pub const CANCEL: Transition = Transition {
        from: &[Created, Downloading, Paused, Verifying, Extracting],
        to: Cancelled,
    };
    /// All ranges done; verification is never skipped.
    pub const VERIFY: Transition = Transition { from: &[Downloading], to: Verifying };
    pub const EXTRACT: Transition = Transition { from: &[Verifying], to: Extracting };
    pub const COMPLETE: Transition = Transition { from: &[Extracting], to: Completed };
    pub const FAIL: Transition = Transition {
        from: &[Created, Downloading, Paused, Verifying, Extracting],
        to: Failed,
    };
    /// Crash recovery: a job whose pipeline died with the process.
    pub const INTERRUPTED: Transition = Transition {
        from: &[Downloading, Verifying, Extracting],
        to: Paused,
    };

    pub fn for_command(cmd: Command) -> Option<Transition> {
        match cmd {
            Command::Start => Some(Self::START),
            Command::Pause => Some(Self::PAUSE),
            Command::Resume => Some(Self::RESUME),
            Command::Cancel => Some(Self::CANCEL),
            Command::Remove => None,
        }
    }

    pub fn applies_to(&self, state: JobState) -> bool {
        self.from.contains(&state)
    }
}
