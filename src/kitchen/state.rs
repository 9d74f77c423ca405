// src/kitchen/state.rs

//! Install state machine
//!
//! ```text
//! Pending -> Resolving -> Fetching -> Configuring -> Building -> Installing -> Testing -> Done
//!                                  \______________\____________\____________\________/
//! ```
//!
//! Stage states may be skipped when a recipe declares no stage of that
//! kind, and `Testing` only happens when tests are requested. Any
//! non-terminal state may move to `Failed`. `Done` and `Failed` are terminal.

use crate::error::{Error, Result};
use crate::recipe::StageKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where an install currently is
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum InstallState {
    #[default]
    Pending,
    Resolving,
    Fetching,
    Configuring,
    Building,
    Installing,
    Testing,
    Done,
    Failed(String),
}

impl InstallState {
    /// State entered when a stage of `kind` starts
    pub fn for_stage(kind: StageKind) -> Self {
        match kind {
            StageKind::Configure => Self::Configuring,
            StageKind::Build => Self::Building,
            StageKind::Install => Self::Installing,
            StageKind::Test => Self::Testing,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }

    /// Position along the happy path, used to forbid moving backwards
    fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Resolving => 1,
            Self::Fetching => 2,
            Self::Configuring => 3,
            Self::Building => 4,
            Self::Installing => 5,
            Self::Testing => 6,
            Self::Done => 7,
            Self::Failed(_) => 8,
        }
    }

    fn is_stage(&self) -> bool {
        matches!(self, Self::Configuring | Self::Building | Self::Installing)
    }

    /// Whether moving from `self` to `next` is allowed
    pub fn can_advance_to(&self, next: &InstallState) -> bool {
        use InstallState::*;

        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Failed(_)) => true,
            (Pending, Resolving) | (Resolving, Fetching) => true,
            // Consecutive stages of one kind stay in the same state
            (a, b) if a.is_stage() && a == b => true,
            (Fetching, b) if b.is_stage() => true,
            (a, b) if a.is_stage() && b.is_stage() => b.rank() > a.rank(),
            (a, Testing | Done) if a.is_stage() => true,
            (Testing, Done) => true,
            _ => false,
        }
    }

    /// Move to `next`, rejecting transitions the state machine does not allow
    pub fn advance(&mut self, next: InstallState) -> Result<()> {
        if !self.can_advance_to(&next) {
            return Err(Error::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            });
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Resolving => write!(f, "resolving"),
            Self::Fetching => write!(f, "fetching"),
            Self::Configuring => write!(f, "configuring"),
            Self::Building => write!(f, "building"),
            Self::Installing => write!(f, "installing"),
            Self::Testing => write!(f, "testing"),
            Self::Done => write!(f, "done"),
            Self::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk(states: &[InstallState]) -> Result<InstallState> {
        let mut state = InstallState::Pending;
        for next in states {
            state.advance(next.clone())?;
        }
        Ok(state)
    }

    #[test]
    fn test_full_happy_path() {
        use InstallState::*;
        let end = walk(&[Resolving, Fetching, Configuring, Building, Installing, Testing, Done]).unwrap();
        assert_eq!(end, Done);
        assert!(end.is_terminal());
    }

    #[test]
    fn test_skipped_stages_and_repeats() {
        use InstallState::*;
        walk(&[Resolving, Fetching, Building, Building, Done]).unwrap();
        walk(&[Resolving, Fetching, Installing, Testing, Done]).unwrap();
    }

    #[test]
    fn test_backwards_and_skipping_fetch_rejected() {
        use InstallState::*;
        assert!(walk(&[Resolving, Fetching, Installing, Building]).is_err());
        assert!(walk(&[Resolving, Building]).is_err());
        assert!(walk(&[Fetching]).is_err());
        assert!(walk(&[Resolving, Fetching, Done]).is_err());
    }

    #[test]
    fn test_failed_is_terminal() {
        use InstallState::*;
        let mut state = walk(&[Resolving, Fetching]).unwrap();
        state.advance(Failed("checksum mismatch".into())).unwrap();
        assert!(state.is_terminal());
        assert!(state.advance(Done).is_err());
        assert!(state.advance(Failed("again".into())).is_err());
        assert_eq!(state.to_string(), "failed: checksum mismatch");
    }

    #[test]
    fn test_done_is_terminal() {
        use InstallState::*;
        let mut state = walk(&[Resolving, Fetching, Building, Done]).unwrap();
        assert!(state.advance(Failed("late".into())).is_err());
    }

    #[test]
    fn test_for_stage() {
        assert_eq!(InstallState::for_stage(StageKind::Configure), InstallState::Configuring);
        assert_eq!(InstallState::for_stage(StageKind::Test), InstallState::Testing);
    }
}
