//! Construction state machine for a single sandbox build.
//!
//! One tracker exists per app launch. It is the single source of truth for how far
//! a construction got, so that a caller holding an aborted result can tell exactly
//! which stage failed and never mistakes a partial root for a usable one.
//!
//! # Example
//!
//! ```rust
//! use appspawn_common::{ConstructionState, ConstructionTracker};
//!
//! let mut tracker = ConstructionTracker::new();
//! tracker.advance(ConstructionState::RootReady).unwrap();
//! tracker.advance(ConstructionState::CommonApplied).unwrap();
//! tracker.advance(ConstructionState::Done).unwrap();
//!
//! assert!(tracker.current().is_terminal());
//! assert!(tracker.advance(ConstructionState::RootReady).is_err());
//! ```

use std::fmt;

/// Lifecycle states of one sandbox construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstructionState {
    /// Nothing has touched the filesystem yet. Planning happens here.
    Idle,

    /// The sandbox root directory tree exists.
    RootReady,

    /// Every common-scope operation has been applied.
    CommonApplied,

    /// Every private-scope operation has been applied.
    PrivateApplied,

    /// Construction finished; the root may be handed to the new process.
    Done,

    /// An operation failed. Whatever was applied stays in place and the root
    /// must only be discarded.
    Aborted,
}

impl ConstructionState {
    /// Returns true for `Done` and `Aborted`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConstructionState::Done | ConstructionState::Aborted)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// `Idle → Done` is legal: it is the path taken when sandboxing is switched
    /// off and the app runs against the unmodified root.
    pub fn can_transition_to(&self, next: ConstructionState) -> bool {
        use ConstructionState::*;

        match (self, next) {
            (from, Aborted) => !from.is_terminal(),
            (Idle, RootReady) | (Idle, Done) => true,
            (RootReady, CommonApplied) => true,
            (CommonApplied, PrivateApplied) | (CommonApplied, Done) => true,
            (PrivateApplied, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ConstructionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConstructionState::Idle => "idle",
            ConstructionState::RootReady => "root-ready",
            ConstructionState::CommonApplied => "common-applied",
            ConstructionState::PrivateApplied => "private-applied",
            ConstructionState::Done => "done",
            ConstructionState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Rejected transition between two construction states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: ConstructionState,
    pub to: ConstructionState,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot move sandbox construction from {} to {}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

/// Records the current state of one construction together with every state it
/// has passed through.
#[derive(Debug, Clone)]
pub struct ConstructionTracker {
    history: Vec<ConstructionState>,
}

impl ConstructionTracker {
    /// Create a tracker in the `Idle` state.
    pub fn new() -> Self {
        Self {
            history: vec![ConstructionState::Idle],
        }
    }

    /// The state most recently entered.
    pub fn current(&self) -> ConstructionState {
        // history is never empty: it starts with Idle and only grows
        self.history
            .last()
            .copied()
            .unwrap_or(ConstructionState::Idle)
    }

    /// Every state entered so far, oldest first.
    pub fn history(&self) -> &[ConstructionState] {
        &self.history
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    pub fn advance(&mut self, next: ConstructionState) -> Result<(), InvalidTransition> {
        let from = self.current();
        if from.can_transition_to(next) {
            self.history.push(next);
            Ok(())
        } else {
            Err(InvalidTransition { from, to: next })
        }
    }

    /// Enter `Aborted` and return the state the construction had reached.
    ///
    /// Aborting an already terminal construction leaves it untouched.
    pub fn abort(&mut self) -> ConstructionState {
        let reached = self.current();
        if !reached.is_terminal() {
            self.history.push(ConstructionState::Aborted);
        }
        reached
    }
}

impl Default for ConstructionTracker {
    fn default() -> Self {
        Self::new()
    }
}
