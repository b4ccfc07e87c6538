//! Per-request lookup state machine: MemoryCheck → StorageCheck → Hit | Miss.
//! A memory hit (or an expired memory entry) short-circuits straight to a
//! terminal state without consulting the persistent tier.

use serde::Serialize;
use tracing::{debug, warn};

/// All states a cache lookup passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LookupState {
    MemoryCheck,
    StorageCheck,
    Hit,
    Miss,
}

impl std::fmt::Display for LookupState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LookupState::MemoryCheck => write!(f, "MemoryCheck"),
            LookupState::StorageCheck => write!(f, "StorageCheck"),
            LookupState::Hit => write!(f, "Hit"),
            LookupState::Miss => write!(f, "Miss"),
        }
    }
}

impl LookupState {
    /// Returns whether transitioning from `self` to `next` is valid.
    pub fn can_transition_to(self, next: LookupState) -> bool {
        matches!(
            (self, next),
            (LookupState::MemoryCheck, LookupState::StorageCheck)
                | (LookupState::MemoryCheck, LookupState::Hit)
                | (LookupState::MemoryCheck, LookupState::Miss) // expired in memory
                | (LookupState::StorageCheck, LookupState::Hit)
                | (LookupState::StorageCheck, LookupState::Miss)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LookupState::Hit | LookupState::Miss)
    }
}

/// Tracks one lookup's progress.
#[derive(Debug)]
pub struct LookupTrace {
    state: LookupState,
    visited_storage: bool,
}

impl LookupTrace {
    pub fn start() -> Self {
        Self {
            state: LookupState::MemoryCheck,
            visited_storage: false,
        }
    }

    pub fn current(&self) -> LookupState {
        self.state
    }

    pub fn visited_storage(&self) -> bool {
        self.visited_storage
    }

    /// Move to `next`. Returns Err and stays put on an invalid transition.
    pub fn advance(&mut self, next: LookupState) -> Result<LookupState, String> {
        let current = self.state;
        if !current.can_transition_to(next) {
            let msg = format!("invalid lookup transition: {} -> {}", current, next);
            warn!("{}", msg);
            return Err(msg);
        }
        if next == LookupState::StorageCheck {
            self.visited_storage = true;
        }
        self.state = next;
        debug!(from = %current, to = %next, "lookup_transition");
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_path() {
        let mut trace = LookupTrace::start();
        trace.advance(LookupState::StorageCheck).unwrap();
        trace.advance(LookupState::Hit).unwrap();
        assert!(trace.current().is_terminal());
        assert!(trace.visited_storage());
    }

    #[test]
    fn memory_hit_skips_storage() {
        let mut trace = LookupTrace::start();
        trace.advance(LookupState::Hit).unwrap();
        assert!(!trace.visited_storage());
    }

    #[test]
    fn terminal_states_are_final() {
        let mut trace = LookupTrace::start();
        trace.advance(LookupState::Miss).unwrap();
        assert!(trace.advance(LookupState::StorageCheck).is_err());
        assert!(trace.advance(LookupState::Hit).is_err());
        assert_eq!(trace.current(), LookupState::Miss);
    }

    #[test]
    fn cannot_return_to_memory_check() {
        assert!(!LookupState::StorageCheck.can_transition_to(LookupState::MemoryCheck));
        assert!(!LookupState::Hit.can_transition_to(LookupState::MemoryCheck));
    }
}
