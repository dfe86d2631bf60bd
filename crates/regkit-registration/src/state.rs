//! Run state of the orchestrator.

use std::fmt;

use crate::error::{RegistrationError, Result};

/// Where a registration run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Uninitialized,
    SignatureResolved,
    Assembled,
    Bound,
    Running { level: usize, iteration: usize },
    Finalizing,
    Done,
    Failed,
}

impl RunState {
    fn rank(self) -> u8 {
        match self {
            RunState::Uninitialized => 0,
            RunState::SignatureResolved => 1,
            RunState::Assembled => 2,
            RunState::Bound => 3,
            RunState::Running { .. } => 4,
            RunState::Finalizing => 5,
            RunState::Done => 6,
            RunState::Failed => 7,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Running { level, iteration } => {
                write!(f, "Running(level {level}, iteration {iteration})")
            }
            other => fmt::Debug::fmt(other, f),
        }
    }
}

/// Current state plus the sequence of states entered so far.
///
/// Progress within `Running` (new iteration, same level) updates the current
/// state without adding to the history.
#[derive(Debug, Clone)]
pub struct StateMachine {
    current: RunState,
    history: Vec<RunState>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            current: RunState::Uninitialized,
            history: vec![RunState::Uninitialized],
        }
    }

    pub fn current(&self) -> RunState {
        self.current
    }

    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    pub fn has_visited(&self, predicate: impl Fn(RunState) -> bool) -> bool {
        self.history.iter().any(|s| predicate(*s))
    }

    /// Move to `next`. Forward moves follow the fixed order, `Running` may
    /// repeat, and `Failed` is reachable from every non-terminal state.
    /// Any other move is refused and leaves the state unchanged.
    pub fn transition(&mut self, next: RunState) -> Result<()> {
        let allowed = match (self.current, next) {
            (current, _) if current.is_terminal() => false,
            (_, RunState::Failed) => true,
            (RunState::Running { .. }, RunState::Running { .. }) => true,
            (RunState::Bound, RunState::Finalizing) => true,
            (current, next) => next.rank() == current.rank() + 1,
        };
        if !allowed {
            return Err(RegistrationError::runtime(format!(
                "invalid run state transition from {} to {next}",
                self.current
            )));
        }
        let level_changed = match (self.current, next) {
            (RunState::Running { level: a, .. }, RunState::Running { level: b, .. }) => a != b,
            _ => true,
        };
        self.current = next;
        if level_changed {
            self.history.push(next);
        }
        Ok(())
    }

    /// Enter `Failed` unless the run has already ended.
    pub fn fail(&mut self) {
        if !self.current.is_terminal() {
            self.current = RunState::Failed;
            self.history.push(RunState::Failed);
        }
    }
}
