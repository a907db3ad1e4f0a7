use std::fmt;

use tandem_types::ModuleIndex;

use crate::error::{PipelineError, Result};

// ── Stage State Machine ──────────────────────────────────────────────────────

/// Idle → InputsReady → Running → OutputsReady → Drained
///
/// Tracked per module, per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    /// Waiting for input slots of the current run.
    Idle,
    /// Every input slot is populated.
    InputsReady,
    /// The module is being invoked.
    Running,
    /// The module returned its full output set.
    OutputsReady,
    /// Every output has been routed.
    Drained,
}

impl StageState {
    fn successor(self) -> Option<Self> {
        match self {
            Self::Idle         => Some(Self::InputsReady),
            Self::InputsReady  => Some(Self::Running),
            Self::Running      => Some(Self::OutputsReady),
            Self::OutputsReady => Some(Self::Drained),
            Self::Drained      => None,
        }
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle         => write!(f, "Idle"),
            Self::InputsReady  => write!(f, "InputsReady"),
            Self::Running      => write!(f, "Running"),
            Self::OutputsReady => write!(f, "OutputsReady"),
            Self::Drained      => write!(f, "Drained"),
        }
    }
}

// ── Stage Tracker ────────────────────────────────────────────────────────────

/// State of one module within one run. Only forward, single-step
/// transitions are accepted.
#[derive(Debug, Clone)]
pub struct StageTracker {
    pub mod_idx: ModuleIndex,
    pub state: StageState,
}

impl StageTracker {
    pub fn new(mod_idx: ModuleIndex) -> Self {
        Self {
            mod_idx,
            state: StageState::Idle,
        }
    }

    /// Move to `next`, which must be the direct successor of the current state.
    pub fn advance(&mut self, next: StageState) -> Result<()> {
        if self.state.successor() != Some(next) {
            return Err(PipelineError::InvalidTransition {
                from: format!("{} {}", self.mod_idx, self.state),
                to: next.to_string(),
            });
        }
        self.state = next;
        Ok(())
    }

    pub fn is_drained(&self) -> bool {
        self.state == StageState::Drained
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
