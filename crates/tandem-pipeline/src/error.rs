use tandem_types::{ModuleIndex, TandemError};

use crate::run::RunId;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("lookup error: {0}")]
    Lookup(String),

    #[error("graph error: {0}")]
    Graph(String),

    #[error("failed to load {mod_idx}: {reason}")]
    Load { mod_idx: ModuleIndex, reason: String },

    #[error("{mod_idx} failed: {message}")]
    Runtime { mod_idx: ModuleIndex, message: String },

    #[error("invalid run input: {0}")]
    Input(String),

    #[error("run drained with unfilled output slots {missing:?}")]
    IncompleteRun { missing: Vec<u32> },

    #[error("run {run_id} cancelled")]
    Cancelled { run_id: RunId },

    #[error("invalid state transition: {from} → {to}")]
    InvalidTransition { from: String, to: String },

    #[error("pipeline runtime has shut down")]
    Shutdown,

    #[error("no async runtime available: {0}")]
    NoRuntime(String),

    #[error(transparent)]
    Types(#[from] TandemError),
}

/// Coarse classification of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed configuration text.
    Config,
    /// Reference to a module that was never declared or could not be loaded.
    Lookup,
    /// Cyclic or incomplete topology.
    Graph,
    /// Failure scoped to a single run.
    Runtime,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Lookup(_) | Self::Load { .. } => ErrorKind::Lookup,
            Self::Graph(_) | Self::IncompleteRun { .. } => ErrorKind::Graph,
            Self::Runtime { .. }
            | Self::Input(_)
            | Self::Cancelled { .. }
            | Self::InvalidTransition { .. }
            | Self::Shutdown
            | Self::NoRuntime(_)
            | Self::Types(_) => ErrorKind::Runtime,
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, PipelineError>;
