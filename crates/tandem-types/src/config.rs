// Runtime configuration structs.

use std::path::PathBuf;
use std::time::Duration;

// ── Executor ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Capacity of each module worker's inbox in the pipelined runtime.
    /// Senders wait when a downstream module falls this far behind.
    /// Default: 64.
    pub queue_depth: usize,

    /// Deadline applied to every submitted run that does not carry its own.
    /// Default: none.
    pub default_deadline: Option<Duration>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            queue_depth: 64,
            default_deadline: None,
        }
    }
}

// ── Artifact store ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding module artifacts.
    /// Defaults to `$HOME/.tandem/artifacts/`.
    pub root: PathBuf,

    /// Check artifacts against `<root>/digests.json` when it exists.
    /// Default: true.
    pub verify_digests: bool,
}

impl StoreConfig {
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        let root = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/tmp/tandem"))
            .join(".tandem")
            .join("artifacts");

        Self {
            root,
            verify_digests: true,
        }
    }
}
