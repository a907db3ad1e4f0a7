// Module identity and load descriptors.
//
// Consumed by `tandem-pipeline` (registry, pool) and `tandem-store` (artifact
// resolution).

use std::fmt;

use serde::{Deserialize, Serialize};

// ── Module Index ─────────────────────────────────────────────────────────────

/// Logical identity of a module inside a pipeline.
///
/// The only addressing key shared by the registry and the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleIndex(pub u32);

impl ModuleIndex {
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ModuleIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mod{}", self.0)
    }
}

impl From<u32> for ModuleIndex {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

// ── Load Descriptor ──────────────────────────────────────────────────────────

/// Everything needed to turn artifacts on disk into a runnable module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleLoadInfo {
    /// Compiled library artifact (e.g. `"stage0.so"`).
    pub artifact_name: String,
    /// Structural graph description (e.g. `"stage0.json"`).
    pub structure_name: String,
    /// Parameter blob (e.g. `"stage0.params"`).
    pub parameter_name: String,
    /// Target device string, carried into the live instance.
    pub device: String,
}

impl ModuleLoadInfo {
    pub fn new(
        artifact_name: impl Into<String>,
        structure_name: impl Into<String>,
        parameter_name: impl Into<String>,
        device: impl Into<String>,
    ) -> Self {
        Self {
            artifact_name: artifact_name.into(),
            structure_name: structure_name.into(),
            parameter_name: parameter_name.into(),
            device: device.into(),
        }
    }

    /// Names of the three artifacts, in load order.
    pub fn artifact_names(&self) -> [&str; 3] {
        [&self.artifact_name, &self.structure_name, &self.parameter_name]
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
