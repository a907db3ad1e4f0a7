//! Configuration text → validated intermediate representation.
//!
//! Parsing is pure: no module is touched until the resulting
//! [`PipelineDocument`] has been turned into a plan and validated.
//!
//! ```json
//! {
//!   "load_config": [
//!     {"mod_idx": 0, "lib_name": "m0.so", "json_name": "m0.json",
//!      "params_name": "m0.params", "dev": "cpu0"}
//!   ],
//!   "module_connection": [
//!     {"mod_idx": 0, "dev": "cpu0",
//!      "output": [{"output_idx": 0, "dependencies": [{"global_output_index": 0}]}]}
//!   ],
//!   "input_connection": [
//!     {"global_interface_name": "data", "mod_idx": 0, "input_idx": 0}
//!   ]
//! }
//! ```
//!
//! Every object rejects unknown keys. Integers are read signed so that a
//! negative index is reported by value instead of as a decode failure.

use serde::Deserialize;

use tandem_types::{BindingTarget, ModuleIndex};

use crate::error::{PipelineError, Result};

// ── Raw sections ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineDocument {
    /// Module registry section.
    pub load_config: Vec<LoadEntry>,
    /// Dependency section.
    pub module_connection: Vec<ConnectionEntry>,
    /// Named pipeline inputs.
    #[serde(default)]
    pub input_connection: Vec<InputEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadEntry {
    pub mod_idx: Option<i64>,
    #[serde(default)]
    pub lib_name: String,
    #[serde(default)]
    pub json_name: String,
    #[serde(default)]
    pub params_name: String,
    #[serde(default)]
    pub dev: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionEntry {
    pub mod_idx: Option<i64>,
    #[serde(default)]
    pub dev: String,
    #[serde(default)]
    pub output: Vec<OutputEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputEntry {
    pub output_idx: Option<i64>,
    #[serde(default)]
    pub dependencies: Vec<DependencyEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependencyEntry {
    pub mod_idx: Option<i64>,
    pub input_idx: Option<i64>,
    pub global_output_index: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputEntry {
    pub global_interface_name: String,
    pub mod_idx: Option<i64>,
    pub input_idx: Option<i64>,
}

// ── Parsing ──────────────────────────────────────────────────────────────────

impl PipelineDocument {
    /// Decode configuration text. Fails with [`PipelineError::Config`] on any
    /// syntax error, missing section, or unrecognised key.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))
    }
}

impl DependencyEntry {
    /// Resolve to exactly one binding target.
    pub fn target(&self) -> Result<BindingTarget> {
        match (self.mod_idx, self.input_idx, self.global_output_index) {
            (Some(m), Some(i), None) => Ok(BindingTarget::Module {
                mod_idx: module_index(Some(m))?,
                input_idx: slot_index(Some(i), "input_idx")?,
            }),
            (None, None, Some(g)) => Ok(BindingTarget::GlobalOutput {
                slot: slot_index(Some(g), "global_output_index")?,
            }),
            (None, None, None) => Err(PipelineError::Config(
                "dependency names neither a module input nor a global output".into(),
            )),
            _ => Err(PipelineError::Config(format!(
                "dependency must be either {{mod_idx, input_idx}} or {{global_output_index}}, got {self:?}"
            ))),
        }
    }
}

/// Validate a `mod_idx` value.
pub(crate) fn module_index(value: Option<i64>) -> Result<ModuleIndex> {
    slot_index(value, "mod_idx").map(ModuleIndex)
}

/// Validate a non-negative index field named `field`.
pub(crate) fn slot_index(value: Option<i64>, field: &str) -> Result<u32> {
    let v = value.ok_or_else(|| PipelineError::Config(format!("missing {field}")))?;
    u32::try_from(v).map_err(|_| PipelineError::Config(format!("invalid {field} value {v}")))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
