//! Per-run state: identifiers, caller inputs, pending module inputs, and
//! the pipeline-output collection.
//!
//! All of it is owned by exactly one run and discarded when the run ends.

use std::collections::BTreeMap;
use std::fmt;

use uuid::Uuid;

use tandem_types::{ModuleIndex, Tensor};

use crate::error::{PipelineError, Result};

// ── Run Id ───────────────────────────────────────────────────────────────────

/// Tag carried by every payload routed on behalf of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Caller inputs ────────────────────────────────────────────────────────────

/// Inputs for one run, addressed by entry slot or by global input name.
#[derive(Debug, Clone, Default)]
pub struct RunInputs {
    pub(crate) bound: Vec<(ModuleIndex, u32, Tensor)>,
    pub(crate) named: Vec<(String, Tensor)>,
}

impl RunInputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed input slot `input_idx` of module `mod_idx`.
    pub fn bind(mut self, mod_idx: impl Into<ModuleIndex>, input_idx: u32, tensor: Tensor) -> Self {
        self.bound.push((mod_idx.into(), input_idx, tensor));
        self
    }

    /// Feed the global input declared as `name` in `input_connection`.
    pub fn named(mut self, name: impl Into<String>, tensor: Tensor) -> Self {
        self.named.push((name.into(), tensor));
        self
    }

    pub fn len(&self) -> usize {
        self.bound.len() + self.named.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── Outputs ──────────────────────────────────────────────────────────────────

/// Pipeline outputs of one run, ordered by global output slot.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutputs {
    tensors: Vec<Tensor>,
}

impl PipelineOutputs {
    pub fn get(&self, slot: usize) -> Option<&Tensor> {
        self.tensors.get(slot)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tensor> {
        self.tensors.iter()
    }

    pub fn into_vec(self) -> Vec<Tensor> {
        self.tensors
    }
}

/// Collects global outputs; each slot may be filled exactly once.
#[derive(Debug)]
pub(crate) struct OutputCollector {
    slots: Vec<Option<Tensor>>,
    filled: usize,
}

impl OutputCollector {
    pub(crate) fn new(num_outputs: usize) -> Self {
        Self {
            slots: vec![None; num_outputs],
            filled: 0,
        }
    }

    pub(crate) fn fill(&mut self, slot: u32, tensor: Tensor) -> Result<()> {
        let entry = self.slots.get_mut(slot as usize).ok_or_else(|| {
            PipelineError::Graph(format!("global output {slot} is out of range"))
        })?;
        if entry.is_some() {
            return Err(PipelineError::Graph(format!(
                "global output {slot} filled more than once"
            )));
        }
        *entry = Some(tensor);
        self.filled += 1;
        Ok(())
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.filled == self.slots.len()
    }

    pub(crate) fn missing(&self) -> Vec<u32> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_none())
            .map(|(i, _)| i as u32)
            .collect()
    }

    /// Hand out the outputs, or [`PipelineError::IncompleteRun`] if a slot
    /// is still empty.
    pub(crate) fn finish(self) -> Result<PipelineOutputs> {
        if !self.is_complete() {
            return Err(PipelineError::IncompleteRun {
                missing: self.missing(),
            });
        }
        Ok(PipelineOutputs {
            tensors: self.slots.into_iter().flatten().collect(),
        })
    }
}

// ── Pending module inputs ────────────────────────────────────────────────────

/// Input slots of one module for one run.
#[derive(Debug)]
pub(crate) struct PendingInputs {
    slots: Vec<Option<Tensor>>,
    filled: usize,
}

impl PendingInputs {
    pub(crate) fn new(num_inputs: usize) -> Self {
        Self {
            slots: vec![None; num_inputs],
            filled: 0,
        }
    }

    /// Store an input. Returns `true` once every slot is populated.
    pub(crate) fn insert(&mut self, mod_idx: ModuleIndex, input_idx: u32, tensor: Tensor) -> Result<bool> {
        let entry = self.slots.get_mut(input_idx as usize).ok_or_else(|| {
            PipelineError::Graph(format!("{mod_idx} has no input slot {input_idx}"))
        })?;
        if entry.is_some() {
            return Err(PipelineError::Graph(format!(
                "{mod_idx}:in{input_idx} received two payloads in one run"
            )));
        }
        *entry = Some(tensor);
        self.filled += 1;
        Ok(self.is_ready())
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.filled == self.slots.len()
    }

    /// Inputs in slot order. Only meaningful once [`is_ready`](Self::is_ready).
    pub(crate) fn take(self) -> Vec<Tensor> {
        self.slots.into_iter().flatten().collect()
    }
}

/// Pending inputs of every module for a single run.
#[derive(Debug, Default)]
pub(crate) struct InputTable {
    modules: BTreeMap<ModuleIndex, PendingInputs>,
}

impl InputTable {
    /// Deliver an input. Returns `true` when the module became ready.
    pub(crate) fn deliver(
        &mut self,
        mod_idx: ModuleIndex,
        num_inputs: usize,
        input_idx: u32,
        tensor: Tensor,
    ) -> Result<bool> {
        self.modules
            .entry(mod_idx)
            .or_insert_with(|| PendingInputs::new(num_inputs))
            .insert(mod_idx, input_idx, tensor)
    }

    pub(crate) fn take(&mut self, mod_idx: ModuleIndex) -> Option<PendingInputs> {
        self.modules.remove(&mod_idx)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
