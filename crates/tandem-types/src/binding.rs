// Output bindings: where each output slot of a producer module goes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TandemError;
use crate::module::ModuleIndex;

// ── Binding Target ───────────────────────────────────────────────────────────

/// One consumer of a producer's output slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BindingTarget {
    /// Feed input slot `input_idx` of a downstream module.
    Module { mod_idx: ModuleIndex, input_idx: u32 },
    /// Publish as pipeline output slot `slot`.
    GlobalOutput { slot: u32 },
}

impl fmt::Display for BindingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module { mod_idx, input_idx } => write!(f, "{mod_idx}:in{input_idx}"),
            Self::GlobalOutput { slot } => write!(f, "out{slot}"),
        }
    }
}

// ── Output Map ───────────────────────────────────────────────────────────────

/// All bindings of a single producer, keyed by its output slot.
///
/// A slot may fan out to several targets. Slots iterate in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputMap {
    slots: BTreeMap<u32, Vec<BindingTarget>>,
}

impl OutputMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `output_idx` to `targets`. Each output slot may be bound once
    /// and must have at least one target.
    pub fn bind(&mut self, output_idx: u32, targets: Vec<BindingTarget>) -> Result<(), TandemError> {
        if targets.is_empty() {
            return Err(TandemError::Binding(format!(
                "output {output_idx} has no dependencies"
            )));
        }
        if self.slots.contains_key(&output_idx) {
            return Err(TandemError::Binding(format!(
                "output {output_idx} bound more than once"
            )));
        }
        self.slots.insert(output_idx, targets);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of bound output slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn targets(&self, output_idx: u32) -> &[BindingTarget] {
        self.slots.get(&output_idx).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `(output_idx, targets)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &[BindingTarget])> {
        self.slots.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    /// Highest bound output slot, if any.
    pub fn max_output_idx(&self) -> Option<u32> {
        self.slots.keys().next_back().copied()
    }

    /// Downstream modules fed by this producer (deduplicated, ascending).
    pub fn downstream_modules(&self) -> Vec<ModuleIndex> {
        let mut mods: Vec<ModuleIndex> = self
            .slots
            .values()
            .flatten()
            .filter_map(|t| match t {
                BindingTarget::Module { mod_idx, .. } => Some(*mod_idx),
                BindingTarget::GlobalOutput { .. } => None,
            })
            .collect();
        mods.sort();
        mods.dedup();
        mods
    }

    /// Every pipeline output slot this producer publishes.
    pub fn global_outputs(&self) -> Vec<u32> {
        self.slots
            .values()
            .flatten()
            .filter_map(|t| match t {
                BindingTarget::GlobalOutput { slot } => Some(*slot),
                BindingTarget::Module { .. } => None,
            })
            .collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn to_module(m: u32, i: u32) -> BindingTarget {
        BindingTarget::Module { mod_idx: ModuleIndex(m), input_idx: i }
    }

    #[test]
    fn fan_out_and_queries() {
        let mut map = OutputMap::new();
        map.bind(0, vec![to_module(2, 0), to_module(1, 1), BindingTarget::GlobalOutput { slot: 0 }])
            .unwrap();
        map.bind(1, vec![to_module(1, 0)]).unwrap();

        assert_eq!(map.len(), 2);
        assert_eq!(map.targets(0).len(), 3);
        assert!(map.targets(9).is_empty());
        assert_eq!(map.downstream_modules(), vec![ModuleIndex(1), ModuleIndex(2)]);
        assert_eq!(map.global_outputs(), vec![0]);
        assert_eq!(map.max_output_idx(), Some(1));
    }

    #[test]
    fn empty_targets_rejected() {
        let mut map = OutputMap::new();
        assert!(map.bind(0, vec![]).is_err());
        assert!(map.is_empty());
    }

    #[test]
    fn duplicate_output_slot_rejected() {
        let mut map = OutputMap::new();
        map.bind(0, vec![to_module(1, 0)]).unwrap();
        assert!(map.bind(0, vec![to_module(2, 0)]).is_err());
    }

    #[test]
    fn target_display() {
        assert_eq!(to_module(3, 1).to_string(), "mod3:in1");
        assert_eq!(BindingTarget::GlobalOutput { slot: 2 }.to_string(), "out2");
    }
}
