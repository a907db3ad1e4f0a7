//! Validated pipeline plan.
//!
//! Validation order:
//! 1. Parse the configuration text.
//! 2. Build the registry and the dependency graph (schema checks).
//! 3. Cross-check module references between the two (lookup checks).
//! 4. Check topology: no cycles, dense global outputs, single feeders.
//!
//! Nothing here touches a module, so a rejected configuration never causes
//! a load.

use std::collections::BTreeMap;

use tracing::info;

use tandem_types::ModuleIndex;

use crate::document::{module_index, slot_index, InputEntry, PipelineDocument};
use crate::error::{PipelineError, Result};
use crate::graph::{DependencyGraph, InputSource};
use crate::registry::ModuleRegistry;

/// Entry slot addressed by a global input name.
pub type InputSlot = (ModuleIndex, u32);

#[derive(Debug, Clone)]
pub struct PipelinePlan {
    registry: ModuleRegistry,
    graph: DependencyGraph,
    named_inputs: BTreeMap<String, InputSlot>,
    input_sources: BTreeMap<InputSlot, InputSource>,
    order: Vec<ModuleIndex>,
    num_outputs: usize,
}

impl PipelinePlan {
    pub fn parse(text: &str) -> Result<Self> {
        Self::from_document(PipelineDocument::parse(text)?)
    }

    pub fn from_document(doc: PipelineDocument) -> Result<Self> {
        // ── Schema ───────────────────────────────────────────────────────
        let registry = ModuleRegistry::from_entries(&doc.load_config)?;
        let graph = DependencyGraph::from_entries(&doc.module_connection)?;
        let named_inputs = named_inputs(&doc.input_connection)?;

        for (mod_idx, producer) in graph.producers() {
            if let Ok(info) = registry.get(mod_idx) {
                if !producer.device.is_empty()
                    && !info.device.is_empty()
                    && producer.device != info.device
                {
                    return Err(PipelineError::Config(format!(
                        "{mod_idx} declared on {} in load_config but {} in module_connection",
                        info.device, producer.device
                    )));
                }
            }
        }

        // ── Cross references ─────────────────────────────────────────────
        for mod_idx in graph.referenced_modules() {
            if !registry.contains(mod_idx) {
                return Err(PipelineError::Lookup(format!(
                    "{mod_idx} is referenced in module_connection but has no load_config entry"
                )));
            }
        }
        for (mod_idx, _) in registry.iter() {
            if graph.producer(mod_idx).is_none() {
                return Err(PipelineError::Lookup(format!(
                    "{mod_idx} is registered but has no module_connection entry"
                )));
            }
        }
        for (name, (mod_idx, _)) in &named_inputs {
            if !registry.contains(*mod_idx) {
                return Err(PipelineError::Lookup(format!(
                    "input '{name}' targets undeclared {mod_idx}"
                )));
            }
        }

        // ── Topology ─────────────────────────────────────────────────────
        let order = graph.topological_order()?;
        let num_outputs = graph.global_output_count()?;
        let input_sources = graph.input_sources()?;

        for (name, slot) in &named_inputs {
            if let Some((producer, output_idx)) = input_sources.get(slot) {
                return Err(PipelineError::Graph(format!(
                    "input '{name}' targets {}:in{}, which is fed by {producer}:out{output_idx}",
                    slot.0, slot.1
                )));
            }
        }

        info!(
            modules = registry.len(),
            outputs = num_outputs,
            named_inputs = named_inputs.len(),
            "pipeline plan validated"
        );

        Ok(Self {
            registry,
            graph,
            named_inputs,
            input_sources,
            order,
            num_outputs,
        })
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Module order with ties broken by ascending index.
    pub fn order(&self) -> &[ModuleIndex] {
        &self.order
    }

    pub fn num_outputs(&self) -> usize {
        self.num_outputs
    }

    pub fn named_inputs(&self) -> &BTreeMap<String, InputSlot> {
        &self.named_inputs
    }

    pub fn input_sources(&self) -> &BTreeMap<InputSlot, InputSource> {
        &self.input_sources
    }

    pub fn is_routed(&self, slot: &InputSlot) -> bool {
        self.input_sources.contains_key(slot)
    }
}

fn named_inputs(entries: &[InputEntry]) -> Result<BTreeMap<String, InputSlot>> {
    let mut named = BTreeMap::new();
    let mut targets = BTreeMap::new();
    for entry in entries {
        let name = entry.global_interface_name.clone();
        if name.is_empty() {
            return Err(PipelineError::Config("global_interface_name is empty".into()));
        }
        let slot = (module_index(entry.mod_idx)?, slot_index(entry.input_idx, "input_idx")?);
        if let Some(prev) = targets.insert(slot, name.clone()) {
            return Err(PipelineError::Config(format!(
                "inputs '{prev}' and '{name}' both target {}:in{}",
                slot.0, slot.1
            )));
        }
        if named.insert(name.clone(), slot).is_some() {
            return Err(PipelineError::Config(format!("duplicate input name '{name}'")));
        }
    }
    Ok(named)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
