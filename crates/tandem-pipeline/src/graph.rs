//! Dependency graph: producer `mod_idx` → output map.
//!
//! Built once from the `module_connection` section. The module-to-module
//! projection is checked for cycles with petgraph; global output slots are
//! checked for density so that every slot in `0..num_outputs` has exactly one
//! producer.

use std::collections::{BTreeMap, BTreeSet};

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;

use tandem_types::{BindingTarget, ModuleIndex, OutputMap};

use crate::document::{module_index, slot_index, ConnectionEntry};
use crate::error::{PipelineError, Result};

/// Bindings and declared device of one producer.
#[derive(Debug, Clone)]
pub struct ProducerEntry {
    pub device: String,
    pub outputs: OutputMap,
}

/// Source of a routed module input: `(producer, output_idx)`.
pub type InputSource = (ModuleIndex, u32);

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    producers: BTreeMap<ModuleIndex, ProducerEntry>,
}

impl DependencyGraph {
    /// Build from dependency entries.
    ///
    /// Every entry must declare at least one output, and every output at
    /// least one dependency.
    pub fn from_entries(entries: &[ConnectionEntry]) -> Result<Self> {
        let mut producers = BTreeMap::new();
        for entry in entries {
            let mod_idx = module_index(entry.mod_idx)?;
            if entry.output.is_empty() {
                return Err(PipelineError::Config(format!(
                    "invalid output binding for {mod_idx}: no outputs declared"
                )));
            }

            let mut outputs = OutputMap::new();
            for out in &entry.output {
                let output_idx = slot_index(out.output_idx, "output_idx")?;
                let targets = out
                    .dependencies
                    .iter()
                    .map(|d| d.target())
                    .collect::<Result<Vec<_>>>()?;
                outputs
                    .bind(output_idx, targets)
                    .map_err(|e| PipelineError::Config(format!("{mod_idx}: {e}")))?;
            }

            let producer = ProducerEntry {
                device: entry.dev.clone(),
                outputs,
            };
            if producers.insert(mod_idx, producer).is_some() {
                return Err(PipelineError::Config(format!(
                    "duplicate dependency entry for {mod_idx}"
                )));
            }
        }
        Ok(Self { producers })
    }

    pub fn producer(&self, mod_idx: ModuleIndex) -> Option<&ProducerEntry> {
        self.producers.get(&mod_idx)
    }

    pub fn output_map(&self, mod_idx: ModuleIndex) -> Option<&OutputMap> {
        self.producers.get(&mod_idx).map(|p| &p.outputs)
    }

    /// Producers in ascending `mod_idx` order.
    pub fn producers(&self) -> impl Iterator<Item = (ModuleIndex, &ProducerEntry)> {
        self.producers.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.producers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.producers.is_empty()
    }

    /// Every module named anywhere in the graph, as producer or consumer.
    pub fn referenced_modules(&self) -> BTreeSet<ModuleIndex> {
        let mut mods: BTreeSet<ModuleIndex> = self.producers.keys().copied().collect();
        for p in self.producers.values() {
            mods.extend(p.outputs.downstream_modules());
        }
        mods
    }

    /// Module-to-module projection of the bindings.
    fn module_graph(&self) -> DiGraphMap<ModuleIndex, ()> {
        let mut g = DiGraphMap::new();
        for m in self.referenced_modules() {
            g.add_node(m);
        }
        for (&from, p) in &self.producers {
            for to in p.outputs.downstream_modules() {
                g.add_edge(from, to, ());
            }
        }
        g
    }

    /// Execution order with ties broken by ascending `mod_idx`.
    ///
    /// Fails with [`PipelineError::Graph`] naming the modules of a cycle.
    pub fn topological_order(&self) -> Result<Vec<ModuleIndex>> {
        let g = self.module_graph();

        for component in tarjan_scc(&g) {
            let self_loop = component.len() == 1 && g.contains_edge(component[0], component[0]);
            if component.len() > 1 || self_loop {
                let mut members = component;
                members.sort();
                let names: Vec<String> = members.iter().map(|m| m.to_string()).collect();
                return Err(PipelineError::Graph(format!(
                    "dependency cycle through {}",
                    names.join(" → ")
                )));
            }
        }

        let mut in_degree: BTreeMap<ModuleIndex, usize> = g
            .nodes()
            .map(|n| (n, g.neighbors_directed(n, Direction::Incoming).count()))
            .collect();
        let mut ready: BTreeSet<ModuleIndex> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(n, _)| *n)
            .collect();

        let mut order = Vec::with_capacity(in_degree.len());
        while let Some(n) = ready.pop_first() {
            order.push(n);
            for next in g.neighbors_directed(n, Direction::Outgoing) {
                if let Some(d) = in_degree.get_mut(&next) {
                    *d -= 1;
                    if *d == 0 {
                        ready.insert(next);
                    }
                }
            }
        }
        Ok(order)
    }

    /// Number of pipeline outputs.
    ///
    /// Each global slot must be bound exactly once and the slots must cover
    /// `0..n` without gaps.
    pub fn global_output_count(&self) -> Result<usize> {
        let mut owners: BTreeMap<u32, ModuleIndex> = BTreeMap::new();
        for (&mod_idx, p) in &self.producers {
            for slot in p.outputs.global_outputs() {
                if let Some(prev) = owners.insert(slot, mod_idx) {
                    return Err(PipelineError::Graph(format!(
                        "global output {slot} bound by both {prev} and {mod_idx}"
                    )));
                }
            }
        }
        if owners.is_empty() {
            return Err(PipelineError::Graph("pipeline declares no global outputs".into()));
        }
        for (expected, slot) in owners.keys().enumerate() {
            if *slot as usize != expected {
                return Err(PipelineError::Graph(format!(
                    "global output {expected} is unreachable (no producer binds it)"
                )));
            }
        }
        Ok(owners.len())
    }

    /// For every routed module input, the producer output feeding it.
    ///
    /// An input slot may be fed by at most one producer binding.
    pub fn input_sources(&self) -> Result<BTreeMap<(ModuleIndex, u32), InputSource>> {
        let mut sources = BTreeMap::new();
        for (&producer, p) in &self.producers {
            for (output_idx, targets) in p.outputs.iter() {
                for target in targets {
                    if let BindingTarget::Module { mod_idx, input_idx } = *target {
                        if let Some((prev, prev_out)) =
                            sources.insert((mod_idx, input_idx), (producer, output_idx))
                        {
                            return Err(PipelineError::Graph(format!(
                                "{target} fed by both {prev}:out{prev_out} and {producer}:out{output_idx}"
                            )));
                        }
                    }
                }
            }
        }
        Ok(sources)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
