//! Plan bound to live instances: per-module arities, entry slots, and the
//! routing used by both schedulers.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use tandem_types::{BindingTarget, ModuleIndex, Tensor};

use crate::error::{PipelineError, Result};
use crate::plan::{InputSlot, PipelinePlan};
use crate::pool::ModuleInstancePool;
use crate::run::RunInputs;

/// Input and output counts of one live module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageShape {
    pub num_inputs: usize,
    pub num_outputs: usize,
}

/// Where one produced tensor goes.
#[derive(Debug, Clone)]
pub(crate) enum Delivery {
    Input {
        mod_idx: ModuleIndex,
        input_idx: u32,
        tensor: Tensor,
    },
    Output {
        slot: u32,
        tensor: Tensor,
    },
}

#[derive(Debug)]
pub struct PipelineLayout {
    plan: PipelinePlan,
    stages: BTreeMap<ModuleIndex, StageShape>,
    entry_slots: BTreeSet<InputSlot>,
}

impl PipelineLayout {
    /// Check the plan against the arities the live modules report.
    pub fn new(plan: PipelinePlan, pool: &ModuleInstancePool) -> Result<Self> {
        let mut stages = BTreeMap::new();
        for (mod_idx, _) in plan.registry().iter() {
            let instance = pool.instance_for(mod_idx)?;
            stages.insert(
                mod_idx,
                StageShape {
                    num_inputs: instance.num_inputs(),
                    num_outputs: instance.num_outputs(),
                },
            );
        }

        for (mod_idx, producer) in plan.graph().producers() {
            let shape = stages[&mod_idx];
            if let Some(max) = producer.outputs.max_output_idx() {
                if max as usize >= shape.num_outputs {
                    return Err(PipelineError::Graph(format!(
                        "{mod_idx} binds output {max} but produces {} outputs",
                        shape.num_outputs
                    )));
                }
            }
        }

        for (mod_idx, input_idx) in plan.input_sources().keys() {
            let shape = stages[mod_idx];
            if *input_idx as usize >= shape.num_inputs {
                return Err(PipelineError::Graph(format!(
                    "{mod_idx}:in{input_idx} is bound but {mod_idx} takes {} inputs",
                    shape.num_inputs
                )));
            }
        }

        let entry_slots: BTreeSet<InputSlot> = stages
            .iter()
            .flat_map(|(m, s)| (0..s.num_inputs as u32).map(move |i| (*m, i)))
            .filter(|slot| !plan.is_routed(slot))
            .collect();

        if !plan.named_inputs().is_empty() {
            let named: BTreeSet<InputSlot> = plan.named_inputs().values().copied().collect();
            if let Some((m, i)) = named.difference(&entry_slots).next() {
                return Err(PipelineError::Graph(format!(
                    "named input targets {m}:in{i}, which the module does not take"
                )));
            }
            if let Some((m, i)) = entry_slots.difference(&named).next() {
                return Err(PipelineError::Graph(format!(
                    "{m}:in{i} is neither routed nor named in input_connection"
                )));
            }
        }

        Ok(Self {
            plan,
            stages,
            entry_slots,
        })
    }

    pub fn plan(&self) -> &PipelinePlan {
        &self.plan
    }

    pub fn num_outputs(&self) -> usize {
        self.plan.num_outputs()
    }

    /// Number of caller-supplied input slots per run.
    pub fn num_inputs(&self) -> usize {
        self.entry_slots.len()
    }

    pub fn entry_slots(&self) -> &BTreeSet<InputSlot> {
        &self.entry_slots
    }

    pub fn stage(&self, mod_idx: ModuleIndex) -> Result<StageShape> {
        self.stages
            .get(&mod_idx)
            .copied()
            .ok_or_else(|| PipelineError::Lookup(format!("{mod_idx} is not part of this pipeline")))
    }

    /// Modules that take no inputs and therefore start every run.
    pub fn sources(&self) -> Vec<ModuleIndex> {
        self.stages
            .iter()
            .filter(|(_, s)| s.num_inputs == 0)
            .map(|(m, _)| *m)
            .collect()
    }

    /// Validate caller inputs: every entry slot exactly once, nothing else.
    pub fn resolve_inputs(&self, inputs: RunInputs) -> Result<BTreeMap<InputSlot, Tensor>> {
        let mut resolved = BTreeMap::new();

        let named = inputs.named.into_iter().map(|(name, tensor)| {
            self.plan
                .named_inputs()
                .get(&name)
                .map(|slot| (*slot, tensor))
                .ok_or_else(|| PipelineError::Input(format!("unknown input name '{name}'")))
        });
        let bound = inputs
            .bound
            .into_iter()
            .map(|(m, i, t)| Ok::<_, PipelineError>(((m, i), t)));

        for item in bound.chain(named) {
            let (slot, tensor) = item?;
            if !self.entry_slots.contains(&slot) {
                let reason = if self.plan.is_routed(&slot) {
                    "is fed by another module"
                } else {
                    "does not exist"
                };
                return Err(PipelineError::Input(format!("{}:in{} {reason}", slot.0, slot.1)));
            }
            if resolved.insert(slot, tensor).is_some() {
                return Err(PipelineError::Input(format!(
                    "{}:in{} supplied more than once",
                    slot.0, slot.1
                )));
            }
        }

        let missing: Vec<String> = self
            .entry_slots
            .iter()
            .filter(|s| !resolved.contains_key(*s))
            .map(|(m, i)| format!("{m}:in{i}"))
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::Input(format!("missing inputs {}", missing.join(", "))));
        }
        Ok(resolved)
    }

    /// Fan a producer's outputs out to every bound target.
    pub(crate) fn route(&self, producer: ModuleIndex, outputs: Vec<Tensor>) -> Result<Vec<Delivery>> {
        let map = self
            .plan
            .graph()
            .output_map(producer)
            .ok_or_else(|| PipelineError::Lookup(format!("{producer} has no output bindings")))?;

        let mut deliveries = Vec::new();
        for (output_idx, tensor) in outputs.into_iter().enumerate() {
            let targets = map.targets(output_idx as u32);
            if targets.is_empty() {
                debug!(%producer, output_idx, "discarding unbound output");
                continue;
            }
            for target in targets {
                deliveries.push(match *target {
                    BindingTarget::Module { mod_idx, input_idx } => Delivery::Input {
                        mod_idx,
                        input_idx,
                        tensor: tensor.clone(),
                    },
                    BindingTarget::GlobalOutput { slot } => Delivery::Output {
                        slot,
                        tensor: tensor.clone(),
                    },
                });
            }
        }
        Ok(deliveries)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
