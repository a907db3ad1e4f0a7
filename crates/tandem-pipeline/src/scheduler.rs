//! Deterministic single-threaded scheduling.
//!
//! ```text
//! seed entry slots ──▶ ready set (ordered by mod_idx)
//!                         │ pop lowest
//!                         ▼
//!              Idle → InputsReady → Running → OutputsReady → Drained
//!                                                 │ route
//!                     ┌───────────────────────────┴──────────┐
//!                     ▼                                      ▼
//!          downstream input slot                    global output slot
//! ```
//!
//! When several modules are ready at once the lowest index runs first, so a
//! given configuration always executes in the same order.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::debug;

use tandem_types::ModuleIndex;

use crate::error::{PipelineError, Result};
use crate::layout::{Delivery, PipelineLayout};
use crate::pool::ModuleInstancePool;
use crate::run::{InputTable, OutputCollector, PipelineOutputs, RunInputs};
use crate::stage::{StageState, StageTracker};

#[derive(Debug, Clone)]
pub struct PipelineScheduler {
    layout: Arc<PipelineLayout>,
    pool: Arc<ModuleInstancePool>,
}

impl PipelineScheduler {
    pub fn new(layout: Arc<PipelineLayout>, pool: Arc<ModuleInstancePool>) -> Self {
        Self { layout, pool }
    }

    /// Execute one run to completion.
    ///
    /// A module failure aborts this run only; registry, graph and pool are
    /// left untouched.
    pub fn run(&self, inputs: RunInputs) -> Result<PipelineOutputs> {
        let seeded = self.layout.resolve_inputs(inputs)?;

        let mut pending = InputTable::default();
        let mut outputs = OutputCollector::new(self.layout.num_outputs());
        let mut stages: BTreeMap<ModuleIndex, StageTracker> = BTreeMap::new();
        let mut ready: BTreeSet<ModuleIndex> = BTreeSet::new();

        for ((mod_idx, input_idx), tensor) in seeded {
            let shape = self.layout.stage(mod_idx)?;
            if pending.deliver(mod_idx, shape.num_inputs, input_idx, tensor)? {
                ready.insert(mod_idx);
            }
        }
        ready.extend(self.layout.sources());

        while let Some(mod_idx) = ready.pop_first() {
            let tracker = stages
                .entry(mod_idx)
                .or_insert_with(|| StageTracker::new(mod_idx));
            tracker.advance(StageState::InputsReady)?;

            let inputs = pending.take(mod_idx).map(|p| p.take()).unwrap_or_default();
            let instance = self.pool.instance_for(mod_idx)?;

            tracker.advance(StageState::Running)?;
            let produced = instance.invoke(&inputs)?;
            tracker.advance(StageState::OutputsReady)?;

            for delivery in self.layout.route(mod_idx, produced)? {
                match delivery {
                    Delivery::Input { mod_idx: to, input_idx, tensor } => {
                        let shape = self.layout.stage(to)?;
                        if pending.deliver(to, shape.num_inputs, input_idx, tensor)? {
                            ready.insert(to);
                        }
                    }
                    Delivery::Output { slot, tensor } => outputs.fill(slot, tensor)?,
                }
            }
            tracker.advance(StageState::Drained)?;
            debug!(%mod_idx, ready = ready.len(), "module drained");
        }

        if !outputs.is_complete() {
            return Err(PipelineError::IncompleteRun {
                missing: outputs.missing(),
            });
        }
        outputs.finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
