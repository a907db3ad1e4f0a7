//! Stand-in modules for dry runs: arities inferred from a plan, a fixed
//! latency, and pass-through data.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::anyhow;
use tandem_pipeline::{BoxedModule, ComputeModule, ModuleLoader, PipelinePlan};
use tandem_types::{ModuleIndex, ModuleLoadInfo, Tensor};

/// Pass-through module that sleeps for `latency` on every call.
pub struct Synthetic {
    num_inputs: usize,
    num_outputs: usize,
    latency: Duration,
}

impl ComputeModule for Synthetic {
    fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    fn num_outputs(&self) -> usize {
        self.num_outputs
    }

    fn run(&mut self, inputs: &[Tensor]) -> anyhow::Result<Vec<Tensor>> {
        std::thread::sleep(self.latency);
        let x = inputs.first().cloned().unwrap_or_else(|| Tensor::vector(&[0.0]));
        Ok(vec![x; self.num_outputs])
    }
}

/// Smallest `(num_inputs, num_outputs)` per module that satisfies every
/// binding in the plan. A module nothing feeds gets one caller-supplied input.
pub fn infer_arities(plan: &PipelinePlan) -> BTreeMap<ModuleIndex, (usize, usize)> {
    let mut arities = BTreeMap::new();
    for (mod_idx, producer) in plan.graph().producers() {
        let outputs = producer.outputs.max_output_idx().map_or(1, |m| m as usize + 1);
        arities.insert(mod_idx, (0, outputs));
    }

    let fed = plan
        .input_sources()
        .keys()
        .chain(plan.named_inputs().values());
    for (mod_idx, input_idx) in fed {
        if let Some((inputs, _)) = arities.get_mut(mod_idx) {
            *inputs = (*inputs).max(*input_idx as usize + 1);
        }
    }

    for (inputs, _) in arities.values_mut() {
        if *inputs == 0 {
            *inputs = 1;
        }
    }
    arities
}

/// Builds one [`Synthetic`] per registry entry, looked up by `mod_idx`.
pub struct SyntheticLoader {
    arities: BTreeMap<ModuleIndex, (usize, usize)>,
    latency: Duration,
}

impl SyntheticLoader {
    pub fn new(plan: &PipelinePlan, latency: Duration) -> Self {
        Self {
            arities: infer_arities(plan),
            latency,
        }
    }
}

impl ModuleLoader for SyntheticLoader {
    fn load(&self, mod_idx: ModuleIndex, _info: &ModuleLoadInfo) -> anyhow::Result<BoxedModule> {
        let &(num_inputs, num_outputs) = self
            .arities
            .get(&mod_idx)
            .ok_or_else(|| anyhow!("no synthetic module for {mod_idx}"))?;
        Ok(Box::new(Synthetic {
            num_inputs,
            num_outputs,
            latency: self.latency,
        }))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_pipeline::{PipelineExecutor, RunInputs};
    use tandem_types::config::ExecutorConfig;

    fn executor(text: &str) -> PipelineExecutor {
        let plan = PipelinePlan::parse(text).unwrap();
        let loader = SyntheticLoader::new(&plan, Duration::ZERO);
        PipelineExecutor::initialize_with_loader(&loader, text, ExecutorConfig::default()).unwrap()
    }

    const JOIN: &str = r#"{
        "load_config": [
            {"mod_idx": 0, "lib_name": "a", "json_name": "a", "params_name": "a", "dev": "cpu"},
            {"mod_idx": 1, "lib_name": "b", "json_name": "b", "params_name": "b", "dev": "cpu"}
        ],
        "module_connection": [
            {"mod_idx": 0, "dev": "cpu", "output": [
                {"output_idx": 0, "dependencies": [{"mod_idx": 1, "input_idx": 1}]},
                {"output_idx": 2, "dependencies": [{"global_output_index": 1}]}
            ]},
            {"mod_idx": 1, "dev": "cpu", "output": [
                {"output_idx": 0, "dependencies": [{"global_output_index": 0}]}
            ]}
        ]
    }"#;

    #[test]
    fn arities_cover_every_binding() {
        let plan = PipelinePlan::parse(JOIN).unwrap();
        let arities = infer_arities(&plan);
        assert_eq!(arities[&ModuleIndex(0)], (1, 3));
        assert_eq!(arities[&ModuleIndex(1)], (2, 1));
    }

    #[test]
    fn synthetic_modules_satisfy_the_plan() {
        let exec = executor(JOIN);

        let entry: Vec<_> = exec.layout().entry_slots().iter().copied().collect();
        assert_eq!(entry, vec![(ModuleIndex(0), 0), (ModuleIndex(1), 0)]);

        let mut inputs = RunInputs::new();
        for (mod_idx, input_idx) in entry {
            inputs = inputs.bind(mod_idx, input_idx, Tensor::vector(&[4.0]));
        }
        let out = exec.run(inputs).unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn sparse_module_indices_load_by_index() {
        let text = r#"{
            "load_config": [
                {"mod_idx": 0, "lib_name": "a", "json_name": "a", "params_name": "a", "dev": "cpu"},
                {"mod_idx": 5, "lib_name": "b", "json_name": "b", "params_name": "b", "dev": "cpu"}
            ],
            "module_connection": [
                {"mod_idx": 0, "dev": "cpu", "output": [
                    {"output_idx": 0, "dependencies": [{"mod_idx": 5, "input_idx": 0}]}
                ]},
                {"mod_idx": 5, "dev": "cpu", "output": [
                    {"output_idx": 0, "dependencies": [{"global_output_index": 0}]}
                ]}
            ]
        }"#;
        let exec = executor(text);
        assert_eq!(exec.num_outputs(), 1);

        let out = exec
            .run(RunInputs::new().bind(ModuleIndex(0), 0, Tensor::vector(&[7.0])))
            .unwrap();
        assert_eq!(out.get(0).unwrap().to_f32().unwrap(), vec![7.0]);
    }

    #[test]
    fn unknown_index_fails_to_load() {
        let plan = PipelinePlan::parse(JOIN).unwrap();
        let loader = SyntheticLoader::new(&plan, Duration::ZERO);
        let info = ModuleLoadInfo {
            artifact_name: "x".into(),
            structure_name: "x".into(),
            parameter_name: "x".into(),
            device: "cpu".into(),
        };
        assert!(loader.load(ModuleIndex(9), &info).is_err());
    }
}
