//! [`ModuleLoader`] backed by an [`ArtifactStore`].

use anyhow::Context;
use tracing::info;

use tandem_pipeline::{BoxedModule, ModuleLoader};
use tandem_types::{ModuleIndex, ModuleLoadInfo};

use crate::store::{ArtifactBundle, ArtifactStore};

/// Resolves each module's artifacts in the store and hands the bundle to a
/// factory that builds the instance.
pub struct StoreLoader<F> {
    store: ArtifactStore,
    factory: F,
}

impl<F> StoreLoader<F>
where
    F: Fn(ModuleIndex, &ArtifactBundle) -> anyhow::Result<BoxedModule>,
{
    pub fn new(store: ArtifactStore, factory: F) -> Self {
        Self { store, factory }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }
}

impl<F> ModuleLoader for StoreLoader<F>
where
    F: Fn(ModuleIndex, &ArtifactBundle) -> anyhow::Result<BoxedModule>,
{
    fn load(&self, mod_idx: ModuleIndex, load_info: &ModuleLoadInfo) -> anyhow::Result<BoxedModule> {
        let bundle = self
            .store
            .resolve(load_info)
            .with_context(|| format!("resolving artifacts for {mod_idx}"))?;

        info!(
            %mod_idx,
            library = %bundle.library().display(),
            params_digest = %&bundle.params_digest()[..16],
            "artifacts resolved"
        );

        (self.factory)(mod_idx, &bundle)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::*;
    use tandem_pipeline::{ComputeModule, ErrorKind, PipelineExecutor, RunInputs};
    use tandem_types::config::{ExecutorConfig, StoreConfig};
    use tandem_types::Tensor;

    /// Multiplies by the `scale` read from the structure file.
    struct Scale(f32);

    impl ComputeModule for Scale {
        fn num_inputs(&self) -> usize {
            1
        }

        fn num_outputs(&self) -> usize {
            1
        }

        fn run(&mut self, inputs: &[Tensor]) -> anyhow::Result<Vec<Tensor>> {
            let x: Vec<f32> = inputs[0].to_f32()?.iter().map(|v| v * self.0).collect();
            Ok(vec![Tensor::vector(&x)])
        }
    }

    fn factory(_: ModuleIndex, bundle: &ArtifactBundle) -> anyhow::Result<BoxedModule> {
        let scale = bundle.structure()["scale"]
            .as_f64()
            .context("structure lacks a numeric scale")?;
        Ok(Box::new(Scale(scale as f32)))
    }

    fn populate(root: &Path, scales: &[f64]) {
        for (i, scale) in scales.iter().enumerate() {
            fs::write(root.join(format!("m{i}.so")), b"lib").unwrap();
            fs::write(root.join(format!("m{i}.json")), format!(r#"{{"scale": {scale}}}"#)).unwrap();
            fs::write(root.join(format!("m{i}.params")), [i as u8; 64]).unwrap();
        }
    }

    const CHAIN: &str = r#"{
        "load_config": [
            {"mod_idx": 0, "lib_name": "m0.so", "json_name": "m0.json", "params_name": "m0.params", "dev": "cpu0"},
            {"mod_idx": 1, "lib_name": "m1.so", "json_name": "m1.json", "params_name": "m1.params", "dev": "cpu0"}
        ],
        "module_connection": [
            {"mod_idx": 0, "dev": "cpu0", "output": [{"output_idx": 0, "dependencies": [{"mod_idx": 1, "input_idx": 0}]}]},
            {"mod_idx": 1, "dev": "cpu0", "output": [{"output_idx": 0, "dependencies": [{"global_output_index": 0}]}]}
        ]
    }"#;

    #[test]
    fn executor_built_from_store() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path(), &[2.0, 5.0]);
        let store = ArtifactStore::new(StoreConfig::at(dir.path())).unwrap();
        let loader = StoreLoader::new(store, factory);

        let exec = PipelineExecutor::initialize_with_loader(&loader, CHAIN, ExecutorConfig::default()).unwrap();
        let out = exec
            .run(RunInputs::new().bind(0, 0, Tensor::vector(&[1.0, 3.0])))
            .unwrap();
        assert_eq!(out.get(0).unwrap().to_f32().unwrap(), vec![10.0, 30.0]);
    }

    #[test]
    fn missing_artifact_fails_initialization() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path(), &[2.0]);
        let store = ArtifactStore::new(StoreConfig::at(dir.path())).unwrap();
        let loader = StoreLoader::new(store, factory);

        let err = PipelineExecutor::initialize_with_loader(&loader, CHAIN, ExecutorConfig::default())
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Lookup);
        assert!(err.to_string().contains("m1.so"));
    }
}
