//! Fake modules and configuration builders shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tandem_types::{ModuleIndex, ModuleLoadInfo, Tensor};

use crate::module::{BoxedModule, ComputeModule, ModuleLoader};

// ── Modules ──────────────────────────────────────────────────────────────────

fn first(inputs: &[Tensor]) -> anyhow::Result<Vec<f32>> {
    let x = inputs
        .first()
        .ok_or_else(|| anyhow::anyhow!("no input"))?;
    Ok(x.to_f32()?)
}

/// One input, one output: `x * factor`.
pub struct Scale(pub f32);

impl ComputeModule for Scale {
    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn run(&mut self, inputs: &[Tensor]) -> anyhow::Result<Vec<Tensor>> {
        let scaled: Vec<f32> = first(inputs)?.iter().map(|v| v * self.0).collect();
        Ok(vec![Tensor::vector(&scaled)])
    }
}

/// Two inputs, one output: elementwise sum.
pub struct Add;

impl ComputeModule for Add {
    fn num_inputs(&self) -> usize {
        2
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn run(&mut self, inputs: &[Tensor]) -> anyhow::Result<Vec<Tensor>> {
        let a = inputs[0].to_f32()?;
        let b = inputs[1].to_f32()?;
        anyhow::ensure!(a.len() == b.len(), "length mismatch {} vs {}", a.len(), b.len());
        let sum: Vec<f32> = a.iter().zip(&b).map(|(x, y)| x + y).collect();
        Ok(vec![Tensor::vector(&sum)])
    }
}

/// One input, two outputs: `x` and `10x`.
pub struct Split;

impl ComputeModule for Split {
    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        2
    }

    fn run(&mut self, inputs: &[Tensor]) -> anyhow::Result<Vec<Tensor>> {
        let x = first(inputs)?;
        let tenfold: Vec<f32> = x.iter().map(|v| v * 10.0).collect();
        Ok(vec![Tensor::vector(&x), Tensor::vector(&tenfold)])
    }
}

/// Always fails.
pub struct Fail;

impl ComputeModule for Fail {
    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn run(&mut self, _inputs: &[Tensor]) -> anyhow::Result<Vec<Tensor>> {
        anyhow::bail!("kernel exploded")
    }
}

/// Pass-through that fails when the first element equals the sentinel.
pub struct FailOn(pub f32);

impl ComputeModule for FailOn {
    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn run(&mut self, inputs: &[Tensor]) -> anyhow::Result<Vec<Tensor>> {
        let x = first(inputs)?;
        anyhow::ensure!(x.first() != Some(&self.0), "poisoned input {}", self.0);
        Ok(vec![Tensor::vector(&x)])
    }
}

/// Pass-through that panics when the first element equals the sentinel.
pub struct PanicOn(pub f32);

impl ComputeModule for PanicOn {
    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn run(&mut self, inputs: &[Tensor]) -> anyhow::Result<Vec<Tensor>> {
        let x = first(inputs)?;
        if x.first() == Some(&self.0) {
            panic!("sentinel {}", self.0);
        }
        Ok(vec![Tensor::vector(&x)])
    }
}

/// Declares two outputs but produces one.
pub struct ShortOutput;

impl ComputeModule for ShortOutput {
    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        2
    }

    fn run(&mut self, inputs: &[Tensor]) -> anyhow::Result<Vec<Tensor>> {
        Ok(vec![Tensor::vector(&first(inputs)?)])
    }
}

/// Arbitrary arity; every output is a copy of the first input (or empty).
#[derive(Debug, Clone, Copy)]
pub struct Shape {
    inputs: usize,
    outputs: usize,
}

impl Shape {
    pub fn new(inputs: usize, outputs: usize) -> Self {
        Self { inputs, outputs }
    }
}

impl ComputeModule for Shape {
    fn num_inputs(&self) -> usize {
        self.inputs
    }

    fn num_outputs(&self) -> usize {
        self.outputs
    }

    fn run(&mut self, inputs: &[Tensor]) -> anyhow::Result<Vec<Tensor>> {
        let x = inputs.first().cloned().unwrap_or_else(|| Tensor::vector(&[]));
        Ok(vec![x; self.outputs])
    }
}

/// Pass-through that appends its id to a shared log on every call.
pub struct Recorder {
    id: u32,
    log: Arc<Mutex<Vec<u32>>>,
}

impl Recorder {
    pub fn log() -> Arc<Mutex<Vec<u32>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    pub fn new(id: u32, log: &Arc<Mutex<Vec<u32>>>) -> Self {
        Self {
            id,
            log: Arc::clone(log),
        }
    }
}

impl ComputeModule for Recorder {
    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn run(&mut self, inputs: &[Tensor]) -> anyhow::Result<Vec<Tensor>> {
        self.log.lock().unwrap().push(self.id);
        Ok(vec![inputs[0].clone()])
    }
}

/// Tracks how many callers are inside a section at once.
#[derive(Debug, Default)]
pub struct Concurrency {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Concurrency {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Slow pass-through that reports overlap, both pipeline-wide and for
/// itself alone.
pub struct Sleeper {
    delay: Duration,
    pipeline: Arc<Concurrency>,
    instance: Arc<Concurrency>,
}

impl Sleeper {
    pub fn new(delay: Duration, pipeline: &Arc<Concurrency>, instance: &Arc<Concurrency>) -> Self {
        Self {
            delay,
            pipeline: Arc::clone(pipeline),
            instance: Arc::clone(instance),
        }
    }

    /// Slow pass-through with no one watching.
    pub fn slow(delay: Duration) -> Self {
        Self::new(delay, &Concurrency::new(), &Concurrency::new())
    }
}

impl ComputeModule for Sleeper {
    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn run(&mut self, inputs: &[Tensor]) -> anyhow::Result<Vec<Tensor>> {
        self.pipeline.enter();
        self.instance.enter();
        std::thread::sleep(self.delay);
        self.instance.exit();
        self.pipeline.exit();
        Ok(vec![inputs[0].clone()])
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

/// Hands out copies of one [`Shape`] and counts loads and live instances.
pub struct CountingLoader {
    shape: Shape,
    fail_at: Option<ModuleIndex>,
    loads: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
}

impl CountingLoader {
    pub fn uniform(shape: Shape) -> Self {
        Self {
            shape,
            fail_at: None,
            loads: Arc::new(AtomicUsize::new(0)),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing_at(mut self, mod_idx: ModuleIndex) -> Self {
        self.fail_at = Some(mod_idx);
        self
    }

    /// Successful loads so far.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Instances not yet dropped.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl ModuleLoader for CountingLoader {
    fn load(&self, mod_idx: ModuleIndex, info: &ModuleLoadInfo) -> anyhow::Result<BoxedModule> {
        anyhow::ensure!(
            self.fail_at != Some(mod_idx),
            "cannot open {}",
            info.artifact_name
        );
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Counted {
            inner: self.shape,
            live: Arc::clone(&self.live),
        }))
    }
}

struct Counted {
    inner: Shape,
    live: Arc<AtomicUsize>,
}

impl ComputeModule for Counted {
    fn num_inputs(&self) -> usize {
        self.inner.num_inputs()
    }

    fn num_outputs(&self) -> usize {
        self.inner.num_outputs()
    }

    fn run(&mut self, inputs: &[Tensor]) -> anyhow::Result<Vec<Tensor>> {
        self.inner.run(inputs)
    }
}

impl Drop for Counted {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

// ── Configuration text ───────────────────────────────────────────────────────

/// Assemble a configuration document. `inputs` may be empty to omit
/// `input_connection`.
pub fn config(load: &[(i64, &str)], connections: &str, inputs: &str) -> String {
    let load: Vec<String> = load
        .iter()
        .map(|(i, dev)| {
            format!(
                r#"{{"mod_idx": {i}, "lib_name": "m{i}.so", "json_name": "m{i}.json", "params_name": "m{i}.params", "dev": "{dev}"}}"#
            )
        })
        .collect();
    let mut text = format!(
        r#"{{"load_config": [{}], "module_connection": {connections}"#,
        load.join(", ")
    );
    if !inputs.is_empty() {
        text.push_str(&format!(r#", "input_connection": {inputs}"#));
    }
    text.push('}');
    text
}

/// `module_connection` for mod0 → mod1 → … → global output 0.
pub fn chain_connections(n: i64) -> String {
    let entries: Vec<String> = (0..n)
        .map(|i| {
            let dep = if i + 1 == n {
                r#"{"global_output_index": 0}"#.to_string()
            } else {
                format!(r#"{{"mod_idx": {}, "input_idx": 0}}"#, i + 1)
            };
            format!(
                r#"{{"mod_idx": {i}, "dev": "cpu{i}", "output": [{{"output_idx": 0, "dependencies": [{dep}]}}]}}"#
            )
        })
        .collect();
    format!("[{}]", entries.join(", "))
}

/// Linear chain of `n` modules on devices `cpu0..cpu{n-1}`.
pub fn chain_config(n: i64) -> String {
    let devices: Vec<String> = (0..n).map(|i| format!("cpu{i}")).collect();
    let load: Vec<(i64, &str)> = devices
        .iter()
        .enumerate()
        .map(|(i, d)| (i as i64, d.as_str()))
        .collect();
    config(&load, &chain_connections(n), "")
}

/// mod0 splits into mod1 and mod2; mod1 feeds both global 0 and mod2,
/// mod2 joins into global 1.
pub fn diamond_config() -> String {
    config(
        &[(0, "cpu0"), (1, "cpu1"), (2, "cpu2")],
        r#"[
            {"mod_idx": 0, "dev": "cpu0", "output": [
                {"output_idx": 0, "dependencies": [{"mod_idx": 1, "input_idx": 0}]},
                {"output_idx": 1, "dependencies": [{"mod_idx": 2, "input_idx": 1}]}
            ]},
            {"mod_idx": 1, "dev": "cpu1", "output": [
                {"output_idx": 0, "dependencies": [{"global_output_index": 0}, {"mod_idx": 2, "input_idx": 0}]}
            ]},
            {"mod_idx": 2, "dev": "cpu2", "output": [
                {"output_idx": 0, "dependencies": [{"global_output_index": 1}]}
            ]}
        ]"#,
        "",
    )
}
