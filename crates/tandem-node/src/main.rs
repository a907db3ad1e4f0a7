//! `tandem` — inspect and exercise pipeline configurations.
//!
//! ```bash
//! # Parse and validate, optionally checking artifacts on disk
//! tandem validate pipeline.json --store ./artifacts
//!
//! # Print the execution order and wiring
//! tandem plan pipeline.json
//!
//! # Compare sequential and pipelined wall time with stand-in modules
//! RUST_LOG=warn tandem simulate pipeline.json --runs 32 --latency-ms 5
//! ```

mod synthetic;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tandem_pipeline::{PipelineExecutor, PipelinePlan, RunInputs};
use tandem_store::ArtifactStore;
use tandem_types::config::{ExecutorConfig, StoreConfig};
use tandem_types::Tensor;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name    = "tandem",
    version = env!("CARGO_PKG_VERSION"),
    about   = "Pipeline-parallel module executor"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse and validate a configuration file.
    Validate {
        config: PathBuf,

        /// Also resolve every module's artifacts under this directory.
        #[arg(long, env = "TANDEM_STORE")]
        store: Option<PathBuf>,

        /// Skip checking artifacts against `digests.json`.
        #[arg(long)]
        no_verify: bool,
    },

    /// Print the topological order, bindings, and global slots.
    Plan { config: PathBuf },

    /// Run stand-in modules sequentially, then pipelined, and compare.
    Simulate {
        config: PathBuf,

        #[arg(long, default_value_t = 16)]
        runs: usize,

        /// Time each stand-in module spends per call.
        #[arg(long, default_value_t = 10)]
        latency_ms: u64,

        /// Inbox capacity of each module worker.
        #[arg(long, default_value_t = ExecutorConfig::default().queue_depth)]
        queue_depth: usize,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    // Default log level: INFO. Override with RUST_LOG=tandem_pipeline=debug etc.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { config, store, no_verify } => validate(&config, store, !no_verify),
        Command::Plan { config }                       => print_plan(&config),
        Command::Simulate { config, runs, latency_ms, queue_depth } => {
            let executor = ExecutorConfig { queue_depth, ..ExecutorConfig::default() };
            simulate(&config, runs, Duration::from_millis(latency_ms), executor).await
        }
    }
}

fn load_plan(path: &Path) -> Result<(String, PipelinePlan)> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let plan = PipelinePlan::parse(&text)
        .with_context(|| format!("validating {}", path.display()))?;
    Ok((text, plan))
}

// ── Validate ──────────────────────────────────────────────────────────────────

fn validate(path: &Path, store: Option<PathBuf>, verify_digests: bool) -> Result<()> {
    let (_, plan) = load_plan(path)?;
    println!(
        "{}: {} modules, {} global outputs",
        path.display(),
        plan.registry().len(),
        plan.num_outputs()
    );

    let Some(root) = store else {
        return Ok(());
    };
    let store = ArtifactStore::new(StoreConfig { root, verify_digests })?;
    for (mod_idx, load_info) in plan.registry().iter() {
        let bundle = store
            .resolve(load_info)
            .with_context(|| format!("resolving artifacts for {mod_idx}"))?;
        println!(
            "  {mod_idx:<6} {:<24} params {} bytes  blake3 {}",
            load_info.artifact_name,
            bundle.params().len(),
            bundle.params_digest()
        );
    }
    info!(modules = plan.registry().len(), "artifacts resolved");
    Ok(())
}

// ── Plan ──────────────────────────────────────────────────────────────────────

fn print_plan(path: &Path) -> Result<()> {
    let (_, plan) = load_plan(path)?;

    println!("order:   {}", join(plan.order()));
    println!("outputs: {}", plan.num_outputs());
    for mod_idx in plan.order() {
        let device = &plan.registry().get(*mod_idx)?.device;
        println!("{mod_idx} @ {device}");
        if let Some(outputs) = plan.graph().output_map(*mod_idx) {
            for (output_idx, targets) in outputs.iter() {
                println!("  out{output_idx} → {}", join(targets));
            }
        }
    }
    for (name, (mod_idx, input_idx)) in plan.named_inputs() {
        println!("input {name:?} → {mod_idx}:in{input_idx}");
    }
    Ok(())
}

fn join<T: std::fmt::Display>(items: &[T]) -> String {
    items.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(", ")
}

// ── Simulate ──────────────────────────────────────────────────────────────────

async fn simulate(path: &Path, runs: usize, latency: Duration, config: ExecutorConfig) -> Result<()> {
    let (text, plan) = load_plan(path)?;
    let loader = synthetic::SyntheticLoader::new(&plan, latency);
    let executor = PipelineExecutor::initialize_with_loader(&loader, &text, config)?;

    let entry_slots: Vec<_> = executor.layout().entry_slots().iter().copied().collect();
    let inputs = |run: usize| {
        entry_slots.iter().fold(RunInputs::new(), |acc, (mod_idx, input_idx)| {
            acc.bind(*mod_idx, *input_idx, Tensor::vector(&[run as f32]))
        })
    };

    let started = Instant::now();
    for run in 0..runs {
        executor.run(inputs(run))?;
    }
    let sequential = started.elapsed();

    let runtime = executor.start()?;
    let started = Instant::now();
    let mut handles = Vec::with_capacity(runs);
    for run in 0..runs {
        handles.push(runtime.submit(inputs(run)).await?);
    }
    for handle in handles {
        handle.wait().await?;
    }
    let pipelined = started.elapsed();
    let stats = runtime.stats();
    runtime.shutdown().await;

    println!("runs:       {runs}");
    println!("sequential: {sequential:?}");
    println!("pipelined:  {pipelined:?}");
    println!(
        "speedup:    {:.2}x",
        sequential.as_secs_f64() / pipelined.as_secs_f64().max(f64::EPSILON)
    );
    info!(?stats, "simulation complete");
    Ok(())
}
