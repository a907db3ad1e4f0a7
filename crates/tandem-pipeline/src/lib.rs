//! `tandem-pipeline` — pipeline-parallel execution of interconnected modules.
//!
//! A pipeline is a set of independently loaded compute modules wired
//! together by a JSON configuration: each output slot of a module feeds input
//! slots of downstream modules or a global output slot of the pipeline. This
//! crate validates that wiring, instantiates the modules, and drives data
//! through them, one run at a time or many runs overlapped.
//!
//! # Architecture
//!
//! ```text
//! config text ──▶ PipelineDocument ──▶ PipelinePlan ──▶ ModuleInstancePool
//!                   (schema)          registry, graph,      (one instance
//!                                     topological order      per module)
//!                                            │
//!                                            ▼
//!                                     PipelineLayout
//!                                            │
//!                         ┌──────────────────┴──────────────────┐
//!                         ▼                                     ▼
//!                 PipelineScheduler                     PipelineRuntime
//!             (one run, deterministic)         (worker per module, runs overlap)
//! ```

pub mod document;
pub mod error;
pub mod executor;
pub mod graph;
pub mod layout;
pub mod module;
pub mod plan;
pub mod pool;
pub mod registry;
pub mod run;
pub mod runtime;
pub mod scheduler;
pub mod stage;

#[cfg(test)]
pub(crate) mod testing;

// ── Public re-exports ────────────────────────────────────────────────────────

pub use document::PipelineDocument;
pub use error::{ErrorKind, PipelineError, Result};
pub use executor::PipelineExecutor;
pub use graph::DependencyGraph;
pub use layout::{PipelineLayout, StageShape};
pub use module::{BoxedModule, ComputeModule, ModuleLoader, PreloadedModules};
pub use plan::PipelinePlan;
pub use pool::{ModuleInstance, ModuleInstancePool};
pub use registry::ModuleRegistry;
pub use run::{PipelineOutputs, RunId, RunInputs};
pub use runtime::{PipelineRuntime, RunCanceller, RunHandle, RuntimeStats};
pub use scheduler::PipelineScheduler;
pub use stage::{StageState, StageTracker};
