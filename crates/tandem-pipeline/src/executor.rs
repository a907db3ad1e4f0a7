//! The executor facade: configure once, then run.
//!
//! Initialization is all-or-nothing. The configuration text is fully
//! validated before any module is loaded, and a failure after loading drops
//! every instance before the error is returned.

use std::sync::Arc;

use tracing::info;

use tandem_types::config::ExecutorConfig;

use crate::error::Result;
use crate::layout::PipelineLayout;
use crate::module::{BoxedModule, ModuleLoader, PreloadedModules};
use crate::plan::PipelinePlan;
use crate::pool::ModuleInstancePool;
use crate::run::{PipelineOutputs, RunInputs};
use crate::runtime::PipelineRuntime;
use crate::scheduler::PipelineScheduler;

pub struct PipelineExecutor {
    layout: Arc<PipelineLayout>,
    pool: Arc<ModuleInstancePool>,
    scheduler: PipelineScheduler,
    config: ExecutorConfig,
}

impl PipelineExecutor {
    /// Configure over modules the caller already built; `modules[i]` serves
    /// `mod_idx = i`.
    pub fn initialize(modules: Vec<BoxedModule>, text: &str) -> Result<Self> {
        Self::initialize_with_loader(
            &PreloadedModules::new(modules),
            text,
            ExecutorConfig::default(),
        )
    }

    /// Configure, obtaining each module from `loader`.
    pub fn initialize_with_loader<L>(loader: &L, text: &str, config: ExecutorConfig) -> Result<Self>
    where
        L: ModuleLoader + ?Sized,
    {
        let plan = PipelinePlan::parse(text)?;
        Self::from_plan(plan, loader, config)
    }

    /// Instantiate an already validated plan.
    pub fn from_plan<L>(plan: PipelinePlan, loader: &L, config: ExecutorConfig) -> Result<Self>
    where
        L: ModuleLoader + ?Sized,
    {
        let pool = ModuleInstancePool::instantiate(plan.registry(), loader)?;
        let layout = Arc::new(PipelineLayout::new(plan, &pool)?);
        let pool = Arc::new(pool);
        let scheduler = PipelineScheduler::new(Arc::clone(&layout), Arc::clone(&pool));

        info!(
            modules = pool.len(),
            entry_slots = layout.num_inputs(),
            outputs = layout.num_outputs(),
            "pipeline executor ready"
        );

        Ok(Self {
            layout,
            pool,
            scheduler,
            config,
        })
    }

    /// Number of global output slots every run fills.
    pub fn num_outputs(&self) -> usize {
        self.layout.num_outputs()
    }

    /// Number of entry slots every run must supply.
    pub fn num_inputs(&self) -> usize {
        self.layout.num_inputs()
    }

    pub fn plan(&self) -> &PipelinePlan {
        self.layout.plan()
    }

    pub fn layout(&self) -> &PipelineLayout {
        &self.layout
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute one run on the calling thread.
    pub fn run(&self, inputs: RunInputs) -> Result<PipelineOutputs> {
        self.scheduler.run(inputs)
    }

    /// Spawn the pipelined runtime on the current tokio runtime. The runtime
    /// shares module instances with this executor.
    pub fn start(&self) -> Result<PipelineRuntime> {
        PipelineRuntime::start(Arc::clone(&self.layout), &self.pool, self.config.clone())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
