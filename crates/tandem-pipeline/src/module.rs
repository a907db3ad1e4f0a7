//! Seams to the external collaborators: the compute module that runs one
//! compiled graph, and the loader that produces it from load descriptors.

use std::sync::Mutex;

use tandem_types::{ModuleIndex, ModuleLoadInfo, Tensor};

/// One independently compiled, runnable computation unit.
///
/// The scheduler calls [`ComputeModule::run`] at most once at a time per
/// instance and treats the call as atomic.
pub trait ComputeModule: Send {
    /// Number of input slots the module expects per run.
    fn num_inputs(&self) -> usize;

    /// Number of outputs produced per run.
    fn num_outputs(&self) -> usize;

    /// Run once. `inputs` is ordered by input slot and has exactly
    /// [`num_inputs`](Self::num_inputs) entries.
    fn run(&mut self, inputs: &[Tensor]) -> anyhow::Result<Vec<Tensor>>;
}

/// Owned module handle as stored by the instance pool.
pub type BoxedModule = Box<dyn ComputeModule>;

/// Turns a registry entry into a live module.
pub trait ModuleLoader {
    fn load(&self, mod_idx: ModuleIndex, info: &ModuleLoadInfo) -> anyhow::Result<BoxedModule>;
}

impl<F> ModuleLoader for F
where
    F: Fn(ModuleIndex, &ModuleLoadInfo) -> anyhow::Result<BoxedModule>,
{
    fn load(&self, mod_idx: ModuleIndex, info: &ModuleLoadInfo) -> anyhow::Result<BoxedModule> {
        self(mod_idx, info)
    }
}

// ── Preloaded modules ────────────────────────────────────────────────────────

/// Loader over modules the caller already built. Entry `i` of the list is
/// handed out for `mod_idx = i`, once.
pub struct PreloadedModules {
    slots: Mutex<Vec<Option<BoxedModule>>>,
}

impl PreloadedModules {
    pub fn new(modules: Vec<BoxedModule>) -> Self {
        Self {
            slots: Mutex::new(modules.into_iter().map(Some).collect()),
        }
    }

    /// Modules not yet handed out.
    pub fn remaining(&self) -> usize {
        self.slots
            .lock()
            .map(|s| s.iter().filter(|m| m.is_some()).count())
            .unwrap_or(0)
    }
}

impl ModuleLoader for PreloadedModules {
    fn load(&self, mod_idx: ModuleIndex, _info: &ModuleLoadInfo) -> anyhow::Result<BoxedModule> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| anyhow::anyhow!("preloaded module list poisoned"))?;
        let len = slots.len();
        let slot = slots.get_mut(mod_idx.as_usize()).ok_or_else(|| {
            anyhow::anyhow!("no module supplied for {mod_idx} ({len} modules given)")
        })?;
        slot.take()
            .ok_or_else(|| anyhow::anyhow!("module for {mod_idx} was already taken"))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
