//! Live module instances, one per registry entry.
//!
//! The pool is built in full or not at all: if any module fails to load,
//! everything loaded so far is dropped before the error is returned.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};

use tandem_types::{ModuleIndex, Tensor};

use crate::error::{PipelineError, Result};
use crate::module::{BoxedModule, ModuleLoader};
use crate::registry::ModuleRegistry;

// ── Instance ─────────────────────────────────────────────────────────────────

/// A runnable module bound to its device.
///
/// The inner lock gives mutual exclusion per instance: a module processes
/// one run at a time, while different instances run in parallel.
pub struct ModuleInstance {
    mod_idx: ModuleIndex,
    device: String,
    num_inputs: usize,
    num_outputs: usize,
    module: Mutex<BoxedModule>,
}

impl ModuleInstance {
    pub fn new(mod_idx: ModuleIndex, device: String, module: BoxedModule) -> Self {
        Self {
            mod_idx,
            device,
            num_inputs: module.num_inputs(),
            num_outputs: module.num_outputs(),
            module: Mutex::new(module),
        }
    }

    pub fn mod_idx(&self) -> ModuleIndex {
        self.mod_idx
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    pub fn num_outputs(&self) -> usize {
        self.num_outputs
    }

    /// Run the module once. Blocks while another run holds the instance.
    ///
    /// A panicking module fails this call only; the instance stays usable.
    pub fn invoke(&self, inputs: &[Tensor]) -> Result<Vec<Tensor>> {
        let mut module = self.module.lock().unwrap_or_else(PoisonError::into_inner);
        let outputs = match panic::catch_unwind(AssertUnwindSafe(|| module.run(inputs))) {
            Ok(Ok(outputs)) => outputs,
            Ok(Err(e)) => {
                return Err(PipelineError::Runtime {
                    mod_idx: self.mod_idx,
                    message: format!("{e:#}"),
                })
            }
            Err(payload) => {
                warn!(mod_idx = %self.mod_idx, "module panicked");
                return Err(PipelineError::Runtime {
                    mod_idx: self.mod_idx,
                    message: format!("panicked: {}", panic_message(payload.as_ref())),
                });
            }
        };
        if outputs.len() != self.num_outputs {
            return Err(PipelineError::Runtime {
                mod_idx: self.mod_idx,
                message: format!(
                    "produced {} outputs, declared {}",
                    outputs.len(),
                    self.num_outputs
                ),
            });
        }
        Ok(outputs)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string payload")
}

impl std::fmt::Debug for ModuleInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleInstance")
            .field("mod_idx", &self.mod_idx)
            .field("device", &self.device)
            .field("num_inputs", &self.num_inputs)
            .field("num_outputs", &self.num_outputs)
            .finish()
    }
}

// ── Pool ─────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ModuleInstancePool {
    instances: BTreeMap<ModuleIndex, Arc<ModuleInstance>>,
}

impl ModuleInstancePool {
    /// Load every registry entry, in ascending `mod_idx` order.
    pub fn instantiate<L>(registry: &ModuleRegistry, loader: &L) -> Result<Self>
    where
        L: ModuleLoader + ?Sized,
    {
        let mut instances = BTreeMap::new();
        for (mod_idx, load_info) in registry.iter() {
            let module = match loader.load(mod_idx, load_info) {
                Ok(m) => m,
                Err(e) => {
                    warn!(
                        %mod_idx,
                        loaded = instances.len(),
                        "module load failed, tearing down pool"
                    );
                    return Err(PipelineError::Load {
                        mod_idx,
                        reason: format!("{e:#}"),
                    });
                }
            };
            let instance = ModuleInstance::new(mod_idx, load_info.device.clone(), module);
            info!(
                %mod_idx,
                device = %instance.device(),
                inputs = instance.num_inputs(),
                outputs = instance.num_outputs(),
                "module loaded"
            );
            instances.insert(mod_idx, Arc::new(instance));
        }
        Ok(Self { instances })
    }

    /// Build a pool directly from instances.
    pub fn from_instances(instances: impl IntoIterator<Item = ModuleInstance>) -> Self {
        Self {
            instances: instances
                .into_iter()
                .map(|i| (i.mod_idx(), Arc::new(i)))
                .collect(),
        }
    }

    pub fn instance_for(&self, mod_idx: ModuleIndex) -> Result<&Arc<ModuleInstance>> {
        self.instances
            .get(&mod_idx)
            .ok_or_else(|| PipelineError::Lookup(format!("no instance for {mod_idx}")))
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModuleIndex, &Arc<ModuleInstance>)> {
        self.instances.iter().map(|(k, v)| (*k, v))
    }
}

impl Drop for ModuleInstancePool {
    fn drop(&mut self) {
        if !self.instances.is_empty() {
            info!(modules = self.instances.len(), "module pool torn down");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
