//! Module registry: `mod_idx` → load descriptor.
//!
//! Built once from the `load_config` section and never mutated.

use std::collections::BTreeMap;

use tandem_types::{ModuleIndex, ModuleLoadInfo};

use crate::document::{module_index, LoadEntry};
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    entries: BTreeMap<ModuleIndex, ModuleLoadInfo>,
}

impl ModuleRegistry {
    /// Build from registry entries. Array order carries no meaning.
    ///
    /// Rejects negative or missing indices, duplicate indices, and empty
    /// artifact names.
    pub fn from_entries(entries: &[LoadEntry]) -> Result<Self> {
        let mut registry = Self::default();
        for entry in entries {
            let mod_idx = module_index(entry.mod_idx)?;
            for (field, value) in [
                ("lib_name", &entry.lib_name),
                ("json_name", &entry.json_name),
                ("params_name", &entry.params_name),
            ] {
                if value.is_empty() {
                    return Err(PipelineError::Config(format!("{field} is empty for {mod_idx}")));
                }
            }
            let info = ModuleLoadInfo::new(
                entry.lib_name.clone(),
                entry.json_name.clone(),
                entry.params_name.clone(),
                entry.dev.clone(),
            );
            registry.insert(mod_idx, info)?;
        }
        Ok(registry)
    }

    fn insert(&mut self, mod_idx: ModuleIndex, info: ModuleLoadInfo) -> Result<()> {
        if self.entries.contains_key(&mod_idx) {
            return Err(PipelineError::Config(format!(
                "duplicate registry entry for {mod_idx}"
            )));
        }
        self.entries.insert(mod_idx, info);
        Ok(())
    }

    pub fn get(&self, mod_idx: ModuleIndex) -> Result<&ModuleLoadInfo> {
        self.entries
            .get(&mod_idx)
            .ok_or_else(|| PipelineError::Lookup(format!("{mod_idx} has no registry entry")))
    }

    pub fn contains(&self, mod_idx: ModuleIndex) -> bool {
        self.entries.contains_key(&mod_idx)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in ascending `mod_idx` order.
    pub fn iter(&self) -> impl Iterator<Item = (ModuleIndex, &ModuleLoadInfo)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn entry(mod_idx: i64, dev: &str) -> LoadEntry {
        LoadEntry {
            mod_idx: Some(mod_idx),
            lib_name: format!("m{mod_idx}.so"),
            json_name: format!("m{mod_idx}.json"),
            params_name: format!("m{mod_idx}.params"),
            dev: dev.into(),
        }
    }

    #[test]
    fn builds_in_index_order() {
        let reg = ModuleRegistry::from_entries(&[entry(1, "cuda0"), entry(0, "cpu0")]).unwrap();
        assert_eq!(reg.len(), 2);
        let order: Vec<ModuleIndex> = reg.iter().map(|(i, _)| i).collect();
        assert_eq!(order, vec![ModuleIndex(0), ModuleIndex(1)]);
        assert_eq!(reg.get(ModuleIndex(1)).unwrap().device, "cuda0");
    }

    #[test]
    fn empty_names_rejected() {
        for field in ["lib", "json", "params"] {
            let mut e = entry(0, "cpu0");
            match field {
                "lib" => e.lib_name.clear(),
                "json" => e.json_name.clear(),
                _ => e.params_name.clear(),
            }
            let err = ModuleRegistry::from_entries(&[e]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Config);
            assert!(err.to_string().contains(field));
        }
    }

    #[test]
    fn negative_and_missing_index_rejected() {
        assert!(ModuleRegistry::from_entries(&[entry(-2, "cpu0")]).is_err());

        let mut e = entry(0, "cpu0");
        e.mod_idx = None;
        let err = ModuleRegistry::from_entries(&[e]).unwrap_err();
        assert!(err.to_string().contains("missing mod_idx"));
    }

    #[test]
    fn duplicate_index_rejected() {
        let err = ModuleRegistry::from_entries(&[entry(0, "cpu0"), entry(0, "cpu1")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn unknown_index_is_lookup_error() {
        let reg = ModuleRegistry::from_entries(&[entry(0, "cpu0")]).unwrap();
        assert_eq!(reg.get(ModuleIndex(5)).unwrap_err().kind(), ErrorKind::Lookup);
    }
}
