//! Filesystem artifact store.
//!
//! Layout: every artifact named in a module's load info is a file directly
//! under (or nested below) the store root, plus an optional
//! [`digests.json`](crate::manifest) manifest.
//!
//! ```text
//! <root>/
//! ├── digests.json      optional
//! ├── m0.so             library
//! ├── m0.json           structure description
//! └── m0.params         parameter blob (memory-mapped)
//! ```

use std::fs;
use std::path::{Component, Path, PathBuf};

use memmap2::Mmap;
use tracing::{debug, info};

use tandem_types::config::StoreConfig;
use tandem_types::ModuleLoadInfo;

use crate::error::{Result, StoreError};
use crate::manifest::DigestManifest;
use crate::mmap;
use crate::verify;

/// Everything a module factory needs to build one instance.
#[derive(Debug)]
pub struct ArtifactBundle {
    library: PathBuf,
    structure: serde_json::Value,
    structure_digest: String,
    params: Mmap,
    params_digest: String,
}

impl ArtifactBundle {
    /// Path of the compiled library; loading it is up to the factory.
    pub fn library(&self) -> &Path {
        &self.library
    }

    pub fn structure(&self) -> &serde_json::Value {
        &self.structure
    }

    pub fn structure_digest(&self) -> &str {
        &self.structure_digest
    }

    /// Parameter blob, memory-mapped.
    pub fn params(&self) -> &[u8] {
        &self.params
    }

    pub fn params_digest(&self) -> &str {
        &self.params_digest
    }
}

pub struct ArtifactStore {
    config: StoreConfig,
    manifest: Option<DigestManifest>,
}

impl ArtifactStore {
    /// Open the store at `config.root`, which must already exist.
    pub fn new(config: StoreConfig) -> Result<Self> {
        if !config.root.is_dir() {
            return Err(StoreError::NotFound(format!(
                "store root {}",
                config.root.display()
            )));
        }
        let manifest = if config.verify_digests {
            DigestManifest::load(&config.root)?
        } else {
            None
        };

        info!(
            root = %config.root.display(),
            verified = manifest.as_ref().map_or(0, DigestManifest::len),
            "artifact store opened"
        );

        Ok(Self { config, manifest })
    }

    /// Root directory of this store.
    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Path on disk for an artifact name. Names must stay inside the root.
    pub fn path(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        let contained = !name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !contained {
            return Err(StoreError::Other(format!(
                "artifact name {name:?} escapes the store root"
            )));
        }
        Ok(self.config.root.join(relative))
    }

    pub fn has(&self, name: &str) -> bool {
        self.path(name).map(|p| p.is_file()).unwrap_or(false)
    }

    fn existing(&self, name: &str) -> Result<PathBuf> {
        let path = self.path(name)?;
        if !path.is_file() {
            return Err(StoreError::NotFound(name.to_string()));
        }
        Ok(path)
    }

    fn check_digest(&self, name: &str, actual_hex: &str) -> Result<()> {
        match &self.manifest {
            Some(manifest) => manifest.check_digest(name, actual_hex),
            None => Ok(()),
        }
    }

    /// Locate and open the three artifacts of one module.
    pub fn resolve(&self, info: &ModuleLoadInfo) -> Result<ArtifactBundle> {
        let library = self.existing(&info.artifact_name)?;
        let structure_path = self.existing(&info.structure_name)?;
        let params_path = self.existing(&info.parameter_name)?;

        if let Some(manifest) = &self.manifest {
            if manifest.expected(&info.artifact_name).is_some() {
                manifest.check(&info.artifact_name, &fs::read(&library)?)?;
            }
        }

        let structure_bytes = fs::read(&structure_path)?;
        let structure_digest = verify::blake3_hex(&structure_bytes);
        self.check_digest(&info.structure_name, &structure_digest)?;
        let structure = serde_json::from_slice(&structure_bytes).map_err(|e| StoreError::Structure {
            file: info.structure_name.clone(),
            reason: e.to_string(),
        })?;

        let params = mmap::mmap_file(&params_path)?;
        let params_digest = verify::blake3_hex(&params);
        self.check_digest(&info.parameter_name, &params_digest)?;

        debug!(
            library = %library.display(),
            structure = %info.structure_name,
            params_bytes = params.len(),
            "artifacts resolved"
        );

        Ok(ArtifactBundle {
            library,
            structure,
            structure_digest,
            params,
            params_digest,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
