//! Digest manifest: `<root>/digests.json`, a flat JSON object mapping each
//! artifact file name to its BLAKE3 hex digest.
//!
//! ```json
//! {"m0.json": "9f86d0…", "m0.params": "2c26b4…"}
//! ```
//!
//! Files absent from the manifest are not checked.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{Result, StoreError};
use crate::verify;

pub const MANIFEST_FILE: &str = "digests.json";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestManifest {
    digests: BTreeMap<String, String>,
}

impl DigestManifest {
    /// Load the manifest under `root`, or `None` if there is none.
    pub fn load(root: &Path) -> Result<Option<Self>> {
        let path = root.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let digests: BTreeMap<String, String> = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Other(format!("{}: {e}", path.display())))?;
        Ok(Some(Self { digests }))
    }

    /// Write the manifest under `root`.
    pub fn write(&self, root: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(&self.digests)
            .map_err(|e| StoreError::Other(format!("manifest serialization: {e}")))?;
        fs::write(root.join(MANIFEST_FILE), json)?;
        Ok(())
    }

    /// Record the digest of `data` for `file`.
    pub fn record(&mut self, file: impl Into<String>, data: &[u8]) {
        self.digests.insert(file.into(), verify::blake3_hex(data));
    }

    pub fn expected(&self, file: &str) -> Option<&str> {
        self.digests.get(file).map(String::as_str)
    }

    /// Check `data` against the recorded digest for `file`, if any.
    pub fn check(&self, file: &str, data: &[u8]) -> Result<()> {
        match self.expected(file) {
            Some(expected) => verify::verify_blake3(file, data, expected),
            None => Ok(()),
        }
    }

    /// Like [`Self::check`] for a digest the caller already computed.
    pub fn check_digest(&self, file: &str, actual_hex: &str) -> Result<()> {
        match self.expected(file) {
            Some(expected) => verify::compare_digest(file, actual_hex, expected),
            None => Ok(()),
        }
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
