//! Thin wrapper around `memmap2` for parameter blobs.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::error::Result;

/// Memory-map an existing file for read-only access.
///
/// # Safety contract
///
/// The caller must ensure that no other process truncates or overwrites the
/// file while the returned [`Mmap`] is alive. Artifacts under a store root
/// are treated as immutable once published.
pub fn mmap_file(path: &Path) -> Result<Mmap> {
    let file = File::open(path)?;
    // SAFETY: artifact files are not modified in place; see doc-comment above.
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(mmap)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
