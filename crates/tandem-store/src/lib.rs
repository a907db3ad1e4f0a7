//! `tandem-store` — filesystem artifacts for pipeline modules.
//!
//! Each module is described by three artifact names in its load info: a
//! compiled library, a structure description (JSON), and a parameter blob.
//! [`ArtifactStore`] resolves them under a root directory, memory-maps the
//! parameters, and fingerprints everything with BLAKE3; [`StoreLoader`]
//! plugs the store into executor initialization.

pub mod error;
pub mod loader;
pub mod manifest;
pub mod mmap;
pub mod store;
pub mod verify;

pub use error::{Result, StoreError};
pub use loader::StoreLoader;
pub use manifest::DigestManifest;
pub use store::{ArtifactBundle, ArtifactStore};
