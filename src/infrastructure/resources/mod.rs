//! ShortURL resource source: an in-process store fed by a JSON manifest.

pub mod manifest;
mod memory_store;

pub use manifest::{
    ManifestEntry, ManifestError, ManifestSummary, apply_manifest, load_manifest, parse_manifest,
    sync_from_file,
};
pub use memory_store::{ApplyOutcome, MemoryResourceStore};
