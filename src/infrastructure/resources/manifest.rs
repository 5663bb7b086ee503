//! Declarative resource manifest.
//!
//! A manifest is a JSON array of resources:
//!
//! ```json
//! [
//!   { "id": "default/docs", "spec": { "targetURL": "https://example.com/docs" } },
//!   { "id": "default/blog", "spec": { "targetURL": "https://example.com/blog" } }
//! ]
//! ```
//!
//! Applying a manifest makes the store match it: new ids are created,
//! changed specs are updated and ids missing from the manifest are marked
//! for deletion.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use super::memory_store::{ApplyOutcome, MemoryResourceStore};
use crate::domain::entities::{ResourceId, ShortUrlSpec};

/// One declared resource.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManifestEntry {
    pub id: ResourceId,
    pub spec: ShortUrlSpec,
}

/// Errors while loading a manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Failed to read manifest: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse manifest: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Resource '{0}' is declared more than once")]
    DuplicateId(ResourceId),
}

/// Counts of what applying a manifest changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ManifestSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub pending_deletion: usize,
}

/// Parses manifest JSON, rejecting duplicate ids.
pub fn parse_manifest(text: &str) -> Result<Vec<ManifestEntry>, ManifestError> {
    let entries: Vec<ManifestEntry> = serde_json::from_str(text)?;

    let mut seen = HashSet::new();
    for entry in &entries {
        if !seen.insert(&entry.id) {
            return Err(ManifestError::DuplicateId(entry.id.clone()));
        }
    }

    Ok(entries)
}

/// Reads and parses a manifest file.
pub async fn load_manifest(path: &Path) -> Result<Vec<ManifestEntry>, ManifestError> {
    let text = tokio::fs::read_to_string(path).await?;
    parse_manifest(&text)
}

/// Makes the store match `entries`.
pub async fn apply_manifest(
    store: &MemoryResourceStore,
    entries: Vec<ManifestEntry>,
) -> ManifestSummary {
    let mut summary = ManifestSummary::default();
    let declared: HashSet<ResourceId> = entries.iter().map(|e| e.id.clone()).collect();

    for entry in entries {
        match store.apply(entry.id, entry.spec).await {
            ApplyOutcome::Created => summary.created += 1,
            ApplyOutcome::Updated => summary.updated += 1,
            ApplyOutcome::Unchanged => summary.unchanged += 1,
            ApplyOutcome::PendingDeletion => summary.pending_deletion += 1,
        }
    }

    for resource in store.list().await {
        if declared.contains(&resource.id) {
            continue;
        }
        // Also withdraws a spec re-declared during an earlier deletion.
        if store.mark_deleted(&resource.id).await && !resource.is_being_deleted() {
            summary.deleted += 1;
        }
    }

    info!(
        created = summary.created,
        updated = summary.updated,
        unchanged = summary.unchanged,
        deleted = summary.deleted,
        pending_deletion = summary.pending_deletion,
        "Manifest applied"
    );
    summary
}

/// Loads the manifest at `path` and applies it to the store.
pub async fn sync_from_file(
    store: &MemoryResourceStore,
    path: &Path,
) -> Result<ManifestSummary, ManifestError> {
    let entries = load_manifest(path).await?;
    Ok(apply_manifest(store, entries).await)
}
