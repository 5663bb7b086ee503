//! ShortURL resource: the desired target URL plus the observed status
//! maintained by the reconciler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a ShortURL resource (e.g. `default/docs`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Desired state, owned by whoever declares the resource.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShortUrlSpec {
    #[serde(rename = "targetURL")]
    pub target_url: String,
}

impl ShortUrlSpec {
    pub fn new(target_url: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
        }
    }
}

/// Observed state, written only by the reconciler.
///
/// `short_path` is empty until the first successful reconciliation and stays
/// stable for as long as the target URL does.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortUrlStatus {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub short_path: String,

    #[serde(default)]
    pub click_count: u64,
}

impl ShortUrlStatus {
    /// Returns true once a short path has been assigned.
    pub fn is_assigned(&self) -> bool {
        !self.short_path.is_empty()
    }
}

/// A ShortURL resource snapshot as returned by the resource store.
///
/// `resource_version` changes on every write and is used for optimistic
/// concurrency on status updates. `deletion_timestamp` is set once deletion
/// was requested; the object lingers until the reconciler finalizes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortUrl {
    pub id: ResourceId,
    pub spec: ShortUrlSpec,
    pub status: ShortUrlStatus,
    pub resource_version: u64,
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl ShortUrl {
    /// Creates a freshly declared resource with an empty status.
    pub fn new(id: ResourceId, spec: ShortUrlSpec) -> Self {
        Self {
            id,
            spec,
            status: ShortUrlStatus::default(),
            resource_version: 1,
            deletion_timestamp: None,
        }
    }

    /// Returns true if deletion was requested and finalization is pending.
    pub fn is_being_deleted(&self) -> bool {
        self.deletion_timestamp.is_some()
    }
}
