//! Reconcile request model delivered to the controller.

use crate::domain::entities::{ResourceId, ShortUrlStatus};

/// A request to converge one resource.
///
/// Requests are delivered at least once and may be redelivered for the same
/// id; the reconciler re-derives everything from current external state.
///
/// `last_observed` carries the status seen when the resource was last
/// present in the store. It is the only way to find the registry entry of a
/// resource whose object has already disappeared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileRequest {
    pub id: ResourceId,
    pub last_observed: Option<ShortUrlStatus>,
}

impl ReconcileRequest {
    /// Creates a request without a prior status snapshot.
    pub fn new(id: ResourceId) -> Self {
        Self {
            id,
            last_observed: None,
        }
    }

    /// Attaches the last status seen for this resource.
    pub fn with_last_observed(mut self, status: ShortUrlStatus) -> Self {
        self.last_observed = Some(status);
        self
    }

    /// Folds a newer request for the same id into this one.
    ///
    /// A newer snapshot wins; an older snapshot survives a newer request
    /// that carries none.
    pub fn merge(&mut self, newer: ReconcileRequest) {
        if newer.last_observed.is_some() {
            self.last_observed = newer.last_observed;
        }
    }

    /// Short path recorded in the last observed status, if any.
    pub fn last_short_path(&self) -> Option<&str> {
        self.last_observed
            .as_ref()
            .map(|status| status.short_path.as_str())
            .filter(|path| !path.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(path: &str) -> ShortUrlStatus {
        ShortUrlStatus {
            short_path: path.to_string(),
            click_count: 0,
        }
    }

    #[test]
    fn test_last_short_path_ignores_empty() {
        let request = ReconcileRequest::new("a/b".into()).with_last_observed(status(""));
        assert!(request.last_short_path().is_none());

        let request = ReconcileRequest::new("a/b".into()).with_last_observed(status("/abc"));
        assert_eq!(request.last_short_path(), Some("/abc"));
    }

    #[test]
    fn test_merge_keeps_existing_snapshot() {
        let mut request = ReconcileRequest::new("a/b".into()).with_last_observed(status("/abc"));
        request.merge(ReconcileRequest::new("a/b".into()));

        assert_eq!(request.last_short_path(), Some("/abc"));
    }

    #[test]
    fn test_merge_prefers_newer_snapshot() {
        let mut request = ReconcileRequest::new("a/b".into()).with_last_observed(status("/abc"));
        request.merge(ReconcileRequest::new("a/b".into()).with_last_observed(status("/xyz")));

        assert_eq!(request.last_short_path(), Some("/xyz"));
    }
}
