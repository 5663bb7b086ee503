//! In-process dispatcher feeding reconcile requests to the [`Reconciler`].
//!
//! # Scheduling
//!
//! - At most one reconcile per resource id runs at a time; requests that
//!   arrive meanwhile are coalesced into a single follow-up run
//! - Different ids run concurrently, bounded by a semaphore
//! - Successful runs are re-queued after the re-check interval
//! - Failed runs are retried with exponential backoff; validation failures
//!   wait the maximum delay since only a spec change can fix them
//! - Any newly admitted request supersedes a pending timer for its id
//!
//! The controller stops when the cancellation token fires or every request
//! sender is dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio_retry::strategy::ExponentialBackoff;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::services::{Reconciler, Requeue};
use crate::domain::entities::ResourceId;
use crate::domain::reconcile_request::ReconcileRequest;
use crate::domain::repositories::{Registry, ResourceStore};
use crate::error::ReconcileError;

/// Dispatcher tunables.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Maximum number of resources reconciled at the same time.
    pub concurrency: usize,
    /// First retry delay after a failure.
    pub backoff_base: Duration,
    /// Upper bound on retry delays.
    pub backoff_max: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(60),
        }
    }
}

/// Per-id bookkeeping.
#[derive(Debug, Default)]
struct Slot {
    running: bool,
    pending: Option<ReconcileRequest>,
    failures: u32,
    /// Bumped whenever a timer is armed or a request admitted; a timer only
    /// fires if the epoch it captured is still current.
    epoch: u64,
}

struct Dispatcher<R: Registry + ?Sized, S: ResourceStore + ?Sized> {
    reconciler: Arc<Reconciler<R, S>>,
    slots: Mutex<HashMap<ResourceId, Slot>>,
    permits: Semaphore,
    queue: mpsc::Sender<ReconcileRequest>,
    config: ControllerConfig,
    cancel: CancellationToken,
}

/// Runs the controller until `cancel` fires or the request channel closes.
///
/// `queue` must be a sender for the same channel as `requests`; timers use
/// it to re-deliver requests.
pub async fn run_controller<R, S>(
    mut requests: mpsc::Receiver<ReconcileRequest>,
    queue: mpsc::Sender<ReconcileRequest>,
    reconciler: Arc<Reconciler<R, S>>,
    config: ControllerConfig,
    cancel: CancellationToken,
) where
    R: Registry + ?Sized + 'static,
    S: ResourceStore + ?Sized + 'static,
{
    let dispatcher = Arc::new(Dispatcher {
        reconciler,
        slots: Mutex::new(HashMap::new()),
        permits: Semaphore::new(config.concurrency.max(1)),
        queue,
        config,
        cancel: cancel.clone(),
    });

    info!(
        concurrency = dispatcher.config.concurrency,
        "Controller started"
    );

    loop {
        let request = tokio::select! {
            _ = cancel.cancelled() => break,
            request = requests.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };
        dispatcher.clone().admit(request).await;
    }

    info!("Controller stopped");
}

impl<R, S> Dispatcher<R, S>
where
    R: Registry + ?Sized + 'static,
    S: ResourceStore + ?Sized + 'static,
{
    async fn admit(self: Arc<Self>, request: ReconcileRequest) {
        let mut slots = self.slots.lock().await;
        let slot = slots.entry(request.id.clone()).or_default();
        slot.epoch += 1;

        if slot.running {
            match slot.pending.as_mut() {
                Some(pending) => pending.merge(request),
                None => slot.pending = Some(request),
            }
            return;
        }

        slot.running = true;
        drop(slots);
        tokio::spawn(self.clone().drive(request));
    }

    /// Runs reconciles for one id until no follow-up is pending.
    async fn drive(self: Arc<Self>, mut request: ReconcileRequest) {
        loop {
            let outcome = {
                let permit = tokio::select! {
                    _ = self.cancel.cancelled() => None,
                    permit = self.permits.acquire() => permit.ok(),
                };
                let Some(_permit) = permit else {
                    self.slots.lock().await.remove(&request.id);
                    return;
                };
                self.reconciler.reconcile(&request, &self.cancel).await
            };

            let mut slots = self.slots.lock().await;
            let Some(slot) = slots.get_mut(&request.id) else {
                return;
            };

            let delay = self.next_delay(slot, &request.id, outcome);

            if let Some(next) = slot.pending.take() {
                let mut next = next;
                if next.last_observed.is_none() {
                    next.last_observed = request.last_observed.take();
                }
                request = next;
                continue;
            }

            slot.running = false;
            match delay {
                Some(delay) => {
                    slot.epoch += 1;
                    let epoch = slot.epoch;
                    drop(slots);
                    tokio::spawn(self.clone().requeue_after(request, delay, epoch));
                }
                None => {
                    slots.remove(&request.id);
                }
            }
            return;
        }
    }

    /// Decides when the id should run again, updating its failure streak.
    fn next_delay(
        &self,
        slot: &mut Slot,
        id: &ResourceId,
        outcome: Result<Requeue, ReconcileError>,
    ) -> Option<Duration> {
        match outcome {
            Ok(Requeue::After(interval)) => {
                slot.failures = 0;
                Some(interval)
            }
            Ok(Requeue::Never) => {
                debug!(resource = %id, "Resource released");
                None
            }
            Err(ReconcileError::Cancelled) => None,
            Err(e) => {
                slot.failures = slot.failures.saturating_add(1);
                metrics::counter!("url_shortener_reconcile_errors_total", "kind" => e.kind())
                    .increment(1);

                let delay = if e.is_retryable() {
                    backoff_delay(&self.config, slot.failures)
                } else {
                    self.config.backoff_max
                };
                warn!(
                    resource = %id,
                    error = %e,
                    failures = slot.failures,
                    retry_in = ?delay,
                    "Reconciliation failed"
                );
                Some(delay)
            }
        }
    }

    async fn requeue_after(self: Arc<Self>, request: ReconcileRequest, delay: Duration, epoch: u64) {
        tokio::select! {
            _ = self.cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }

        let current = self
            .slots
            .lock()
            .await
            .get(&request.id)
            .map(|slot| slot.epoch);
        if current != Some(epoch) {
            return;
        }

        if self.queue.send(request).await.is_err() {
            debug!("Request queue closed, dropping requeue");
        }
    }
}

/// Delay before retry number `failures` (1-based), capped at
/// `config.backoff_max`.
pub fn backoff_delay(config: &ControllerConfig, failures: u32) -> Duration {
    let base_ms = u64::try_from(config.backoff_base.as_millis()).unwrap_or(u64::MAX);
    // Past 64 doublings the strategy saturates anyway.
    let attempt = usize::try_from(failures.saturating_sub(1).min(64)).unwrap_or(64);

    ExponentialBackoff::from_millis(2)
        .factor(base_ms / 2)
        .max_delay(config.backoff_max)
        .nth(attempt)
        .unwrap_or(config.backoff_max)
        .min(config.backoff_max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ControllerConfig {
        ControllerConfig {
            concurrency: 2,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let config = config();
        assert_eq!(backoff_delay(&config, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(&config, 2), Duration::from_millis(1000));
        assert_eq!(backoff_delay(&config, 3), Duration::from_millis(2000));
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = config();
        assert_eq!(backoff_delay(&config, 10), Duration::from_secs(10));
        assert_eq!(backoff_delay(&config, u32::MAX), Duration::from_secs(10));
    }
}
