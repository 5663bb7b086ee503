//! Service runtime setup.
//!
//! Wires the registry, resource store, controller and both HTTP listeners,
//! and owns the shutdown sequence.

use crate::application::controller::{ControllerConfig, run_controller};
use crate::application::services::{Reconciler, ReconcilerConfig};
use crate::config::Config;
use crate::domain::repositories::Registry;
use crate::infrastructure::registry::{MemoryRegistry, RedisRegistry};
use crate::infrastructure::resources::{MemoryResourceStore, sync_from_file};
use crate::routes::{app_router, probe_router};
use crate::state::AppState;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_retry::Retry;
use tokio_retry::strategy::FixedInterval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const RECONCILE_QUEUE_CAPACITY: usize = 1024;
const REDIS_CONNECT_ATTEMPTS: usize = 5;
const REDIS_CONNECT_RETRY_MS: u64 = 1000;

/// Runs the service with the given configuration.
///
/// Initializes:
/// - Registry (Redis, or in-memory when Redis is not configured)
/// - Resource store and reconcile controller
/// - Manifest load, with reload on `SIGHUP`
/// - A sweep of registry keys no declared resource owns
/// - Redirect and probe listeners
///
/// Returns after `SIGINT`/`SIGTERM` once both listeners have drained and
/// the controller has stopped.
///
/// # Errors
///
/// Returns an error if:
/// - Redis is configured but unreachable after retries
/// - The manifest cannot be loaded at startup
/// - A listener fails to bind or the server fails at runtime
pub async fn run(config: Config) -> Result<()> {
    let registry = build_registry(&config).await?;
    let cancel = CancellationToken::new();

    let (queue, requests) = mpsc::channel(RECONCILE_QUEUE_CAPACITY);
    let store = Arc::new(MemoryResourceStore::new(queue.clone()));

    let reconciler = Arc::new(Reconciler::new(
        registry.clone(),
        store.clone(),
        ReconcilerConfig {
            short_path_length: config.short_path_length,
            click_key_prefix: config.click_key_prefix.clone(),
            recheck_interval: config.reconcile_interval(),
        },
    ));
    let controller_config = ControllerConfig {
        concurrency: config.reconcile_concurrency,
        ..ControllerConfig::default()
    };
    let controller = tokio::spawn(run_controller(
        requests,
        queue,
        reconciler.clone(),
        controller_config,
        cancel.clone(),
    ));

    if let Some(path) = config.resources_file.clone() {
        sync_from_file(&store, &path)
            .await
            .with_context(|| format!("Failed to load resources from {}", path.display()))?;
        // Status does not survive a restart, so entries released while the
        // process was down are found by scanning the registry instead.
        if let Err(e) = reconciler.sweep_orphans(&cancel).await {
            error!(error = %e, "Orphan sweep failed");
        }
        spawn_manifest_reload(store.clone(), path, cancel.clone())?;
    } else {
        warn!("RESOURCES_FILE not set, no ShortURL resources will be reconciled");
    }

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            info!("Shutdown signal received");
            cancel.cancel();
        }
    });

    let state = AppState::new(registry, config.click_key_prefix.clone());

    let app_addr: SocketAddr = config.listen_addr.parse()?;
    let probe_addr: SocketAddr = config.health_listen_addr.parse()?;
    let app_listener = TcpListener::bind(app_addr).await?;
    let probe_listener = TcpListener::bind(probe_addr).await?;
    info!("Serving redirects on http://{app_addr}");
    info!("Serving probes on http://{probe_addr}");

    let app_server = axum::serve(app_listener, app_router(state.clone()))
        .with_graceful_shutdown(cancel.clone().cancelled_owned());
    let probe_server = axum::serve(probe_listener, probe_router(state))
        .with_graceful_shutdown(cancel.clone().cancelled_owned());

    let served = tokio::try_join!(async { app_server.await }, async { probe_server.await });

    cancel.cancel();
    if let Err(e) = controller.await {
        error!(error = %e, "Controller task failed");
    }
    served?;

    info!("Shutdown complete");
    Ok(())
}

/// Connects the configured registry.
///
/// A configured but unreachable Redis is fatal after a few attempts; the
/// in-memory registry is only used when Redis is not configured at all.
async fn build_registry(config: &Config) -> Result<Arc<dyn Registry>> {
    let Some(redis_url) = config.redis_url.as_deref() else {
        warn!("Redis not configured, using in-memory registry");
        return Ok(Arc::new(MemoryRegistry::new()));
    };

    let timeout = config.registry_timeout();
    let strategy = FixedInterval::from_millis(REDIS_CONNECT_RETRY_MS).take(REDIS_CONNECT_ATTEMPTS);
    let registry = Retry::spawn(strategy, || async {
        RedisRegistry::connect(redis_url, timeout)
            .await
            .inspect_err(|e| warn!(error = %e, "Redis connection attempt failed"))
    })
    .await
    .context("Failed to connect to Redis registry")?;

    Ok(Arc::new(registry))
}

#[cfg(unix)]
fn spawn_manifest_reload(
    store: Arc<MemoryResourceStore>,
    path: PathBuf,
    cancel: CancellationToken,
) -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = hangup.recv() => {
                    if received.is_none() {
                        break;
                    }
                    info!("SIGHUP received, reloading {}", path.display());
                    // A broken manifest leaves the current resources in place.
                    if let Err(e) = sync_from_file(&store, &path).await {
                        error!(error = %e, "Manifest reload failed");
                    }
                }
            }
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn spawn_manifest_reload(
    _store: Arc<MemoryResourceStore>,
    _path: PathBuf,
    _cancel: CancellationToken,
) -> Result<()> {
    warn!("Manifest reload on SIGHUP is not supported on this platform");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
