//! `eventgate run`: the gateway and the sensor controller in one process.
//!
//! Sources come from the sources file and are reconciled again whenever it
//! changes. Their events resolve sensor dependencies through
//! [`SensorDispatcher`]; the controller drives every stored sensor through
//! its lifecycle. Shutdown stops the sources first, then the controller.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use eventgate_gateway::{EventSourceManager, LocalConnector, ManagerError};
use eventgate_sensor::{MemoryProvisioner, MemoryStore, SensorController, SensorReconciler};
use eventgate_sources::executor_for;

use crate::config::{Config, load_sensors, load_sources};
use crate::dispatch::SensorDispatcher;
use crate::status_table::{StatusTable, collect_statuses};
use crate::watch::watch_file;

const STATUS_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn cmd_run(config_path: &Path) -> anyhow::Result<()> {
    let config = Config::load(config_path).await?;
    let store = Arc::new(MemoryStore::new());
    if let Some(path) = &config.controller.sensors_file {
        let count = seed_sensors(&store, path).await?;
        tracing::info!(count, path = %path.display(), "loaded sensors");
    }

    let table = run_until(&config, store, shutdown_signal()).await?;
    if !table.is_empty() {
        print!("{}", table.render());
    }
    tracing::info!("eventgate stopped");
    Ok(())
}

/// Add every sensor declared in `path` to `store`.
pub async fn seed_sensors(store: &MemoryStore, path: &Path) -> anyhow::Result<usize> {
    let sensors = load_sensors(path).await?;
    let count = sensors.len();
    for sensor in sensors {
        let key = sensor.key();
        store
            .create(sensor)
            .await
            .with_context(|| format!("failed to add sensor {key}"))?;
    }
    Ok(count)
}

/// Run until `shutdown` resolves, then return the final source statuses.
pub async fn run_until(
    config: &Config,
    store: Arc<MemoryStore>,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<StatusTable> {
    let source_type = &config.gateway.source_type;
    let executor =
        executor_for(source_type).with_context(|| format!("unknown source type {source_type:?}"))?;

    let reconciler = Arc::new(SensorReconciler::new(
        store.clone(),
        Arc::new(MemoryProvisioner::new()),
        config.controller.reconciler_config(),
    ));
    let cancel = CancellationToken::new();
    let controller = SensorController::new(reconciler, store.clone(), config.controller.settle());
    let controller_handle = tokio::spawn(controller.run(cancel.clone()));

    let dispatcher = Arc::new(SensorDispatcher::new(
        config.gateway.name.clone(),
        store,
        config.controller.retry.policy(),
    ));
    let (mut manager, status_rx) = EventSourceManager::new(
        Arc::new(LocalConnector::new(executor)),
        dispatcher,
        config.gateway.manager_config(),
    );
    let status_handle = tokio::spawn(collect_statuses(status_rx));

    let sources_file = &config.gateway.sources_file;
    let (watcher, mut changes) = watch_file(sources_file)?;
    tracing::info!(gateway = %config.gateway.name, %source_type, "eventgate started");
    reload(&mut manager, sources_file).await;

    tokio::pin!(shutdown);
    let mut watching = true;
    loop {
        tokio::select! {
            () = &mut shutdown => break,
            changed = changes.recv(), if watching => match changed {
                Some(()) => reload(&mut manager, sources_file).await,
                None => {
                    tracing::warn!("sources watcher stopped, keeping current sources");
                    watching = false;
                }
            },
        }
    }

    drop(watcher);
    manager.shutdown().await;
    cancel.cancel();
    if let Err(e) = controller_handle.await {
        tracing::error!("sensor controller task failed: {e}");
    }

    // The status stream ends once the manager and every worker are gone.
    drop(manager);
    match tokio::time::timeout(STATUS_DRAIN_TIMEOUT, status_handle).await {
        Ok(Ok(table)) => Ok(table),
        Ok(Err(e)) => Err(anyhow::anyhow!("status task failed: {e}")),
        Err(_) => {
            tracing::warn!("timed out draining source statuses");
            Ok(StatusTable::default())
        }
    }
}

/// Reconcile the manager against the current sources file.
///
/// A file that can't be read or parsed leaves the running sources alone.
async fn reload(manager: &mut EventSourceManager, path: &Path) {
    let definitions = match load_sources(path).await {
        Ok(defs) => defs,
        Err(e) => {
            tracing::warn!("skipping reload: {e:#}");
            return;
        }
    };
    match manager.reconcile(&definitions).await {
        Ok(summary) => tracing::info!(
            started = ?summary.started,
            stopped = ?summary.stopped,
            unchanged = summary.unchanged,
            "event sources reconciled"
        ),
        Err(ManagerError::Connection(failures)) => {
            for failure in &failures {
                tracing::warn!(source = %failure.key, "event source not started: {}", failure.error);
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => tokio::select! {
                _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
                _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
            },
            Err(e) => {
                tracing::warn!("failed to register SIGTERM handler: {e}");
                ctrl_c.await.ok();
                tracing::info!("received ctrl-c, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        tracing::info!("received ctrl-c, shutting down");
    }
}
