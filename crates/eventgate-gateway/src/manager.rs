//! Event source lifecycle manager.
//!
//! Owns the registry of active sources. Each [`reconcile`] call takes a full
//! snapshot of declared sources, dials a connection for every one of them,
//! diffs their identities against the registry, tears down the stale ones
//! and spawns a worker for each fresh one. Sources present on both sides are
//! left running untouched.
//!
//! [`reconcile`]: EventSourceManager::reconcile

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use eventgate_core::types::{EventSourceDefinition, SourceStatus, WorkerPhase};
use eventgate_core::{SourceId, SourceRegistry};

use crate::connector::{Connector, SourceConnection};
use crate::dispatch::Dispatcher;
use crate::error::{ConnectFailure, ManagerError, SourceError};
use crate::status::StatusReporter;
use crate::worker::SourceWorker;

/// Default bound on dialing one source connection (10 seconds).
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Default capacity of the outgoing status channel.
const DEFAULT_STATUS_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Bound on reaching a dialable connection for one source.
    pub connect_timeout: Duration,
    /// Capacity of the outgoing status channel.
    pub status_buffer: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            status_buffer: DEFAULT_STATUS_BUFFER,
        }
    }
}

/// A source the manager is currently running.
pub struct ActiveSource {
    pub definition: EventSourceDefinition,
    cancel: CancellationToken,
    connection: Arc<dyn SourceConnection>,
    reporter: Arc<StatusReporter>,
}

impl ActiveSource {
    pub async fn phase(&self) -> WorkerPhase {
        self.reporter.phase().await
    }
}

/// What one reconciliation pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Keys of sources whose workers were spawned, sorted.
    pub started: Vec<String>,
    /// Keys of sources that were torn down, sorted.
    pub stopped: Vec<String>,
    /// Number of declared sources that were already running.
    pub unchanged: usize,
}

struct Candidate {
    definition: EventSourceDefinition,
    connection: Result<Arc<dyn SourceConnection>, SourceError>,
}

pub struct EventSourceManager {
    registry: SourceRegistry<ActiveSource>,
    connector: Arc<dyn Connector>,
    dispatcher: Arc<dyn Dispatcher>,
    status_tx: mpsc::Sender<SourceStatus>,
    config: ManagerConfig,
}

impl EventSourceManager {
    /// Create a manager and the receiving end of its status stream.
    pub fn new(
        connector: Arc<dyn Connector>,
        dispatcher: Arc<dyn Dispatcher>,
        config: ManagerConfig,
    ) -> (Self, mpsc::Receiver<SourceStatus>) {
        let (status_tx, status_rx) = mpsc::channel(config.status_buffer.max(1));
        let manager = Self {
            registry: SourceRegistry::new(),
            connector,
            dispatcher,
            status_tx,
            config,
        };
        (manager, status_rx)
    }

    /// Bring the running sources in line with `definitions`.
    ///
    /// Takes `&mut self`, so passes never overlap. A connection failure for
    /// a new source publishes `Error` for it, leaves it unregistered for the
    /// next pass to retry, and is reported in the returned error once every
    /// other source has been reconciled.
    pub async fn reconcile(
        &mut self,
        definitions: &[EventSourceDefinition],
    ) -> Result<ReconcileSummary, ManagerError> {
        let mut candidates = self.dial_all(definitions).await;

        let diff = self.registry.diff(candidates.keys());
        tracing::info!(
            stale = diff.stale.len(),
            fresh = diff.fresh.len(),
            declared = candidates.len(),
            "reconciling event sources"
        );

        let mut summary = ReconcileSummary::default();
        for id in &diff.stale {
            if let Some(key) = self.stop(id).await {
                summary.stopped.push(key);
            }
        }

        let mut failures = Vec::new();
        for id in &diff.fresh {
            let Some(candidate) = candidates.remove(id) else {
                continue;
            };
            let key = candidate.definition.key.clone();
            match candidate.connection {
                Ok(connection) => {
                    self.start(id.clone(), candidate.definition, connection);
                    summary.started.push(key);
                }
                Err(error) => {
                    tracing::error!(source = %key, "failed to connect event source: {error}");
                    let reporter =
                        StatusReporter::new(id.clone(), key.clone(), self.status_tx.clone());
                    reporter
                        .transition(WorkerPhase::Error, &error.to_string())
                        .await;
                    failures.push(ConnectFailure { key, error });
                }
            }
        }

        // Whatever is left is already running; its fresh connection is spare.
        summary.unchanged = candidates.len();
        for candidate in candidates.into_values() {
            if let Ok(connection) = candidate.connection {
                if let Err(e) = connection.close().await {
                    tracing::debug!(source = %candidate.definition.key, "failed to close spare connection: {e}");
                }
            }
        }

        summary.started.sort();
        summary.stopped.sort();
        if failures.is_empty() {
            Ok(summary)
        } else {
            Err(ManagerError::Connection(failures))
        }
    }

    /// Tear down every active source.
    pub async fn shutdown(&mut self) {
        let ids: Vec<SourceId> = self.registry.ids().into_iter().cloned().collect();
        tracing::info!(count = ids.len(), "shutting down event sources");
        for id in &ids {
            self.stop(id).await;
        }
    }

    pub fn active_count(&self) -> usize {
        self.registry.len()
    }

    pub fn get(&self, id: &SourceId) -> Option<&ActiveSource> {
        self.registry.get(id)
    }

    /// Definitions of active sources, ordered by key.
    pub fn active(&self) -> Vec<&EventSourceDefinition> {
        let mut defs: Vec<&EventSourceDefinition> = self
            .registry
            .ids()
            .into_iter()
            .filter_map(|id| self.registry.get(id))
            .map(|source| &source.definition)
            .collect();
        defs.sort_by(|a, b| a.key.cmp(&b.key));
        defs
    }

    async fn dial_all(
        &self,
        definitions: &[EventSourceDefinition],
    ) -> HashMap<SourceId, Candidate> {
        let timeout = self.config.connect_timeout;
        let dials = definitions.iter().map(|definition| {
            let connector = Arc::clone(&self.connector);
            async move {
                let connection =
                    match tokio::time::timeout(timeout, connector.connect(definition)).await {
                        Ok(result) => result,
                        Err(_) => Err(SourceError::Connection(format!(
                            "timed out after {}ms",
                            timeout.as_millis()
                        ))),
                    };
                Candidate {
                    definition: definition.clone(),
                    connection,
                }
            }
        });

        let mut candidates = HashMap::new();
        for candidate in join_all(dials).await {
            let id = candidate.definition.id();
            tracing::debug!(source = %candidate.definition.key, id = %id.short(), "event source declared");
            candidates.insert(id, candidate);
        }
        candidates
    }

    fn start(
        &mut self,
        id: SourceId,
        definition: EventSourceDefinition,
        connection: Arc<dyn SourceConnection>,
    ) {
        tracing::info!(source = %definition.key, id = %id.short(), "activating new event source");
        let cancel = CancellationToken::new();
        let reporter = Arc::new(StatusReporter::new(
            id.clone(),
            definition.key.clone(),
            self.status_tx.clone(),
        ));
        let worker = SourceWorker::new(
            definition.clone(),
            Arc::clone(&connection),
            Arc::clone(&self.dispatcher),
            Arc::clone(&reporter),
            cancel.clone(),
        );
        self.registry.insert(
            id,
            ActiveSource {
                definition,
                cancel,
                connection,
                reporter,
            },
        );
        tokio::spawn(worker.run());
    }

    /// Cancel, publish `Removed`, close, then drop the registry entry.
    async fn stop(&mut self, id: &SourceId) -> Option<String> {
        let source = self.registry.get(id)?;
        let key = source.definition.key.clone();
        tracing::info!(source = %key, "removing the event source");

        source.cancel.cancel();
        source.reporter.remove("event source removed").await;
        if let Err(e) = source.connection.close().await {
            tracing::warn!(source = %key, "failed to close connection: {e}");
        }
        self.registry.remove(id);
        Some(key)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
