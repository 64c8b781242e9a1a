//! Per-source status reporting with transition enforcement.
//!
//! Every status a source ever publishes goes through its [`StatusReporter`]:
//! the worker for its own transitions and the manager's teardown path for
//! `Removed`. The reporter holds the current [`WorkerPhase`] under a lock
//! that also covers the channel send, so transitions are published in order
//! and nothing follows a terminal phase except a final `Removed`.

use tokio::sync::{Mutex, mpsc};

use eventgate_core::SourceId;
use eventgate_core::types::{SourcePhase, SourceStatus, WorkerPhase};

#[derive(Debug)]
pub struct StatusReporter {
    id: SourceId,
    display_name: String,
    phase: Mutex<WorkerPhase>,
    tx: mpsc::Sender<SourceStatus>,
}

impl StatusReporter {
    /// A reporter starting in `Connecting`.
    pub fn new(id: SourceId, display_name: impl Into<String>, tx: mpsc::Sender<SourceStatus>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            phase: Mutex::new(WorkerPhase::Connecting),
            tx,
        }
    }

    pub fn id(&self) -> &SourceId {
        &self.id
    }

    pub async fn phase(&self) -> WorkerPhase {
        *self.phase.lock().await
    }

    /// Move to `next` and publish it if it is a published phase.
    ///
    /// Returns `false`, publishing nothing, when the transition is illegal
    /// (e.g. the source has already reached a terminal phase).
    pub async fn transition(&self, next: WorkerPhase, message: &str) -> bool {
        let mut phase = self.phase.lock().await;
        let current = *phase;
        if !current.can_transition_to(next) {
            tracing::debug!(
                source = %self.display_name,
                from = %current,
                to = %next,
                "ignoring status transition"
            );
            return false;
        }
        *phase = next;
        if let Some(published) = next.published() {
            self.publish(published, message).await;
        }
        true
    }

    /// Mark the source removed and publish `Removed`.
    ///
    /// Unlike [`transition`](Self::transition) this also applies after the
    /// worker has completed or failed, since the source itself is going
    /// away. Only a second removal is ignored.
    pub async fn remove(&self, message: &str) -> bool {
        let mut phase = self.phase.lock().await;
        if *phase == WorkerPhase::Removed {
            return false;
        }
        *phase = WorkerPhase::Removed;
        self.publish(SourcePhase::Removed, message).await;
        true
    }

    async fn publish(&self, phase: SourcePhase, message: &str) {
        let status = SourceStatus {
            id: self.id.clone(),
            phase,
            message: message.to_owned(),
            display_name: self.display_name.clone(),
        };
        if self.tx.send(status).await.is_err() {
            tracing::debug!(source = %self.display_name, %phase, "status receiver dropped");
        }
    }
}
