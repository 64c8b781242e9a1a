//! Watch loop driving the reconciler.
//!
//! Store notifications are fanned out to one task per sensor key, so passes
//! over different sensors run concurrently while passes over the same
//! sensor never overlap. Notifications that arrive while a pass is running
//! collapse into a single follow-up pass.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::StoreError;
use crate::reconciler::SensorReconciler;
use crate::store::MemoryStore;

pub struct SensorController {
    reconciler: Arc<SensorReconciler>,
    store: Arc<MemoryStore>,
    /// Pause after every persisted pass.
    settle: Duration,
}

impl SensorController {
    pub fn new(reconciler: Arc<SensorReconciler>, store: Arc<MemoryStore>, settle: Duration) -> Self {
        Self {
            reconciler,
            store,
            settle,
        }
    }

    /// Reconcile every stored sensor, then every sensor the store reports,
    /// until `cancel` fires. In-flight passes finish before this returns.
    pub async fn run(self, cancel: CancellationToken) {
        let mut events = self.store.subscribe();
        let tracker = TaskTracker::new();
        let mut queues: HashMap<String, KeyQueue> = HashMap::new();

        for sensor in self.store.list().await {
            self.enqueue(&mut queues, &tracker, &cancel, sensor.key());
        }

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Ok(key) => self.enqueue(&mut queues, &tracker, &cancel, key),
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "sensor watch lagged, requeueing all sensors");
                        for sensor in self.store.list().await {
                            self.enqueue(&mut queues, &tracker, &cancel, sensor.key());
                        }
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        drop(queues);
        tracker.close();
        tracker.wait().await;
        tracing::info!("sensor controller stopped");
    }

    fn enqueue(
        &self,
        queues: &mut HashMap<String, KeyQueue>,
        tracker: &TaskTracker,
        cancel: &CancellationToken,
        key: String,
    ) {
        // Tasks of deleted sensors have exited; drop their entries.
        queues.retain(|_, queue| !queue.handle.is_finished());
        if let Some(queue) = queues.get(&key) {
            match queue.tx.try_send(()) {
                // A full queue already holds a pending pass.
                Ok(()) | Err(TrySendError::Full(())) => return,
                Err(TrySendError::Closed(())) => {}
            }
        }

        // The key's previous task closed its queue and may still be finishing
        // its last pass; the new task starts after it.
        let previous = queues.remove(&key).map(|queue| queue.handle);
        let (tx, rx) = mpsc::channel(1);
        let _ = tx.try_send(());
        let reconciler = Arc::clone(&self.reconciler);
        let settle = self.settle;
        let cancel = cancel.clone();
        let task_key = key.clone();
        let handle = tracker.spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            sensor_loop(reconciler, task_key, rx, settle, cancel).await;
        });
        queues.insert(key, KeyQueue { tx, handle });
    }
}

struct KeyQueue {
    tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

enum Pass {
    Persisted,
    Idle,
    Gone,
}

async fn sensor_loop(
    reconciler: Arc<SensorReconciler>,
    key: String,
    mut rx: mpsc::Receiver<()>,
    settle: Duration,
    cancel: CancellationToken,
) {
    while let Some(()) = rx.recv().await {
        if cancel.is_cancelled() {
            break;
        }
        match reconcile_key(&reconciler, &key).await {
            Pass::Persisted => {}
            Pass::Idle => continue,
            Pass::Gone => {
                // Passes queued before the close still run; later ones
                // start a new task.
                rx.close();
                continue;
            }
        }
        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(settle) => {}
        }
    }
}

/// One pass over the latest stored copy.
async fn reconcile_key(reconciler: &SensorReconciler, key: &str) -> Pass {
    let sensor = match reconciler.store().get(key).await {
        Ok(sensor) => sensor,
        Err(StoreError::NotFound(_)) => {
            tracing::debug!(sensor = %key, "sensor is gone, stopping its queue");
            return Pass::Gone;
        }
        Err(e) => {
            tracing::warn!(sensor = %key, "failed to fetch sensor: {e}");
            return Pass::Idle;
        }
    };
    match reconciler.reconcile(&sensor).await {
        Ok(outcome) if outcome.persisted => Pass::Persisted,
        Ok(_) => Pass::Idle,
        Err(e) => {
            tracing::warn!(sensor = %key, "reconciliation failed: {e}");
            Pass::Idle
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use eventgate_core::{
        Container, DeploySpec, EventDependency, NodePhase, ResourcePhase, Sensor, SensorSpec,
    };

    use crate::provision::MemoryProvisioner;
    use crate::reconciler::ReconcilerConfig;
    use crate::store::ResourceStore;

    fn spec(deps: &[&str]) -> SensorSpec {
        SensorSpec {
            dependencies: deps
                .iter()
                .map(|n| EventDependency { name: (*n).to_owned() })
                .collect(),
            triggers: Vec::new(),
            deploy: DeploySpec {
                containers: vec![Container {
                    name: "sensor".to_owned(),
                    image: "eventgate/sensor".to_owned(),
                    env: Vec::new(),
                }],
                ..DeploySpec::default()
            },
        }
    }

    fn start(store: &Arc<MemoryStore>) -> (CancellationToken, tokio::task::JoinHandle<()>) {
        let reconciler = Arc::new(SensorReconciler::new(
            store.clone(),
            Arc::new(MemoryProvisioner::new()),
            ReconcilerConfig::default(),
        ));
        let controller = SensorController::new(reconciler, store.clone(), Duration::from_millis(5));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(controller.run(cancel.clone()));
        (cancel, handle)
    }

    async fn wait_for(store: &MemoryStore, key: &str, check: impl Fn(&Sensor) -> bool) -> Sensor {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(s) = store.get(key).await {
                    if check(&s) {
                        return s;
                    }
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition reached in time")
    }

    // ── 1. existing_sensors_are_activated ───────────────────────────

    #[tokio::test]
    async fn existing_sensors_are_activated() {
        let store = Arc::new(MemoryStore::new());
        store.create(Sensor::new("a", spec(&["gw:x"]))).await.expect("create");
        store.create(Sensor::new("b", spec(&["gw:y"]))).await.expect("create");

        let (cancel, handle) = start(&store);
        for key in ["a", "b"] {
            let s = wait_for(&store, key, |s| s.status.phase == ResourcePhase::Active).await;
            assert_eq!(s.status.nodes.len(), 1);
        }
        cancel.cancel();
        handle.await.expect("controller exits");
    }

    // ── 2. external_success_drives_rerun ────────────────────────────

    #[tokio::test]
    async fn external_success_drives_rerun() {
        let store = Arc::new(MemoryStore::new());
        let (cancel, handle) = start(&store);
        store.create(Sensor::new("a", spec(&["gw:x"]))).await.expect("create");

        let mut active = wait_for(&store, "a", |s| s.status.phase == ResourcePhase::Active).await;
        active
            .mark_node_phase("gw:x", NodePhase::Success, None, chrono::Utc::now())
            .expect("initialized");
        store.update(&active).await.expect("event arrives");

        let rerun = wait_for(&store, "a", |s| s.status.completion_count == 1).await;
        assert!(rerun.status.completion_count >= 1);

        // The next run waits for a new event.
        let waiting = wait_for(&store, "a", |s| {
            s.status.phase == ResourcePhase::Active && s.status.completion_count == 1
        })
        .await;
        assert_eq!(waiting.node_by_name("gw:x").expect("re-initialized").phase, NodePhase::Active);

        cancel.cancel();
        handle.await.expect("controller exits");
    }

    // ── 3. deleted_sensor_can_return ────────────────────────────────

    #[tokio::test]
    async fn deleted_sensor_can_return() {
        let store = Arc::new(MemoryStore::new());
        let (cancel, handle) = start(&store);
        store.create(Sensor::new("a", spec(&["gw:x"]))).await.expect("create");
        wait_for(&store, "a", |s| s.status.phase == ResourcePhase::Active).await;

        store.delete("a").await.expect("delete");
        // Let the key's task observe the deletion and close its queue.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.get("a").await.is_err());

        store.create(Sensor::new("a", spec(&["gw:y"]))).await.expect("re-create");
        let back = wait_for(&store, "a", |s| s.status.phase == ResourcePhase::Active).await;
        assert!(back.node_by_name("gw:y").is_some());

        cancel.cancel();
        handle.await.expect("controller exits");
    }
}
