//! Routes source events to the sensors that depend on them.
//!
//! An event from source `<src>` of gateway `<gw>` resolves the dependency
//! named `<gw>:<src>` on every active sensor waiting for it. When that was
//! the sensor's last outstanding dependency, its triggers fire.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use eventgate_core::{GraphError, NodeEvent, NodePhase, NodeType, ResourcePhase, Sensor};
use eventgate_gateway::{DispatchError, Dispatcher};
use eventgate_sensor::{MemoryStore, ResourceStore, RetryPolicy, StoreError};

/// Dependency name an event from `source` of `gateway` resolves.
pub fn dependency_name(gateway: &str, source: &str) -> String {
    format!("{gateway}:{source}")
}

/// Whether `sensor` is active and waiting on `dependency`.
pub fn is_waiting_on(sensor: &Sensor, dependency: &str) -> bool {
    sensor.status.phase == ResourcePhase::Active
        && sensor.node_by_name(dependency).is_some_and(|node| {
            node.node_type == NodeType::EventDependency && node.phase == NodePhase::Active
        })
}

/// Resolve `dependency` with `event`. Returns the triggers fired, by name.
pub fn apply_event(
    sensor: &mut Sensor,
    dependency: &str,
    event: NodeEvent,
    now: DateTime<Utc>,
) -> Result<Vec<String>, GraphError> {
    sensor.mark_node_phase(dependency, NodePhase::Success, Some("event received"), now)?;
    sensor.record_node_event(dependency, event)?;

    if !sensor.are_all_nodes_success(NodeType::EventDependency) {
        return Ok(Vec::new());
    }
    let triggers: Vec<String> = sensor
        .nodes_of(NodeType::Trigger)
        .into_iter()
        .filter(|n| n.phase != NodePhase::Success)
        .map(|n| n.name.clone())
        .collect();
    for name in &triggers {
        sensor.mark_node_phase(name, NodePhase::Success, Some("trigger fired"), now)?;
    }
    Ok(triggers)
}

pub struct SensorDispatcher {
    gateway: String,
    store: Arc<MemoryStore>,
    retry: RetryPolicy,
}

impl SensorDispatcher {
    pub fn new(gateway: impl Into<String>, store: Arc<MemoryStore>, retry: RetryPolicy) -> Self {
        Self {
            gateway: gateway.into(),
            store,
            retry,
        }
    }

    /// Resolve `dependency` on the sensor stored under `key`.
    ///
    /// Every attempt starts from the latest stored copy, so a conflicting
    /// writer's node changes are kept. `None` means the sensor stopped
    /// waiting before the event could be applied.
    async fn resolve(
        &self,
        key: &str,
        dependency: &str,
        event: &NodeEvent,
        now: DateTime<Utc>,
    ) -> Result<Option<Vec<String>>, String> {
        let mut attempt = 0;
        loop {
            let mut sensor = match self.store.get(key).await {
                Ok(sensor) => sensor,
                Err(StoreError::NotFound(_)) => return Ok(None),
                Err(e) => return Err(e.to_string()),
            };
            if !is_waiting_on(&sensor, dependency) {
                return Ok(None);
            }
            let fired =
                apply_event(&mut sensor, dependency, event.clone(), now).map_err(|e| e.to_string())?;

            match self.store.update(&sensor).await {
                Ok(_) => return Ok(Some(fired)),
                Err(err) if err.is_conflict() && self.retry.allows(attempt) => {
                    let delay = self.retry.delay(attempt);
                    attempt += 1;
                    tracing::debug!(
                        sensor = %key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "{err}; re-applying event on latest version"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err.to_string()),
            }
        }
    }
}

#[async_trait]
impl Dispatcher for SensorDispatcher {
    async fn dispatch(&self, source_name: &str, payload: Bytes) -> Result<(), DispatchError> {
        let dependency = dependency_name(&self.gateway, source_name);
        let now = Utc::now();
        let event = NodeEvent {
            source: source_name.to_owned(),
            payload: String::from_utf8_lossy(&payload).into_owned(),
            received_at: now,
        };

        let mut delivered = 0usize;
        let mut failures = Vec::new();
        for sensor in self.store.list().await {
            if !is_waiting_on(&sensor, &dependency) {
                continue;
            }
            let key = sensor.key();
            match self.resolve(&key, &dependency, &event, now).await {
                Ok(Some(fired)) => {
                    delivered += 1;
                    for trigger in &fired {
                        tracing::info!(sensor = %key, trigger = %trigger, "firing trigger");
                    }
                }
                Ok(None) => {}
                Err(e) => failures.push(format!("{key}: {e}")),
            }
        }

        if delivered == 0 && failures.is_empty() {
            tracing::debug!(dependency = %dependency, "no sensor is waiting on this event");
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(DispatchError::new(source_name, failures.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventgate_core::{Container, DeploySpec, EventDependency, SensorSpec, Trigger};

    fn active_sensor(name: &str, deps: &[&str], triggers: &[&str]) -> Sensor {
        let mut s = Sensor::new(
            name,
            SensorSpec {
                dependencies: deps
                    .iter()
                    .map(|n| EventDependency { name: (*n).to_owned() })
                    .collect(),
                triggers: triggers
                    .iter()
                    .map(|n| Trigger { name: (*n).to_owned() })
                    .collect(),
                deploy: DeploySpec {
                    containers: vec![Container {
                        name: "sensor".to_owned(),
                        image: "eventgate/sensor".to_owned(),
                        env: Vec::new(),
                    }],
                    ..DeploySpec::default()
                },
            },
        );
        let now = Utc::now();
        for d in deps {
            s.initialize_node(d, NodeType::EventDependency, NodePhase::Active, None, now);
        }
        for t in triggers {
            s.initialize_node(t, NodeType::Trigger, NodePhase::New, None, now);
        }
        s.mark_phase(ResourcePhase::Active, false, Some("listening for events"), now);
        s
    }

    fn event(payload: &str) -> NodeEvent {
        NodeEvent {
            source: "a".to_owned(),
            payload: payload.to_owned(),
            received_at: Utc::now(),
        }
    }

    // ── 1. last_dependency_fires_triggers ───────────────────────────

    #[test]
    fn last_dependency_fires_triggers() {
        let mut s = active_sensor("s1", &["gw:a", "gw:b"], &["t1", "t2"]);

        let fired = apply_event(&mut s, "gw:a", event("x"), Utc::now()).expect("apply");
        assert!(fired.is_empty());
        assert_eq!(s.node_by_name("gw:a").expect("node").phase, NodePhase::Success);
        assert_eq!(s.node_by_name("t1").expect("node").phase, NodePhase::New);

        let fired = apply_event(&mut s, "gw:b", event("y"), Utc::now()).expect("apply");
        assert_eq!(fired, vec!["t1".to_owned(), "t2".to_owned()]);
        assert!(s.are_all_nodes_success(NodeType::Trigger));
        assert_eq!(
            s.node_by_name("gw:b").and_then(|n| n.last_event.as_ref()).map(|e| e.payload.as_str()),
            Some("y")
        );
    }

    // ── 2. unknown_dependency_is_a_graph_error ──────────────────────

    #[test]
    fn unknown_dependency_is_a_graph_error() {
        let mut s = active_sensor("s1", &["gw:a"], &[]);
        assert_eq!(
            apply_event(&mut s, "gw:z", event("x"), Utc::now()),
            Err(GraphError::UninitializedNode("gw:z".to_owned()))
        );
    }

    // ── 3. waiting_requires_active_sensor_and_node ──────────────────

    #[test]
    fn waiting_requires_active_sensor_and_node() {
        let mut s = active_sensor("s1", &["gw:a"], &["t1"]);
        assert!(is_waiting_on(&s, "gw:a"));
        assert!(!is_waiting_on(&s, "t1"));
        assert!(!is_waiting_on(&s, "gw:b"));

        apply_event(&mut s, "gw:a", event("x"), Utc::now()).expect("apply");
        assert!(!is_waiting_on(&s, "gw:a"));

        let mut fresh = active_sensor("s2", &["gw:a"], &[]);
        fresh.status.phase = ResourcePhase::New;
        assert!(!is_waiting_on(&fresh, "gw:a"));
    }

    // ── 4. dispatch_updates_waiting_sensors ─────────────────────────

    #[tokio::test]
    async fn dispatch_updates_waiting_sensors() {
        let store = Arc::new(MemoryStore::new());
        store.create(active_sensor("s1", &["gw:a"], &["t1"])).await.expect("create");
        store.create(active_sensor("s2", &["gw:b"], &[])).await.expect("create");
        let dispatcher = SensorDispatcher::new("gw", store.clone(), RetryPolicy::default());

        dispatcher
            .dispatch("a", Bytes::from_static(b"hello"))
            .await
            .expect("dispatch");

        let s1 = store.get("s1").await.expect("s1");
        assert_eq!(s1.node_by_name("gw:a").expect("node").phase, NodePhase::Success);
        assert_eq!(s1.node_by_name("t1").expect("node").phase, NodePhase::Success);
        assert_eq!(
            s1.node_by_name("gw:a").and_then(|n| n.last_event.as_ref()).map(|e| e.payload.as_str()),
            Some("hello")
        );

        let s2 = store.get("s2").await.expect("s2");
        assert_eq!(s2.metadata.resource_version, 1);
    }

    // ── 5. unrouted_event_is_not_an_error ───────────────────────────

    #[tokio::test]
    async fn unrouted_event_is_not_an_error() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = SensorDispatcher::new("gw", store, RetryPolicy::default());
        dispatcher
            .dispatch("nobody", Bytes::from_static(b"x"))
            .await
            .expect("dropped quietly");
    }

    // ── 6. concurrent_events_both_resolve ───────────────────────────

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_events_both_resolve() {
        for round in 0..100 {
            let store = Arc::new(MemoryStore::new());
            store
                .create(active_sensor("s1", &["gw:a", "gw:b"], &["t1"]))
                .await
                .expect("create");
            let dispatcher = Arc::new(SensorDispatcher::new("gw", store.clone(), RetryPolicy::default()));

            let first = {
                let d = dispatcher.clone();
                tokio::spawn(async move { d.dispatch("a", Bytes::from_static(b"1")).await })
            };
            let second = {
                let d = dispatcher.clone();
                tokio::spawn(async move { d.dispatch("b", Bytes::from_static(b"2")).await })
            };
            first.await.expect("join").expect("dispatch a");
            second.await.expect("join").expect("dispatch b");

            let s1 = store.get("s1").await.expect("s1");
            for dep in ["gw:a", "gw:b"] {
                assert_eq!(
                    s1.node_by_name(dep).expect("node").phase,
                    NodePhase::Success,
                    "round {round}: {dep} lost"
                );
            }
            assert_eq!(s1.node_by_name("t1").expect("node").phase, NodePhase::Success);
        }
    }

    // ── 7. stale_copy_does_not_undo_resolution ──────────────────────

    #[tokio::test]
    async fn stale_copy_does_not_undo_resolution() {
        let store = Arc::new(MemoryStore::new());
        store
            .create(active_sensor("s1", &["gw:a", "gw:b"], &[]))
            .await
            .expect("create");
        let dispatcher = SensorDispatcher::new("gw", store.clone(), RetryPolicy::default());

        // Another writer resolves gw:a first.
        let mut other = store.get("s1").await.expect("s1");
        apply_event(&mut other, "gw:a", event("x"), Utc::now()).expect("apply");
        store.update(&other).await.expect("update");

        let fired = dispatcher
            .resolve("s1", "gw:b", &event("y"), Utc::now())
            .await
            .expect("resolve");
        assert_eq!(fired, Some(Vec::new()));

        let s1 = store.get("s1").await.expect("s1");
        assert_eq!(s1.node_by_name("gw:a").expect("node").phase, NodePhase::Success);
        assert_eq!(s1.node_by_name("gw:b").expect("node").phase, NodePhase::Success);
        assert_eq!(
            dispatcher.resolve("s1", "gw:b", &event("z"), Utc::now()).await,
            Ok(None)
        );
    }
}
