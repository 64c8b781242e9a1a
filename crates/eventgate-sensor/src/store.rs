//! Sensor resource store with optimistic concurrency.
//!
//! Every stored sensor carries a `resource_version`. An update succeeds only
//! when the caller's version matches the stored one; the store then bumps
//! the version and notifies watchers with the sensor's key.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};

use eventgate_core::Sensor;

use crate::error::StoreError;

const WATCH_BUFFER: usize = 256;

#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Latest stored version of the sensor under `key`.
    async fn get(&self, key: &str) -> Result<Sensor, StoreError>;

    /// Write `sensor` if its version is current. Returns the stored copy.
    async fn update(&self, sensor: &Sensor) -> Result<Sensor, StoreError>;
}

// ─── Memory ──────────────────────────────────────────────────────────

/// In-process store. Watchers receive the key of every created, updated
/// or deleted sensor.
pub struct MemoryStore {
    sensors: RwLock<BTreeMap<String, Sensor>>,
    events: broadcast::Sender<String>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_BUFFER);
        Self {
            sensors: RwLock::new(BTreeMap::new()),
            events,
        }
    }

    /// Add a new sensor at version 1.
    pub async fn create(&self, sensor: Sensor) -> Result<Sensor, StoreError> {
        let key = sensor.key();
        let mut sensors = self.sensors.write().await;
        if sensors.contains_key(&key) {
            return Err(StoreError::AlreadyExists(key));
        }
        let mut stored = sensor;
        stored.metadata.resource_version = 1;
        sensors.insert(key.clone(), stored.clone());
        drop(sensors);
        self.notify(key);
        Ok(stored)
    }

    /// Remove the sensor under `key`. Watchers see the key once more.
    pub async fn delete(&self, key: &str) -> Result<Sensor, StoreError> {
        let removed = self
            .sensors
            .write()
            .await
            .remove(key)
            .ok_or_else(|| StoreError::NotFound(key.to_owned()))?;
        self.notify(key.to_owned());
        Ok(removed)
    }

    /// All sensors, ordered by key.
    pub async fn list(&self) -> Vec<Sensor> {
        self.sensors.read().await.values().cloned().collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.events.subscribe()
    }

    fn notify(&self, key: String) {
        // No subscribers is fine.
        let _ = self.events.send(key);
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Sensor, StoreError> {
        self.sensors
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_owned()))
    }

    async fn update(&self, sensor: &Sensor) -> Result<Sensor, StoreError> {
        let key = sensor.key();
        let mut sensors = self.sensors.write().await;
        let current = sensors
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        let expected = sensor.metadata.resource_version;
        let actual = current.metadata.resource_version;
        if expected != actual {
            return Err(StoreError::Conflict {
                key,
                expected,
                actual,
            });
        }
        let mut stored = sensor.clone();
        stored.metadata.resource_version = actual + 1;
        *current = stored.clone();
        drop(sensors);
        self.notify(key);
        Ok(stored)
    }
}
