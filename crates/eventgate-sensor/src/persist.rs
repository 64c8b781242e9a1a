//! Conflict-retry persistence of a sensor's status.
//!
//! Several writers race on the same sensor's status. On a version conflict
//! the latest stored sensor is re-read, this writer's status is laid over
//! it, and the write is retried under a [`RetryPolicy`]. Any other error
//! aborts at once.

use eventgate_core::Sensor;

use crate::backoff::RetryPolicy;
use crate::error::StoreError;
use crate::store::ResourceStore;

/// Write `sensor`, retrying conflicts. Returns the stored copy.
///
/// Past the retry budget the last conflict is returned.
pub async fn persist_status(
    store: &dyn ResourceStore,
    sensor: &Sensor,
    policy: &RetryPolicy,
) -> Result<Sensor, StoreError> {
    let key = sensor.key();
    let mut candidate = sensor.clone();
    let mut attempt = 0;
    loop {
        match store.update(&candidate).await {
            Ok(stored) => {
                tracing::info!(
                    sensor = %key,
                    phase = %stored.status.phase,
                    version = stored.metadata.resource_version,
                    "sensor state updated successfully"
                );
                return Ok(stored);
            }
            Err(err) if err.is_conflict() && policy.allows(attempt) => {
                let delay = policy.delay(attempt);
                attempt += 1;
                tracing::warn!(
                    sensor = %key,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "{err}; re-applying status on latest version"
                );
                tokio::time::sleep(delay).await;
                let mut latest = store.get(&key).await?;
                latest.status = sensor.status.clone();
                candidate = latest;
            }
            Err(err) => {
                tracing::warn!(sensor = %key, attempt, "error updating sensor: {err}");
                return Err(err);
            }
        }
    }
}
