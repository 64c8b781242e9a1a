//! Sensor reconciliation pass.
//!
//! One pass drives a sensor one step through its lifecycle:
//!
//! ```text
//! New ──validate, init nodes, provision──▶ Active ──all nodes Success──▶ Complete
//!  │                                                                       │
//!  └──validation failure──▶ Error                    New ◀──re-run─────────┘
//! ```
//!
//! The pass works on a private copy of the sensor. Internal faults (graph
//! invariant violations and panics) are recovered into the `Error` phase
//! and the pass still persists. Persistence goes through
//! [`persist_status`], which retries version conflicts.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;

use eventgate_core::{
    GraphError, NodePhase, NodeType, ResourcePhase, Sensor, validate_sensor,
};

use crate::backoff::RetryPolicy;
use crate::error::{Fault, ProvisionError, ReconcileError};
use crate::persist::persist_status;
use crate::provision::{Provisioner, provision};
use crate::store::ResourceStore;

pub const MSG_NODE_ACTIVE: &str = "node is active";
pub const MSG_LISTENING: &str = "listening for events";

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilerConfig {
    /// Injected into sensor deployments so they can find their controller.
    pub instance_id: String,
    pub retry: RetryPolicy,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            instance_id: "eventgate-controller".to_owned(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    /// The stored copy when persisted, otherwise the pass's working copy.
    pub sensor: Sensor,
    /// Whether the pass changed anything.
    pub updated: bool,
    pub persisted: bool,
    /// Internal fault recovered during the pass, if any.
    pub fault: Option<Fault>,
}

enum PassError {
    Fault(Fault),
    Provision(ProvisionError),
}

impl From<GraphError> for PassError {
    fn from(err: GraphError) -> Self {
        Self::Fault(err.into())
    }
}

impl From<ProvisionError> for PassError {
    fn from(err: ProvisionError) -> Self {
        Self::Provision(err)
    }
}

pub struct SensorReconciler {
    store: Arc<dyn ResourceStore>,
    provisioner: Arc<dyn Provisioner>,
    config: ReconcilerConfig,
    /// Runs between provisioning and node activation.
    #[cfg(test)]
    after_provision: Option<fn(&mut Sensor)>,
}

impl SensorReconciler {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        provisioner: Arc<dyn Provisioner>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            provisioner,
            config,
            #[cfg(test)]
            after_provision: None,
        }
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Run one pass over `sensor` and persist the result if it changed.
    ///
    /// Never fails because of an internal fault; those come back in
    /// [`ReconcileOutcome::fault`] with the sensor in `Error`. A provisioning
    /// failure is returned after whatever the pass changed was persisted.
    pub async fn reconcile(&self, sensor: &Sensor) -> Result<ReconcileOutcome, ReconcileError> {
        let key = sensor.key();
        let mut working = sensor.clone();

        let pass = AssertUnwindSafe(self.operate(&mut working))
            .catch_unwind()
            .await;
        let (fault, failure) = match pass {
            Ok(Ok(())) => (None, None),
            Ok(Err(PassError::Fault(fault))) => (Some(fault), None),
            Ok(Err(PassError::Provision(err))) => (None, Some(err)),
            Err(payload) => (Some(Fault::from_panic(payload)), None),
        };

        if let Some(fault) = &fault {
            tracing::error!(sensor = %key, kind = %fault.kind, "recovered from fault: {}", fault.message);
            working.mark_phase(ResourcePhase::Error, true, Some(&fault.message), Utc::now());
        }
        if let Some(err) = &failure {
            tracing::error!(sensor = %key, "failed to provision sensor: {err}");
        }

        let updated = working != *sensor;
        let mut outcome = ReconcileOutcome {
            sensor: working,
            updated,
            persisted: false,
            fault,
        };
        if updated {
            outcome.sensor =
                persist_status(self.store.as_ref(), &outcome.sensor, &self.config.retry).await?;
            outcome.persisted = true;
        }

        match failure {
            Some(err) => Err(err.into()),
            None => Ok(outcome),
        }
    }

    async fn operate(&self, sensor: &mut Sensor) -> Result<(), PassError> {
        let now = Utc::now();
        match sensor.status.phase {
            ResourcePhase::New => self.activate(sensor, now).await?,

            ResourcePhase::Active => {
                if sensor.are_all_nodes_success(NodeType::EventDependency)
                    && sensor.are_all_nodes_success(NodeType::Trigger)
                {
                    tracing::info!(sensor = %sensor.key(), "all nodes succeeded, marking sensor complete");
                    sensor.mark_phase(ResourcePhase::Complete, true, None, now);
                }
            }

            ResourcePhase::Error => {
                tracing::debug!(sensor = %sensor.key(), "sensor is in error state");
            }

            ResourcePhase::Complete => {
                sensor.status.completion_count += 1;
                tracing::info!(
                    sensor = %sensor.key(),
                    completions = sensor.status.completion_count,
                    "resetting nodes and re-running sensor"
                );
                sensor.reset_nodes();
                sensor.mark_phase(ResourcePhase::New, false, None, now);
            }
        }
        Ok(())
    }

    async fn activate(&self, sensor: &mut Sensor, now: DateTime<Utc>) -> Result<(), PassError> {
        if let Err(err) = validate_sensor(sensor) {
            // Validation is deterministic; the Error phase keeps later passes
            // from retrying this generation.
            tracing::error!(sensor = %sensor.key(), "failed to validate sensor: {err}");
            sensor.mark_phase(ResourcePhase::Error, true, Some(&err.to_string()), now);
            return Ok(());
        }

        let dependencies: Vec<String> =
            sensor.spec.dependencies.iter().map(|d| d.name.clone()).collect();
        let triggers: Vec<String> = sensor.spec.triggers.iter().map(|t| t.name.clone()).collect();

        for name in &dependencies {
            init_node(sensor, name, NodeType::EventDependency, now);
        }
        for name in &triggers {
            init_node(sensor, name, NodeType::Trigger, now);
        }

        provision(self.provisioner.as_ref(), sensor, &self.config.instance_id).await?;
        #[cfg(test)]
        if let Some(hook) = self.after_provision {
            hook(sensor);
        }

        for name in &dependencies {
            sensor.mark_node_phase(name, NodePhase::Active, Some(MSG_NODE_ACTIVE), now)?;
        }

        tracing::info!(sensor = %sensor.key(), "marking sensor as active");
        sensor.mark_phase(ResourcePhase::Active, false, Some(MSG_LISTENING), now);
        Ok(())
    }
}

fn init_node(sensor: &mut Sensor, name: &str, node_type: NodeType, now: DateTime<Utc>) {
    let init = sensor.initialize_node(name, node_type, NodePhase::New, None, now);
    if init.created {
        tracing::debug!(sensor = %sensor.key(), node = %name, %node_type, id = %init.id, "node is initialized");
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
