//! eventgate-sensor: sensor reconciliation.
//!
//! The [`SensorReconciler`] drives one sensor through
//! `New → Active → Complete → New` per pass and persists through a
//! [`ResourceStore`] with conflict retries. [`SensorController`] turns store
//! notifications into serialized per-sensor passes.

pub mod backoff;
pub mod controller;
pub mod error;
pub mod persist;
pub mod provision;
pub mod reconciler;
pub mod store;

pub use backoff::RetryPolicy;
pub use controller::SensorController;
pub use error::{Fault, FaultKind, ProvisionError, ReconcileError, StoreError};
pub use persist::persist_status;
pub use provision::{Deployment, MemoryProvisioner, Provisioned, Provisioner, Service, provision};
pub use reconciler::{ReconcileOutcome, ReconcilerConfig, SensorReconciler};
pub use store::{MemoryStore, ResourceStore};
