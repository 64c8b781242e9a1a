//! eventgate-core: pure domain model for the eventgate control plane.
//!
//! Source definitions and their content-addressed identities, the active
//! source registry diff, and the per-sensor dependency graph with its
//! phase transition rules. No async, no IO; callers pass `now` explicitly.

pub mod graph;
pub mod identity;
pub mod registry;
pub mod types;
pub mod validate;

pub use graph::{
    Container, DeploySpec, EnvVar, EventDependency, GraphError, NodeEvent, NodeId, NodeInit,
    NodePhase, NodeStatus, NodeType, ObjectMeta, ResourcePhase, Sensor, SensorSpec, SensorStatus,
    Trigger,
};
pub use identity::SourceId;
pub use registry::{SourceDiff, SourceRegistry, diff};
pub use types::{EventSourceDefinition, SourcePhase, SourceStatus, WorkerPhase};
pub use validate::{ValidationError, validate_sensor};
