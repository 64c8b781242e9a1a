//! Sensor resource model and dependency graph transition rules.
//!
//! A [`Sensor`] declares event dependencies and triggers; its status holds
//! one [`NodeStatus`] per declared node, keyed by a hash of the node name.
//! All mutation helpers here are pure: they take `now` and report whether
//! anything changed so the reconciler knows when to persist.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::node_hash;

// ─── Constants ───────────────────────────────────────────────────────

/// Label and annotation key carrying the current sensor phase.
pub const LABEL_PHASE: &str = "sensors.eventgate.io/phase";

/// Label and annotation key set once a sensor reaches a terminal phase.
pub const LABEL_COMPLETE: &str = "sensors.eventgate.io/complete";

/// Label identifying the sensor that owns a backing resource.
pub const LABEL_SENSOR_NAME: &str = "sensors.eventgate.io/sensor-name";

/// Default port the sensor service exposes for incoming events.
pub const DEFAULT_SENSOR_PORT: u16 = 9300;

// ─── Phases ──────────────────────────────────────────────────────────

/// Phase of a whole sensor.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ResourcePhase {
    #[default]
    New,
    Active,
    Complete,
    Error,
}

impl ResourcePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Active => "Active",
            Self::Complete => "Complete",
            Self::Error => "Error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

impl fmt::Display for ResourcePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase of a single dependency or trigger node.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum NodePhase {
    #[default]
    New,
    Active,
    Success,
    Complete,
    Error,
}

impl NodePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Active => "Active",
            Self::Success => "Success",
            Self::Complete => "Complete",
            Self::Error => "Error",
        }
    }

    pub fn is_complete(self) -> bool {
        matches!(self, Self::Success | Self::Complete | Self::Error)
    }
}

impl fmt::Display for NodePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum NodeType {
    EventDependency,
    Trigger,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EventDependency => f.write_str("EventDependency"),
            Self::Trigger => f.write_str("Trigger"),
        }
    }
}

// ─── Node ────────────────────────────────────────────────────────────

/// Key into a sensor's node map: a hash of the declared node name.
///
/// Dependencies and triggers share one namespace, so a dependency and a
/// trigger with the same name map to the same ID. Names must be unique
/// across both kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn for_name(name: &str) -> Self {
        Self(node_hash(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Last event delivered to a dependency node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEvent {
    pub source: String,
    pub payload: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub id: NodeId,
    pub name: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub phase: NodePhase,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event: Option<NodeEvent>,
}

// ─── Spec ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDependency {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub env: Vec<EnvVar>,
}

/// Template for the deployment that receives the sensor's events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploySpec {
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    DEFAULT_SENSOR_PORT
}

impl Default for DeploySpec {
    fn default() -> Self {
        Self {
            containers: Vec::new(),
            port: DEFAULT_SENSOR_PORT,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorSpec {
    #[serde(default)]
    pub dependencies: Vec<EventDependency>,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
    #[serde(default)]
    pub deploy: DeploySpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    /// Optimistic-concurrency version, assigned by the store.
    #[serde(default)]
    pub resource_version: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorStatus {
    #[serde(default)]
    pub phase: ResourcePhase,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub nodes: BTreeMap<NodeId, NodeStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completion_count: u32,
}

/// A managed sensor resource: declared graph plus its persisted status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sensor {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: SensorSpec,
    #[serde(default)]
    pub status: SensorStatus,
}

// ─── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// A node was looked up before it was initialized for the current run.
    #[error("node {0} is uninitialized")]
    UninitializedNode(String),
}

// ─── Transition Results ──────────────────────────────────────────────

/// Result of [`Sensor::initialize_node`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInit {
    pub id: NodeId,
    /// `false` when the node already existed and was left untouched.
    pub created: bool,
}

// ─── Graph Operations ────────────────────────────────────────────────

impl Sensor {
    pub fn new(name: impl Into<String>, spec: SensorSpec) -> Self {
        Self {
            metadata: ObjectMeta {
                name: name.into(),
                ..ObjectMeta::default()
            },
            spec,
            status: SensorStatus::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Store key: `namespace/name`, or just the name when unnamespaced.
    pub fn key(&self) -> String {
        if self.metadata.namespace.is_empty() {
            self.metadata.name.clone()
        } else {
            format!("{}/{}", self.metadata.namespace, self.metadata.name)
        }
    }

    pub fn node_id(&self, node_name: &str) -> NodeId {
        NodeId::for_name(node_name)
    }

    pub fn node_by_name(&self, node_name: &str) -> Option<&NodeStatus> {
        self.status.nodes.get(&self.node_id(node_name))
    }

    /// Create a node in `phase` unless one with the same name exists.
    ///
    /// Re-initializing an existing node is a no-op returning its ID.
    pub fn initialize_node(
        &mut self,
        node_name: &str,
        node_type: NodeType,
        phase: NodePhase,
        message: Option<&str>,
        now: DateTime<Utc>,
    ) -> NodeInit {
        let id = self.node_id(node_name);
        if self.status.nodes.contains_key(&id) {
            return NodeInit { id, created: false };
        }
        let node = NodeStatus {
            id: id.clone(),
            name: node_name.to_owned(),
            display_name: node_name.to_owned(),
            node_type,
            phase,
            started_at: now,
            completed_at: None,
            message: message.unwrap_or_default().to_owned(),
            last_event: None,
        };
        self.status.nodes.insert(id.clone(), node);
        NodeInit { id, created: true }
    }

    /// Set the phase (and optionally the message) of an initialized node.
    ///
    /// Entering a complete phase stamps `completed_at` once; later calls
    /// leave the stamp alone. Returns whether the node changed.
    pub fn mark_node_phase(
        &mut self,
        node_name: &str,
        phase: NodePhase,
        message: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool, GraphError> {
        let id = self.node_id(node_name);
        let node = self
            .status
            .nodes
            .get_mut(&id)
            .ok_or_else(|| GraphError::UninitializedNode(node_name.to_owned()))?;

        let mut changed = false;
        if node.phase != phase {
            node.phase = phase;
            changed = true;
        }
        if let Some(message) = message {
            if node.message != message {
                node.message = message.to_owned();
                changed = true;
            }
        }
        if node.phase.is_complete() && node.completed_at.is_none() {
            node.completed_at = Some(now);
            changed = true;
        }
        Ok(changed)
    }

    /// Record the event that resolved a dependency node.
    pub fn record_node_event(&mut self, node_name: &str, event: NodeEvent) -> Result<(), GraphError> {
        let id = self.node_id(node_name);
        let node = self
            .status
            .nodes
            .get_mut(&id)
            .ok_or_else(|| GraphError::UninitializedNode(node_name.to_owned()))?;
        node.last_event = Some(event);
        Ok(())
    }

    /// Whether every node of `node_type` is in phase `Success`.
    ///
    /// Vacuously true when there are no such nodes.
    pub fn are_all_nodes_success(&self, node_type: NodeType) -> bool {
        self.status
            .nodes
            .values()
            .filter(|n| n.node_type == node_type)
            .all(|n| n.phase == NodePhase::Success)
    }

    /// Nodes of `node_type`, ordered by name.
    pub fn nodes_of(&self, node_type: NodeType) -> Vec<&NodeStatus> {
        let mut nodes: Vec<&NodeStatus> = self
            .status
            .nodes
            .values()
            .filter(|n| n.node_type == node_type)
            .collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        nodes
    }

    /// Move the sensor to `phase`, keeping labels, annotations and
    /// timestamps in step. Returns whether anything changed.
    ///
    /// `mark_complete` stamps `completed_at` and the complete label when
    /// the sensor has just entered `Complete` or `Error`; every node that
    /// has no `completed_at` yet is stamped too.
    pub fn mark_phase(
        &mut self,
        phase: ResourcePhase,
        mark_complete: bool,
        message: Option<&str>,
        now: DateTime<Utc>,
    ) -> bool {
        let mut changed = false;
        let just_entered = self.status.phase != phase;
        if just_entered {
            self.status.phase = phase;
            self.metadata
                .labels
                .insert(LABEL_PHASE.to_owned(), phase.as_str().to_owned());
            self.metadata
                .annotations
                .insert(LABEL_PHASE.to_owned(), phase.as_str().to_owned());
            changed = true;
        }
        if self.status.started_at.is_none() {
            self.status.started_at = Some(now);
            changed = true;
        }
        if let Some(message) = message {
            if self.status.message != message {
                self.status.message = message.to_owned();
                changed = true;
            }
        }
        if phase.is_terminal() && mark_complete && just_entered {
            self.status.completed_at = Some(now);
            self.metadata
                .labels
                .insert(LABEL_COMPLETE.to_owned(), "true".to_owned());
            self.metadata
                .annotations
                .insert(LABEL_COMPLETE.to_owned(), phase.as_str().to_owned());
            for node in self.status.nodes.values_mut() {
                if node.completed_at.is_none() {
                    node.completed_at = Some(now);
                }
            }
            changed = true;
        }
        changed
    }

    /// Drop every node, ready for the next run.
    pub fn reset_nodes(&mut self) {
        self.status.nodes.clear();
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
