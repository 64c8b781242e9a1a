//! Event source definitions and the statuses their workers publish.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::SourceId;

// ─── Event Source Definition ──────────────────────────────────────

/// One declared event source: a human key and an opaque raw config.
///
/// The config is interpreted only by the source-type executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSourceDefinition {
    pub key: String,
    pub raw_config: String,
}

impl EventSourceDefinition {
    pub fn new(key: impl Into<String>, raw_config: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            raw_config: raw_config.into(),
        }
    }

    pub fn id(&self) -> SourceId {
        SourceId::derive(&self.key, &self.raw_config)
    }

    /// Build definitions from a full key → config snapshot, ordered by key.
    pub fn from_snapshot(snapshot: &BTreeMap<String, String>) -> Vec<Self> {
        snapshot
            .iter()
            .map(|(key, config)| Self::new(key.clone(), config.clone()))
            .collect()
    }
}

// ─── Source Status ────────────────────────────────────────────────

/// Phase carried by a status record on the outgoing status stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourcePhase {
    Error,
    Running,
    Completed,
    Removed,
}

impl SourcePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Removed => "removed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for SourcePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One transition of one source, as published on the status stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStatus {
    pub id: SourceId,
    pub phase: SourcePhase,
    pub message: String,
    pub display_name: String,
}

// ─── Worker Phase ─────────────────────────────────────────────────

/// Lifecycle of a single source worker.
///
/// `Connecting → Validating → Running → {Completed | Error | Removed}`.
/// `Error` and `Removed` are also reachable from the two setup phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerPhase {
    Connecting,
    Validating,
    Running,
    Completed,
    Error,
    Removed,
}

impl WorkerPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error | Self::Removed)
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: WorkerPhase) -> bool {
        use WorkerPhase::*;
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, Removed | Error) => true,
            (Connecting, Validating) => true,
            (Validating, Running) => true,
            (Running, Completed) => true,
            _ => false,
        }
    }

    /// Status phase published when entering this worker phase, if any.
    ///
    /// The setup phases are internal and publish nothing.
    pub fn published(self) -> Option<SourcePhase> {
        match self {
            Self::Connecting | Self::Validating => None,
            Self::Running => Some(SourcePhase::Running),
            Self::Completed => Some(SourcePhase::Completed),
            Self::Error => Some(SourcePhase::Error),
            Self::Removed => Some(SourcePhase::Removed),
        }
    }
}

impl fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Validating => "validating",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Removed => "removed",
        };
        f.write_str(s)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
