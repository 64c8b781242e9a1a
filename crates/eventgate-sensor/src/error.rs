//! Error and fault types for sensor reconciliation.

use std::any::Any;
use std::fmt;

use thiserror::Error;

use eventgate_core::GraphError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The stored version moved on since the caller read it.
    #[error("conflict on {key}: expected version {expected}, found {actual}")]
    Conflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error("sensor {0} not found")]
    NotFound(String),

    #[error("sensor {0} already exists")]
    AlreadyExists(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisionError {
    #[error("failed to create deployment {name}: {reason}")]
    Deployment { name: String, reason: String },

    #[error("failed to create service {name}: {reason}")]
    Service { name: String, reason: String },

    #[error("deploy template of {0} has no containers")]
    NoContainers(String),
}

/// Failures a reconciliation pass reports to its caller.
///
/// Internal faults never surface here: they are recovered into the
/// sensor's `Error` phase and returned as a [`Fault`] in the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// Backing resources could not be created; the pass persisted what it
    /// had and the next pass will try again.
    #[error(transparent)]
    Provision(#[from] ProvisionError),

    /// The status write failed for a reason other than a retried conflict,
    /// or conflicts outlasted the retry budget.
    #[error("failed to persist sensor status: {0}")]
    Persist(#[from] StoreError),
}

// ─── Fault ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// A graph invariant was violated inside the pass.
    Internal,
    /// The pass panicked.
    Panic,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal => f.write_str("internal"),
            Self::Panic => f.write_str("panic"),
        }
    }
}

/// A recovered internal fault, captured as data instead of unwinding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    pub kind: FaultKind,
    pub message: String,
}

impl Fault {
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(msg) = payload.downcast_ref::<&'static str>() {
            (*msg).to_owned()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "unknown panic".to_owned()
        };
        Self {
            kind: FaultKind::Panic,
            message,
        }
    }
}

impl From<GraphError> for Fault {
    fn from(err: GraphError) -> Self {
        Self {
            kind: FaultKind::Internal,
            message: err.to_string(),
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} fault: {}", self.kind, self.message)
    }
}
