//! Error types for the source lifecycle.

use thiserror::Error;

/// Failure of a single event source, at any stage of its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// Raw config could not be parsed. Not retryable.
    #[error("failed to parse event source config: {0}")]
    ConfigParse(String),

    /// Config parsed but is semantically invalid. Not retryable.
    #[error("invalid event source: {0}")]
    Validation(String),

    /// Transport could not reach a ready state.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Transport fault after the stream started.
    #[error("event stream failed: {0}")]
    Stream(String),

    /// The executor validates this source type but has no transport for it.
    #[error("source type {0} has no transport in this gateway")]
    Unsupported(String),
}

/// The dispatcher could not deliver an event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to dispatch event from {source_name}: {reason}")]
pub struct DispatchError {
    pub source_name: String,
    pub reason: String,
}

impl DispatchError {
    pub fn new(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }
}

/// A needed source whose connection could not be set up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectFailure {
    pub key: String,
    pub error: SourceError,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManagerError {
    /// One or more new sources could not connect; every other source was
    /// still reconciled.
    #[error("{} event source(s) failed to connect: {}", .0.len(), describe(.0))]
    Connection(Vec<ConnectFailure>),
}

fn describe(failures: &[ConnectFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.key, f.error))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manager_error_lists_failures() {
        let err = ManagerError::Connection(vec![
            ConnectFailure {
                key: "a".to_owned(),
                error: SourceError::Connection("refused".to_owned()),
            },
            ConnectFailure {
                key: "b".to_owned(),
                error: SourceError::Connection("timed out".to_owned()),
            },
        ]);
        assert_eq!(
            err.to_string(),
            "2 event source(s) failed to connect: a (connection failed: refused), \
             b (connection failed: timed out)"
        );
    }
}
