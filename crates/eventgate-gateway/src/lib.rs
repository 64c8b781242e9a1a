//! eventgate-gateway: keeps a live fleet of source workers in sync with the
//! declared set of event sources.
//!
//! The [`EventSourceManager`] diffs each declared snapshot against its
//! registry, tears down removed sources and spawns one [`SourceWorker`] per
//! new source. Workers validate, stream and dispatch events, and publish
//! their transitions on a single status channel.

pub mod connector;
pub mod dispatch;
pub mod error;
pub mod manager;
pub mod status;
pub mod worker;

pub use connector::{
    Connector, EventStream, LocalConnector, SourceConnection, SourceExecutor,
};
pub use dispatch::Dispatcher;
pub use error::{ConnectFailure, DispatchError, ManagerError, SourceError};
pub use manager::{ActiveSource, EventSourceManager, ManagerConfig, ReconcileSummary};
pub use status::StatusReporter;
pub use worker::SourceWorker;

pub use eventgate_core::types;
