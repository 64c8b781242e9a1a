//! Source executor contract and the connection boundary in front of it.
//!
//! A [`SourceExecutor`] knows one source type: how to validate a raw config
//! and how to start its event stream. The manager never talks to an executor
//! directly; it dials a [`SourceConnection`] through a [`Connector`], so an
//! executor may live in-process ([`LocalConnector`]) or behind a transport.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

use eventgate_core::types::EventSourceDefinition;

use crate::error::SourceError;

/// Lazy sequence of raw events. Ends cleanly with `None`; not restartable.
pub type EventStream = BoxStream<'static, Result<Bytes, SourceError>>;

/// Validate/start capability of one source type.
#[async_trait]
pub trait SourceExecutor: Send + Sync {
    /// Source type name, e.g. `"file"`.
    fn source_type(&self) -> &str;

    async fn validate(&self, raw_config: &str) -> Result<(), SourceError>;

    async fn start(&self, raw_config: &str) -> Result<EventStream, SourceError>;
}

/// An established connection to the executor serving one source.
#[async_trait]
pub trait SourceConnection: Send + Sync {
    /// Whether the connection can carry requests right now.
    fn is_ready(&self) -> bool;

    async fn validate(&self, source: &EventSourceDefinition) -> Result<(), SourceError>;

    async fn start(&self, source: &EventSourceDefinition) -> Result<EventStream, SourceError>;

    /// Close the connection. Closing twice is a no-op.
    async fn close(&self) -> Result<(), SourceError>;
}

/// Dials connections for source definitions.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        source: &EventSourceDefinition,
    ) -> Result<Arc<dyn SourceConnection>, SourceError>;
}

// ─── Local ───────────────────────────────────────────────────────────

/// Connector for an executor running in the same process.
///
/// Every connection is ready on creation and stays ready until closed.
pub struct LocalConnector {
    executor: Arc<dyn SourceExecutor>,
}

impl LocalConnector {
    pub fn new(executor: Arc<dyn SourceExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl Connector for LocalConnector {
    async fn connect(
        &self,
        _source: &EventSourceDefinition,
    ) -> Result<Arc<dyn SourceConnection>, SourceError> {
        Ok(Arc::new(LocalConnection {
            executor: Arc::clone(&self.executor),
            open: AtomicBool::new(true),
        }))
    }
}

struct LocalConnection {
    executor: Arc<dyn SourceExecutor>,
    open: AtomicBool,
}

impl LocalConnection {
    fn ensure_open(&self) -> Result<(), SourceError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(SourceError::Connection("connection is closed".to_owned()))
        }
    }
}

#[async_trait]
impl SourceConnection for LocalConnection {
    fn is_ready(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn validate(&self, source: &EventSourceDefinition) -> Result<(), SourceError> {
        self.ensure_open()?;
        self.executor.validate(&source.raw_config).await
    }

    async fn start(&self, source: &EventSourceDefinition) -> Result<EventStream, SourceError> {
        self.ensure_open()?;
        self.executor.start(&source.raw_config).await
    }

    async fn close(&self) -> Result<(), SourceError> {
        self.open.store(false, Ordering::Release);
        Ok(())
    }
}
