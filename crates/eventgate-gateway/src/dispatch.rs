//! Outgoing boundary for events read from sources.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::DispatchError;

/// Event sink for normalized source events.
///
/// Delivery is best-effort: a failed dispatch is logged by the worker and
/// the stream keeps going. There is no retry or buffering behind this call.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, source_name: &str, payload: Bytes) -> Result<(), DispatchError>;
}
