//! eventgate-sources: executors for the built-in source types.
//!
//! `file` sources run in-process. The broker and object-store types are
//! validated here and started by an external transport.

pub mod config;
pub mod file;
pub mod s3;
pub mod storagegrid;
pub mod stream;

use std::sync::Arc;

use eventgate_gateway::SourceExecutor;

pub use config::{ConfigOnly, SourceConfig, parse, validate_config};
pub use file::{FileConfig, FileExecutor};
pub use s3::S3Config;
pub use storagegrid::StorageGridConfig;
pub use stream::{AmqpConfig, MqttConfig, NatsConfig};

/// Every source type name this crate knows.
pub const SOURCE_TYPES: &[&str] = &["file", "s3", "amqp", "nats", "mqtt", "storagegrid"];

/// Executor for `source_type`, if it is a known type.
pub fn executor_for(source_type: &str) -> Option<Arc<dyn SourceExecutor>> {
    let executor: Arc<dyn SourceExecutor> = match source_type {
        "file" => Arc::new(FileExecutor),
        "s3" => Arc::new(ConfigOnly::<S3Config>::new()),
        "amqp" => Arc::new(ConfigOnly::<AmqpConfig>::new()),
        "nats" => Arc::new(ConfigOnly::<NatsConfig>::new()),
        "mqtt" => Arc::new(ConfigOnly::<MqttConfig>::new()),
        "storagegrid" => Arc::new(ConfigOnly::<StorageGridConfig>::new()),
        _ => return None,
    };
    Some(executor)
}
