//! Raw config parsing shared by every source type.
//!
//! Raw configs are YAML documents. A document that does not parse is a
//! `ConfigParse` error; one that parses but fails its type's checks is a
//! `Validation` error carrying the check's message.

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_yaml::Value;

use eventgate_gateway::{EventStream, SourceError, SourceExecutor};

/// A typed source config with its semantic checks.
pub trait SourceConfig: DeserializeOwned + Send + Sync + 'static {
    const SOURCE_TYPE: &'static str;

    /// Semantic checks; the error is the user-facing reason.
    fn check(&self) -> Result<(), String>;
}

/// Parse a raw YAML config without checking it.
pub fn parse<C: DeserializeOwned>(raw_config: &str) -> Result<C, SourceError> {
    if raw_config.trim().is_empty() {
        return Err(SourceError::Validation(
            "configuration must be non empty".to_owned(),
        ));
    }
    serde_yaml::from_str(raw_config).map_err(|e| SourceError::ConfigParse(e.to_string()))
}

/// Parse and check a raw config.
pub fn validate_config<C: SourceConfig>(raw_config: &str) -> Result<C, SourceError> {
    let config: C = parse(raw_config)?;
    config.check().map_err(SourceError::Validation)?;
    Ok(config)
}

/// Whether an untyped field is absent, null or an empty string.
pub(crate) fn is_blank(value: &Option<Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

/// Executor for a source type whose transport lives outside this gateway.
///
/// Validates configs fully; starting one fails with `Unsupported`.
pub struct ConfigOnly<C> {
    _config: PhantomData<fn() -> C>,
}

impl<C> Default for ConfigOnly<C> {
    fn default() -> Self {
        Self {
            _config: PhantomData,
        }
    }
}

impl<C: SourceConfig> ConfigOnly<C> {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<C: SourceConfig> SourceExecutor for ConfigOnly<C> {
    fn source_type(&self) -> &str {
        C::SOURCE_TYPE
    }

    async fn validate(&self, raw_config: &str) -> Result<(), SourceError> {
        validate_config::<C>(raw_config).map(|_| ())
    }

    async fn start(&self, raw_config: &str) -> Result<EventStream, SourceError> {
        validate_config::<C>(raw_config)?;
        Err(SourceError::Unsupported(C::SOURCE_TYPE.to_owned()))
    }
}
