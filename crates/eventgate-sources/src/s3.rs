//! S3 bucket notification sources.

use serde::Deserialize;
use serde_yaml::Value;

use crate::config::{SourceConfig, is_blank};

/// Notification event types an S3-compatible server can publish.
pub const KNOWN_EVENTS: &[&str] = &[
    "s3:ObjectCreated:*",
    "s3:ObjectCreated:Put",
    "s3:ObjectCreated:Post",
    "s3:ObjectCreated:Copy",
    "s3:ObjectCreated:CompleteMultipartUpload",
    "s3:ObjectAccessed:*",
    "s3:ObjectAccessed:Get",
    "s3:ObjectAccessed:Head",
    "s3:ObjectRemoved:*",
    "s3:ObjectRemoved:Delete",
    "s3:ObjectRemoved:DeleteMarkerCreated",
    "s3:ReducedRedundancyLostObject",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3EventConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub event: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Config {
    pub s3_event_config: Option<S3EventConfig>,
    /// Secret selector for the access key; only its presence is checked.
    pub access_key: Option<Value>,
    pub secret_key: Option<Value>,
    #[serde(default)]
    pub insecure: bool,
}

impl SourceConfig for S3Config {
    const SOURCE_TYPE: &'static str = "s3";

    fn check(&self) -> Result<(), String> {
        let Some(bucket) = &self.s3_event_config else {
            return Err("s3 bucket configuration can't be empty".to_owned());
        };
        if is_blank(&self.access_key) {
            return Err("access key can't be empty".to_owned());
        }
        if is_blank(&self.secret_key) {
            return Err("secret key can't be empty".to_owned());
        }
        if bucket.endpoint.is_empty() {
            return Err("endpoint url can't be empty".to_owned());
        }
        if bucket.bucket.is_empty() {
            return Err("bucket name can't be empty".to_owned());
        }
        if !bucket.event.is_empty() && !KNOWN_EVENTS.contains(&bucket.event.as_str()) {
            return Err(format!("unknown event {}", bucket.event));
        }
        Ok(())
    }
}
