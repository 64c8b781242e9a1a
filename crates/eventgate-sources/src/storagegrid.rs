//! StorageGRID object notification sources.

use serde::Deserialize;
use serde_yaml::Value;

use crate::config::{SourceConfig, is_blank};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageGridFilter {
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub suffix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageGridConfig {
    #[serde(default)]
    pub endpoint: String,
    /// Accepted as a number or a quoted string.
    pub port: Option<Value>,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub filter: StorageGridFilter,
}

impl SourceConfig for StorageGridConfig {
    const SOURCE_TYPE: &'static str = "storagegrid";

    fn check(&self) -> Result<(), String> {
        if self.endpoint.is_empty() {
            return Err("endpoint must be specified".to_owned());
        }
        if is_blank(&self.port) {
            return Err("port must be specified".to_owned());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventgate_gateway::SourceError;

    use crate::config::validate_config;

    #[test]
    fn accepts_endpoint_and_port() {
        let raw = r#"
endpoint: "/"
port: "8080"
events:
    - "ObjectCreated:Put"
filter:
    suffix: ".txt"
    prefix: "hello-"
"#;
        let config = validate_config::<StorageGridConfig>(raw).expect("valid");
        assert_eq!(config.events, vec!["ObjectCreated:Put".to_owned()]);
        assert_eq!(config.filter.prefix, "hello-");
    }

    #[test]
    fn requires_endpoint() {
        let raw = r#"
events:
    - "ObjectCreated:Put"
filter:
    suffix: ".txt"
"#;
        assert_eq!(
            validate_config::<StorageGridConfig>(raw).map(|_| ()),
            Err(SourceError::Validation("endpoint must be specified".to_owned()))
        );
    }

    #[test]
    fn requires_port() {
        assert_eq!(
            validate_config::<StorageGridConfig>("endpoint: /hook").map(|_| ()),
            Err(SourceError::Validation("port must be specified".to_owned()))
        );
    }
}
