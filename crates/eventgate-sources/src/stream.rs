//! Message-broker sources: AMQP, NATS and MQTT.

use serde::Deserialize;
use serde_yaml::Value;

use crate::config::{SourceConfig, is_blank};

fn require(value: &str, what: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{what} must be specified"));
    }
    Ok(())
}

// ─── AMQP ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmqpConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub exchange_name: String,
    #[serde(default)]
    pub exchange_type: String,
    #[serde(default)]
    pub routing_key: String,
}

impl SourceConfig for AmqpConfig {
    const SOURCE_TYPE: &'static str = "amqp";

    fn check(&self) -> Result<(), String> {
        require(&self.url, "url")?;
        require(&self.routing_key, "routing key")?;
        require(&self.exchange_name, "exchange name")?;
        require(&self.exchange_type, "exchange type")
    }
}

// ─── NATS ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub subject: String,
}

impl SourceConfig for NatsConfig {
    const SOURCE_TYPE: &'static str = "nats";

    fn check(&self) -> Result<(), String> {
        require(&self.url, "url")?;
        require(&self.subject, "subject")
    }
}

// ─── MQTT ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MqttConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub topic: String,
    /// Client ids are often written as bare numbers.
    pub client_id: Option<Value>,
}

impl SourceConfig for MqttConfig {
    const SOURCE_TYPE: &'static str = "mqtt";

    fn check(&self) -> Result<(), String> {
        require(&self.url, "url")?;
        require(&self.topic, "topic")?;
        if is_blank(&self.client_id) {
            return Err("client id must be specified".to_owned());
        }
        Ok(())
    }
}
