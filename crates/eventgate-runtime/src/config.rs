//! Runtime configuration and the definition files it points at.
//!
//! `eventgate.toml` configures the gateway and the controller. Source
//! definitions live in a separate TOML file whose `[sources]` table maps
//! each key to its raw config; sensors live in a JSON or TOML file with a
//! top-level `sensors` list. Relative paths resolve against the directory
//! of the config file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use eventgate_core::{EventSourceDefinition, Sensor};
use eventgate_gateway::ManagerConfig;
use eventgate_sensor::{ReconcilerConfig, RetryPolicy};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub controller: ControllerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Prefix of the dependency names this gateway's events resolve.
    pub name: String,
    /// Source type every declared source is run with.
    pub source_type: String,
    pub sources_file: PathBuf,
    pub connect_timeout_ms: u64,
    pub status_buffer: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            name: "eventgate".to_owned(),
            source_type: "file".to_owned(),
            sources_file: PathBuf::from("sources.toml"),
            connect_timeout_ms: 10_000,
            status_buffer: 64,
        }
    }
}

impl GatewayConfig {
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            status_buffer: self.status_buffer,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub instance_id: String,
    /// No sensors are loaded when unset.
    pub sensors_file: Option<PathBuf>,
    pub settle_ms: u64,
    pub retry: RetryConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            instance_id: "eventgate-controller".to_owned(),
            sensors_file: None,
            settle_ms: 1_000,
            retry: RetryConfig::default(),
        }
    }
}

impl ControllerConfig {
    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            instance_id: self.instance_id.clone(),
            retry: self.retry.policy(),
        }
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub first_ms: u64,
    pub factor: f64,
    pub max_ms: u64,
    pub steps: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            first_ms: 10,
            factor: 2.0,
            max_ms: 1_000,
            steps: 5,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            first: Duration::from_millis(self.first_ms),
            max: Duration::from_millis(self.max_ms),
            factor: self.factor,
            steps: self.steps,
        }
    }
}

impl Config {
    /// Load `path`, resolving the files it names relative to its directory.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let mut config: Config = toml::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.gateway.sources_file = resolve(base, &config.gateway.sources_file);
        config.controller.sensors_file = config
            .controller
            .sensors_file
            .as_deref()
            .map(|p| resolve(base, p));
        Ok(config)
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

// ─── Definition Files ────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct SourcesFile {
    #[serde(default)]
    sources: BTreeMap<String, String>,
}

/// Full snapshot of declared sources, ordered by key.
pub async fn load_sources(path: &Path) -> anyhow::Result<Vec<EventSourceDefinition>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read sources {}", path.display()))?;
    let file: SourcesFile = toml::from_str(&text)
        .with_context(|| format!("failed to parse sources {}", path.display()))?;
    Ok(EventSourceDefinition::from_snapshot(&file.sources))
}

#[derive(Debug, Default, Deserialize)]
struct SensorsFile {
    #[serde(default)]
    sensors: Vec<Sensor>,
}

/// Sensors declared in a `.json` or `.toml` file.
pub async fn load_sensors(path: &Path) -> anyhow::Result<Vec<Sensor>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read sensors {}", path.display()))?;
    let file: SensorsFile = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&text)
            .with_context(|| format!("failed to parse sensors {}", path.display()))?,
        Some("toml") => toml::from_str(&text)
            .with_context(|| format!("failed to parse sensors {}", path.display()))?,
        _ => anyhow::bail!("sensors file {} must be .json or .toml", path.display()),
    };
    Ok(file.sensors)
}
