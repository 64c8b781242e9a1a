//! Backing resources that receive a sensor's events.
//!
//! A sensor is served by a deployment named after it and a service named
//! `<name>-svc` exposing the event port. Creation is idempotent: anything
//! that already exists is left alone.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;

use eventgate_core::graph::LABEL_SENSOR_NAME;
use eventgate_core::{Container, EnvVar, Sensor};

use crate::error::ProvisionError;

pub const ENV_SENSOR_NAME: &str = "SENSOR_NAME";
pub const ENV_SENSOR_NAMESPACE: &str = "SENSOR_NAMESPACE";
pub const ENV_CONTROLLER_INSTANCE_ID: &str = "SENSOR_CONTROLLER_INSTANCE_ID";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Deployment {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Service {
    pub name: String,
    pub namespace: String,
    pub port: u16,
    pub selector: BTreeMap<String, String>,
}

pub fn service_name(sensor_name: &str) -> String {
    format!("{sensor_name}-svc")
}

fn selector(sensor: &Sensor) -> BTreeMap<String, String> {
    BTreeMap::from([(LABEL_SENSOR_NAME.to_owned(), sensor.name().to_owned())])
}

/// Deployment for `sensor`, with the controller's environment injected into
/// the first container of the deploy template.
pub fn deployment_for(sensor: &Sensor, instance_id: &str) -> Result<Deployment, ProvisionError> {
    let mut containers = sensor.spec.deploy.containers.clone();
    let first = containers
        .first_mut()
        .ok_or_else(|| ProvisionError::NoContainers(sensor.name().to_owned()))?;
    first.env.extend([
        EnvVar {
            name: ENV_SENSOR_NAME.to_owned(),
            value: sensor.name().to_owned(),
        },
        EnvVar {
            name: ENV_SENSOR_NAMESPACE.to_owned(),
            value: sensor.metadata.namespace.clone(),
        },
        EnvVar {
            name: ENV_CONTROLLER_INSTANCE_ID.to_owned(),
            value: instance_id.to_owned(),
        },
    ]);

    let mut labels = sensor.metadata.labels.clone();
    labels.extend(selector(sensor));
    Ok(Deployment {
        name: sensor.name().to_owned(),
        namespace: sensor.metadata.namespace.clone(),
        labels,
        annotations: sensor.metadata.annotations.clone(),
        containers,
    })
}

pub fn service_for(sensor: &Sensor) -> Service {
    Service {
        name: service_name(sensor.name()),
        namespace: sensor.metadata.namespace.clone(),
        port: sensor.spec.deploy.port,
        selector: selector(sensor),
    }
}

#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn deployment_exists(&self, namespace: &str, name: &str) -> Result<bool, ProvisionError>;

    async fn create_deployment(&self, deployment: &Deployment) -> Result<(), ProvisionError>;

    async fn service_exists(&self, namespace: &str, name: &str) -> Result<bool, ProvisionError>;

    async fn create_service(&self, service: &Service) -> Result<(), ProvisionError>;
}

/// What [`provision`] had to create.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Provisioned {
    pub deployment_created: bool,
    pub service_created: bool,
}

/// Ensure the deployment and service for `sensor` exist.
///
/// Labels the sensor with its own name when the deployment is created, so
/// the deployment and service select on it.
pub async fn provision(
    provisioner: &dyn Provisioner,
    sensor: &mut Sensor,
    instance_id: &str,
) -> Result<Provisioned, ProvisionError> {
    let mut outcome = Provisioned::default();
    let namespace = sensor.metadata.namespace.clone();

    if !provisioner.deployment_exists(&namespace, sensor.name()).await? {
        sensor
            .metadata
            .labels
            .insert(LABEL_SENSOR_NAME.to_owned(), sensor.metadata.name.clone());
        let deployment = deployment_for(sensor, instance_id)?;
        provisioner.create_deployment(&deployment).await?;
        tracing::info!(sensor = %sensor.name(), "sensor deployment created");
        outcome.deployment_created = true;
    }

    let service = service_for(sensor);
    if !provisioner.service_exists(&namespace, &service.name).await? {
        provisioner.create_service(&service).await?;
        tracing::info!(sensor = %sensor.name(), service = %service.name, port = service.port, "sensor service created");
        outcome.service_created = true;
    }

    Ok(outcome)
}

// ─── Memory ──────────────────────────────────────────────────────────

fn object_key(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_owned()
    } else {
        format!("{namespace}/{name}")
    }
}

/// Provisioner that records what it creates.
#[derive(Default)]
pub struct MemoryProvisioner {
    deployments: Mutex<BTreeMap<String, Deployment>>,
    services: Mutex<BTreeMap<String, Service>>,
}

impl MemoryProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn deployments(&self) -> Vec<Deployment> {
        self.deployments.lock().await.values().cloned().collect()
    }

    pub async fn services(&self) -> Vec<Service> {
        self.services.lock().await.values().cloned().collect()
    }
}

#[async_trait]
impl Provisioner for MemoryProvisioner {
    async fn deployment_exists(&self, namespace: &str, name: &str) -> Result<bool, ProvisionError> {
        Ok(self
            .deployments
            .lock()
            .await
            .contains_key(&object_key(namespace, name)))
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<(), ProvisionError> {
        let key = object_key(&deployment.namespace, &deployment.name);
        let mut deployments = self.deployments.lock().await;
        if deployments.contains_key(&key) {
            return Err(ProvisionError::Deployment {
                name: deployment.name.clone(),
                reason: "already exists".to_owned(),
            });
        }
        deployments.insert(key, deployment.clone());
        Ok(())
    }

    async fn service_exists(&self, namespace: &str, name: &str) -> Result<bool, ProvisionError> {
        Ok(self
            .services
            .lock()
            .await
            .contains_key(&object_key(namespace, name)))
    }

    async fn create_service(&self, service: &Service) -> Result<(), ProvisionError> {
        let key = object_key(&service.namespace, &service.name);
        let mut services = self.services.lock().await;
        if services.contains_key(&key) {
            return Err(ProvisionError::Service {
                name: service.name.clone(),
                reason: "already exists".to_owned(),
            });
        }
        services.insert(key, service.clone());
        Ok(())
    }
}
