//! One-time structural validation of a sensor's declared graph.
//!
//! Validation is pure and deterministic: a sensor that fails once fails
//! every time, so callers treat a failure as terminal for the generation.

use std::collections::HashSet;

use thiserror::Error;

use crate::graph::Sensor;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("sensor name can't be empty")]
    EmptyName,
    #[error("dependency name can't be empty")]
    EmptyDependencyName,
    #[error("duplicate dependency {0}")]
    DuplicateDependency(String),
    #[error("trigger name can't be empty")]
    EmptyTriggerName,
    #[error("duplicate trigger {0}")]
    DuplicateTrigger(String),
    #[error("deploy template must declare at least one container")]
    NoContainers,
    #[error("container {index} must declare an image")]
    MissingImage { index: usize },
}

/// Check the declared dependencies, triggers and deploy template.
///
/// Dependency and trigger names share one node namespace; a name used by
/// both kinds is not rejected here and collapses to a single node.
pub fn validate_sensor(sensor: &Sensor) -> Result<(), ValidationError> {
    if sensor.metadata.name.trim().is_empty() {
        return Err(ValidationError::EmptyName);
    }

    let mut seen = HashSet::new();
    for dep in &sensor.spec.dependencies {
        if dep.name.trim().is_empty() {
            return Err(ValidationError::EmptyDependencyName);
        }
        if !seen.insert(dep.name.as_str()) {
            return Err(ValidationError::DuplicateDependency(dep.name.clone()));
        }
    }

    let mut seen = HashSet::new();
    for trigger in &sensor.spec.triggers {
        if trigger.name.trim().is_empty() {
            return Err(ValidationError::EmptyTriggerName);
        }
        if !seen.insert(trigger.name.as_str()) {
            return Err(ValidationError::DuplicateTrigger(trigger.name.clone()));
        }
    }

    let containers = &sensor.spec.deploy.containers;
    if containers.is_empty() {
        return Err(ValidationError::NoContainers);
    }
    if let Some(index) = containers.iter().position(|c| c.image.trim().is_empty()) {
        return Err(ValidationError::MissingImage { index });
    }

    Ok(())
}
