//! Pipeline fingerprinting: deterministic identification of gate configurations.
//!
//! - `ComponentConfig`: one component's type, optional instance name and parameters.
//! - `PipelineConfig`: the ordered component list.
//! - `ConfigHash`: structural identity (component types in order, no parameter values).
//! - `FullHash`: exact identity (types, names, every parameter and label).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{ConfigHash, FullHash};

/// Configuration of a single gating component.
///
/// Uses `BTreeMap` for deterministic key ordering during hashing.
/// Non-numeric parameters (regime names) live in `labels`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentConfig {
    #[serde(rename = "type", alias = "component_type")]
    pub component_type: String,
    /// Instance name; defaults to the component type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
}

impl ComponentConfig {
    pub fn new(component_type: impl Into<String>) -> Self {
        Self {
            component_type: component_type.into(),
            name: None,
            params: BTreeMap::new(),
            labels: Vec::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: f64) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels.extend(labels.into_iter().map(Into::into));
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Instance name the built component will report.
    pub fn instance_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.component_type)
    }
}

/// Ordered component list of one decision pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    pub components: Vec<ComponentConfig>,
}

impl PipelineConfig {
    pub fn new(components: Vec<ComponentConfig>) -> Self {
        Self { components }
    }

    /// Structural hash: component types in evaluation order, ignoring parameters.
    ///
    /// Order matters: the same gates in a different order short-circuit
    /// differently and attribute vetoes differently.
    pub fn config_hash(&self) -> ConfigHash {
        let structural = self
            .components
            .iter()
            .map(|c| c.component_type.as_str())
            .collect::<Vec<_>>()
            .join("+");
        ConfigHash::from_bytes(structural.as_bytes())
    }

    /// Full hash: types, names, parameter bits and labels.
    ///
    /// Parameters are fed as raw `f64` bits so `0.1` and `0.1000000001` never collide
    /// through float formatting.
    pub fn full_hash(&self) -> FullHash {
        let mut hasher = blake3::Hasher::new();
        for component in &self.components {
            hasher.update(component.component_type.as_bytes());
            hasher.update(&[0]);
            hasher.update(component.instance_name().as_bytes());
            hasher.update(&[0]);
            for (key, value) in &component.params {
                hasher.update(key.as_bytes());
                hasher.update(&value.to_bits().to_le_bytes());
            }
            hasher.update(&[0]);
            for label in &component.labels {
                hasher.update(label.as_bytes());
                hasher.update(&[0]);
            }
            hasher.update(&[0xff]);
        }
        FullHash(hasher.finalize().to_hex().to_string())
    }
}
