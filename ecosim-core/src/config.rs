//! Simulation configuration
//!
//! A simulation is configured from a single TOML document:
//!
//! ```toml
//! [core.grid]
//! grid_type = "square"
//! cell_area = 100.0
//! cell_nx = 3
//! cell_ny = 3
//!
//! [core.timing]
//! update_interval = 30.0
//! run_length = 360.0
//!
//! [[core.data.variable]]
//! file = "inputs.json"
//! var_name = "air_temperature"
//!
//! [[components]]
//! type = "Evaporation"
//! rate = 0.1
//! ```
//!
//! Components are deserialised through `typetag`, so any registered component type can be
//! named in `[[components]]`.

use crate::component::Component;
use crate::errors::{EcosimError, EcosimResult};
use crate::grid::{Grid, GridConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Length of the run and of each update step, in a common time unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    pub update_interval: f64,
    pub run_length: f64,
}

impl TimingConfig {
    /// Number of updates needed to cover the run, counting a final partial step
    pub fn n_updates(&self) -> usize {
        (self.run_length / self.update_interval).ceil() as usize
    }

    pub(crate) fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if !(self.update_interval.is_finite() && self.update_interval > 0.0) {
            problems.push(format!(
                "core.timing.update_interval must be positive, got {}",
                self.update_interval
            ));
        }
        if !(self.run_length.is_finite() && self.run_length > 0.0) {
            problems.push(format!(
                "core.timing.run_length must be positive, got {}",
                self.run_length
            ));
        }
        problems
    }
}

/// A variable to load at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataVariable {
    pub file: String,
    pub var_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default)]
    pub variable: Vec<DataVariable>,
}

impl DataConfig {
    /// Variable names listed more than once, in sorted order
    pub fn duplicate_names(&self) -> Vec<String> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for v in &self.variable {
            *counts.entry(v.var_name.as_str()).or_default() += 1;
        }
        counts
            .into_iter()
            .filter(|(_, n)| *n > 1)
            .map(|(name, _)| name.to_string())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    pub grid: GridConfig,
    pub timing: TimingConfig,
    #[serde(default)]
    pub data: DataConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub core: CoreConfig,
    #[serde(default)]
    pub components: Vec<Box<dyn Component>>,
}

impl SimulationConfig {
    pub fn from_toml_str(text: &str) -> EcosimResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> EcosimResult<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn to_toml(&self) -> EcosimResult<String> {
        Ok(toml::to_string(self)?)
    }

    /// Check the configuration, reporting every problem found
    pub fn validate(&self) -> EcosimResult<()> {
        let mut errors = Vec::new();

        let timing = self.core.timing.problems();
        if !timing.is_empty() {
            errors.push(EcosimError::Configuration(timing.join("; ")));
        }
        if let Err(err) = Grid::from_config(&self.core.grid) {
            errors.push(err);
        }
        let duplicates = self.core.data.duplicate_names();
        if !duplicates.is_empty() {
            errors.push(EcosimError::Configuration(format!(
                "data variables listed more than once: {}",
                duplicates.join(", ")
            )));
        }
        if self.components.is_empty() {
            errors.push(EcosimError::Configuration(
                "no components configured".to_string(),
            ));
        }

        match EcosimError::batch(errors) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
