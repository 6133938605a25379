//! Simulation builder for assembling a simulation from a grid, a variable listing and components.

use crate::component::Component;
use crate::config::{DataConfig, SimulationConfig, TimingConfig};
use crate::data::Data;
use crate::data_array::DataArray;
use crate::errors::{EcosimError, EcosimResult};
use crate::grid::Grid;
use crate::io::DataSource;
use crate::scheduler::Schedule;
use crate::variable::VariableRegistry;

use super::runtime::Simulation;

/// Build a new simulation from a set of components.
///
/// Input data is validated and loaded, the components' declared requirements are merged into
/// the variable registry and the execution order is computed. Any failure at this stage is a
/// configuration error and no component has been run.
pub struct SimulationBuilder<'a> {
    grid: Grid,
    registry: VariableRegistry,
    components: Vec<Box<dyn Component>>,
    inputs: Vec<(String, DataArray)>,
    data_config: Option<(DataConfig, &'a dyn DataSource)>,
    timing: TimingConfig,
}

impl<'a> SimulationBuilder<'a> {
    /// Create a builder for a single update of unit length
    pub fn new(grid: Grid, registry: VariableRegistry) -> Self {
        Self {
            grid,
            registry,
            components: vec![],
            inputs: vec![],
            data_config: None,
            timing: TimingConfig {
                update_interval: 1.0,
                run_length: 1.0,
            },
        }
    }

    /// Create a builder from a parsed configuration
    ///
    /// The configuration is validated first and its components are moved into the builder.
    pub fn from_config(
        config: SimulationConfig,
        registry: VariableRegistry,
        source: &'a dyn DataSource,
    ) -> EcosimResult<Self> {
        config.validate()?;
        let grid = Grid::from_config(&config.core.grid)?;
        Ok(Self::new(grid, registry)
            .with_timing(config.core.timing)
            .with_data_config(config.core.data, source)
            .with_components(config.components))
    }

    pub fn with_component(mut self, component: Box<dyn Component>) -> Self {
        self.components.push(component);
        self
    }

    pub fn with_components(
        mut self,
        components: impl IntoIterator<Item = Box<dyn Component>>,
    ) -> Self {
        self.components.extend(components);
        self
    }

    /// Supply an input array directly
    pub fn with_input(mut self, name: &str, array: DataArray) -> Self {
        self.inputs.push((name.to_string(), array));
        self
    }

    /// Load the variables listed in a data configuration from a source
    pub fn with_data_config(mut self, config: DataConfig, source: &'a dyn DataSource) -> Self {
        self.data_config = Some((config, source));
        self
    }

    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    /// Builds the simulation
    ///
    /// Returns an error if any input fails to load, if the components' declarations conflict
    /// with each other or with the variable listing, if a requirement cannot be met or if
    /// the components depend on each other in a cycle. Load and registration problems are
    /// reported together.
    pub fn build(self) -> EcosimResult<Simulation> {
        let Self {
            grid,
            mut registry,
            components,
            inputs,
            data_config,
            timing,
        } = self;

        let problems = timing.problems();
        if !problems.is_empty() {
            return Err(EcosimError::Configuration(problems.join("; ")));
        }

        let mut data = Data::new(grid);
        let mut failures = Vec::new();
        let mut errors = Vec::new();
        for (name, array) in inputs {
            if let Err(err) = data.set(&name, array) {
                failures.push((name, err));
            }
        }
        if let Some((config, source)) = data_config {
            match data.load_data_config(&config, source) {
                Ok(()) => {}
                Err(EcosimError::LoadFailures(more)) => failures.extend(more),
                Err(err) => errors.push(err),
            }
        }
        if !failures.is_empty() {
            errors.insert(0, EcosimError::LoadFailures(failures));
        }

        // Registration does not depend on the data, so its problems are reported alongside
        match registry.register_components(&components) {
            Ok(()) => {}
            Err(EcosimError::Multiple(more)) => errors.extend(more),
            Err(err) => errors.push(err),
        }
        if let Some(err) = EcosimError::batch(errors) {
            return Err(err);
        }

        let schedule = Schedule::new(&components, &registry, &data)?;

        Ok(Simulation::new(components, registry, schedule, data, timing))
    }
}
