use crate::axis::CoreAxis;
use crate::component::{Component, Phase, RequirementDefinition};
use crate::data::Data;
use crate::data_array::DataArray;
use crate::errors::{EcosimError, EcosimResult};
use ndarray::{Array1, Ix1};
use serde::{Deserialize, Serialize};

fn default_rate() -> f64 {
    1.0
}

/// Sum of 1-d cell arrays, or zeros when there is nothing to sum
fn cell_total(data: &Data, names: &[String]) -> EcosimResult<Array1<f64>> {
    let mut total = Array1::zeros(data.grid().n_cells());
    for name in names {
        let values = data
            .get(name)?
            .values()
            .view()
            .into_dimensionality::<Ix1>()
            .map_err(|e| EcosimError::Error(format!("'{}' is not one-dimensional: {}", name, e)))?;
        total += &values;
    }
    Ok(total)
}

/// Writes `rate` times the sum of its inputs to each of its outputs
///
/// With no update inputs every output is set to `rate * (time_index + 1)` so that progress
/// through the run is visible.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Transfer {
    pub name: String,
    #[serde(default)]
    pub init_inputs: Vec<String>,
    #[serde(default)]
    pub init_outputs: Vec<String>,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub axes: Vec<CoreAxis>,
    #[serde(default = "default_rate")]
    pub rate: f64,
    #[serde(skip)]
    pub updates: usize,
    #[serde(skip)]
    pub cleaned: bool,
}

impl Transfer {
    pub fn new(name: &str, input: &str, output: &str) -> Self {
        Self::named(name).with_input(input).with_output(output)
    }

    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            init_inputs: vec![],
            init_outputs: vec![],
            inputs: vec![],
            outputs: vec![],
            axes: vec![],
            rate: default_rate(),
            updates: 0,
            cleaned: false,
        }
    }

    pub fn with_input(mut self, name: &str) -> Self {
        self.inputs.push(name.to_string());
        self
    }

    pub fn with_output(mut self, name: &str) -> Self {
        self.outputs.push(name.to_string());
        self
    }

    pub fn with_init_input(mut self, name: &str) -> Self {
        self.init_inputs.push(name.to_string());
        self
    }

    pub fn with_init_output(mut self, name: &str) -> Self {
        self.init_outputs.push(name.to_string());
        self
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    pub fn on_axes(mut self, axes: &[CoreAxis]) -> Self {
        self.axes = axes.to_vec();
        self
    }

    fn write(&self, data: &mut Data, names: &[String], values: Array1<f64>) -> EcosimResult<()> {
        for name in names {
            data.set(name, DataArray::from_vec(name.as_str(), "cell_id", values.to_vec()))?;
        }
        Ok(())
    }
}

#[typetag::serde]
impl Component for Transfer {
    fn name(&self) -> &str {
        &self.name
    }

    fn definitions(&self) -> Vec<RequirementDefinition> {
        let required = |name: &String, phase| {
            RequirementDefinition::required(name, phase).on_axes(&self.axes)
        };
        let populated = |name: &String, phase| RequirementDefinition::populated(name, phase);

        self.init_inputs
            .iter()
            .map(|n| required(n, Phase::Init))
            .chain(self.init_outputs.iter().map(|n| populated(n, Phase::Init)))
            .chain(self.inputs.iter().map(|n| required(n, Phase::Update)))
            .chain(self.outputs.iter().map(|n| populated(n, Phase::Update)))
            .collect()
    }

    fn init(&mut self, data: &mut Data) -> EcosimResult<()> {
        let total = cell_total(data, &self.init_inputs)? * self.rate;
        self.write(data, &self.init_outputs, total)
    }

    fn update(&mut self, data: &mut Data, time_index: usize) -> EcosimResult<()> {
        let total = if self.inputs.is_empty() {
            Array1::from_elem(data.grid().n_cells(), self.rate * (time_index + 1) as f64)
        } else {
            cell_total(data, &self.inputs)? * self.rate
        };
        self.write(data, &self.outputs, total)?;
        self.updates += 1;
        Ok(())
    }

    fn cleanup(&mut self) -> EcosimResult<()> {
        self.cleaned = true;
        Ok(())
    }
}

/// Writes its output and then fails at a chosen time index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Faulty {
    pub name: String,
    pub output: String,
    pub fail_at: usize,
}

#[typetag::serde]
impl Component for Faulty {
    fn name(&self) -> &str {
        &self.name
    }

    fn definitions(&self) -> Vec<RequirementDefinition> {
        vec![RequirementDefinition::populated(&self.output, Phase::Update)]
    }

    fn init(&mut self, _data: &mut Data) -> EcosimResult<()> {
        Ok(())
    }

    fn update(&mut self, data: &mut Data, time_index: usize) -> EcosimResult<()> {
        let values = vec![time_index as f64; data.grid().n_cells()];
        data.set(&self.output, DataArray::from_vec(self.output.as_str(), "cell_id", values))?;
        if time_index == self.fail_at {
            return Err(EcosimError::Error(format!(
                "negative {} at time index {}",
                self.output, time_index
            )));
        }
        Ok(())
    }
}
