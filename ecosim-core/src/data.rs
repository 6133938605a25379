//! The central store of simulation arrays
//!
//! Every write to [`Data`] passes through axis validation, so an array on the spatial axis is
//! always held with a leading `cell_id` dimension in canonical cell order. A failed write
//! leaves the store untouched.

use crate::axis::CoreAxis;
use crate::config::DataConfig;
use crate::data_array::DataArray;
use crate::errors::{EcosimError, EcosimResult};
use crate::grid::Grid;
use crate::io::{DataSink, DataSource};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct Entry {
    array: DataArray,
    axes: BTreeSet<CoreAxis>,
}

/// Named arrays validated against the simulation grid
#[derive(Debug, Clone)]
pub struct Data {
    grid: Grid,
    entries: BTreeMap<String, Entry>,
}

impl Data {
    pub fn new(grid: Grid) -> Self {
        Self {
            grid,
            entries: BTreeMap::new(),
        }
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Validate an array on every axis and store it under `name`
    ///
    /// The stored array takes the given name. Any existing entry is replaced only if
    /// validation succeeds.
    pub fn set(&mut self, name: &str, array: DataArray) -> EcosimResult<()> {
        let mut array = array.renamed(name);
        let mut axes = BTreeSet::new();

        for axis in CoreAxis::ALL {
            if let Some(validated) = axis.validate(&array, &self.grid)? {
                array = validated;
                axes.insert(axis);
            }
        }

        debug!(variable = name, shape = ?array.shape(), axes = ?axes, "Stored variable");
        self.entries
            .insert(name.to_string(), Entry { array, axes });
        Ok(())
    }

    pub fn get(&self, name: &str) -> EcosimResult<&DataArray> {
        self.entries
            .get(name)
            .map(|entry| &entry.array)
            .ok_or_else(|| EcosimError::not_found("variable", name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Whether a stored variable was validated onto an axis
    ///
    /// Unknown variables are not on any axis.
    pub fn on_axis(&self, name: &str, axis: CoreAxis) -> bool {
        self.entries
            .get(name)
            .is_some_and(|entry| entry.axes.contains(&axis))
    }

    /// Axes a stored variable was validated onto
    pub fn axes(&self, name: &str) -> EcosimResult<&BTreeSet<CoreAxis>> {
        self.entries
            .get(name)
            .map(|entry| &entry.axes)
            .ok_or_else(|| EcosimError::not_found("variable", name))
    }

    /// Stored variable names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load `(name, locator)` pairs from a source and store them
    ///
    /// Every pair is attempted. Failures are collected and reported together, while the
    /// variables that did load are kept.
    pub fn load_from_sources<N, L>(
        &mut self,
        variables: impl IntoIterator<Item = (N, L)>,
        source: &dyn DataSource,
    ) -> EcosimResult<()>
    where
        N: AsRef<str>,
        L: AsRef<str>,
    {
        let mut failures = Vec::new();

        for (name, locator) in variables {
            let (name, locator) = (name.as_ref(), locator.as_ref());
            let result = source
                .load(locator, name)
                .and_then(|array| self.set(name, array));
            if let Err(err) = result {
                warn!(variable = name, locator, error = %err, "Failed to load variable");
                failures.push((name.to_string(), err));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(EcosimError::LoadFailures(failures))
        }
    }

    /// Load the variables listed in a data configuration section
    ///
    /// A variable listed more than once is a configuration error and nothing is loaded.
    pub fn load_data_config(
        &mut self,
        config: &DataConfig,
        source: &dyn DataSource,
    ) -> EcosimResult<()> {
        let duplicates = config.duplicate_names();
        if !duplicates.is_empty() {
            return Err(EcosimError::Configuration(format!(
                "data variables listed more than once: {}",
                duplicates.join(", ")
            )));
        }
        self.load_from_sources(
            config
                .variable
                .iter()
                .map(|v| (v.var_name.as_str(), v.file.as_str())),
            source,
        )
    }

    /// Write the named variables, or every variable if `names` is `None`, to a sink
    pub fn export(&self, names: Option<&[&str]>, sink: &mut dyn DataSink) -> EcosimResult<()> {
        let arrays: Vec<&DataArray> = match names {
            Some(names) => names
                .iter()
                .map(|name| self.get(name))
                .collect::<EcosimResult<_>>()?,
            None => self.entries.values().map(|entry| &entry.array).collect(),
        };
        for array in arrays {
            sink.write(array)?;
        }
        sink.flush()
    }
}
