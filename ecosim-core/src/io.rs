//! Reading and writing arrays
//!
//! The data store never touches files directly. Input arrays come from a [`DataSource`] and
//! exported arrays go to a [`DataSink`]. Two implementations of each are provided: an
//! in-memory pair, mostly useful for tests and embedding, and a JSON file backend.

use crate::data_array::DataArray;
use crate::errors::{EcosimError, EcosimResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Produces raw arrays from a locator such as a file path
pub trait DataSource {
    fn load(&self, locator: &str, var_name: &str) -> EcosimResult<DataArray>;
}

/// Receives arrays exported from the data store
pub trait DataSink {
    fn write(&mut self, array: &DataArray) -> EcosimResult<()>;

    /// Called once after every array of an export has been written
    fn flush(&mut self) -> EcosimResult<()> {
        Ok(())
    }
}

fn missing_variable(locator: &str, var_name: &str) -> EcosimError {
    EcosimError::not_found("variable", format!("{}' in '{}", var_name, locator))
}

/// Arrays held in memory, keyed by locator and variable name
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    arrays: BTreeMap<(String, String), DataArray>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make an array available under a locator, using the array's own name
    pub fn insert(&mut self, locator: &str, array: DataArray) {
        self.arrays
            .insert((locator.to_string(), array.name().to_string()), array);
    }

    pub fn with(mut self, locator: &str, array: DataArray) -> Self {
        self.insert(locator, array);
        self
    }
}

impl DataSource for MemorySource {
    fn load(&self, locator: &str, var_name: &str) -> EcosimResult<DataArray> {
        self.arrays
            .get(&(locator.to_string(), var_name.to_string()))
            .cloned()
            .ok_or_else(|| missing_variable(locator, var_name))
    }
}

/// Collects exported arrays in memory
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    arrays: Vec<DataArray>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arrays(&self) -> &[DataArray] {
        &self.arrays
    }

    pub fn get(&self, name: &str) -> Option<&DataArray> {
        self.arrays.iter().find(|a| a.name() == name)
    }
}

impl DataSink for MemorySink {
    fn write(&mut self, array: &DataArray) -> EcosimResult<()> {
        self.arrays.push(array.clone());
        Ok(())
    }
}

/// On-disk layout of the JSON backend
#[derive(Debug, Default, Serialize, Deserialize)]
struct JsonDataFile {
    variables: Vec<DataArray>,
}

/// Reads arrays from JSON files, resolving locators relative to a base directory
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    base_dir: PathBuf,
}

impl JsonFileSource {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

impl DataSource for JsonFileSource {
    fn load(&self, locator: &str, var_name: &str) -> EcosimResult<DataArray> {
        let path = self.base_dir.join(locator);
        debug!(path = %path.display(), var_name, "Reading variable");
        let reader = BufReader::new(File::open(&path)?);
        let file: JsonDataFile = serde_json::from_reader(reader)?;
        file.variables
            .into_iter()
            .find(|a| a.name() == var_name)
            .ok_or_else(|| missing_variable(locator, var_name))
    }
}

/// Writes every exported array into a single JSON file on flush
#[derive(Debug)]
pub struct JsonFileSink {
    path: PathBuf,
    pending: JsonDataFile,
}

impl JsonFileSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            pending: JsonDataFile::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DataSink for JsonFileSink {
    fn write(&mut self, array: &DataArray) -> EcosimResult<()> {
        self.pending.variables.push(array.clone());
        Ok(())
    }

    fn flush(&mut self) -> EcosimResult<()> {
        let writer = BufWriter::new(File::create(&self.path)?);
        serde_json::to_writer(writer, &self.pending)?;
        debug!(
            path = %self.path.display(),
            n_variables = self.pending.variables.len(),
            "Wrote variables"
        );
        self.pending.variables.clear();
        Ok(())
    }
}
