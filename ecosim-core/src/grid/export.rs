//! GeoJSON export and import of grid cells.
//!
//! The export is a `FeatureCollection` with one `Polygon` feature per cell, each carrying its
//! `cell_id` as a property. The grid parameters are written as a top-level `grid` member so
//! the tiling can be rebuilt on import.

use super::{Grid, GridConfig};
use crate::errors::{EcosimError, EcosimResult};
use crate::grid::geometry::{rings_match, Point};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

#[derive(Serialize, Deserialize)]
struct FeatureCollection {
    #[serde(rename = "type")]
    kind: String,
    grid: GridConfig,
    features: Vec<Feature>,
}

#[derive(Serialize, Deserialize)]
struct Feature {
    #[serde(rename = "type")]
    kind: String,
    properties: Value,
    geometry: Geometry,
}

#[derive(Serialize, Deserialize)]
struct Geometry {
    #[serde(rename = "type")]
    kind: String,
    coordinates: Vec<Vec<Point>>,
}

impl Grid {
    /// Render the grid as a GeoJSON `FeatureCollection`
    pub fn to_geojson(&self) -> EcosimResult<Value> {
        let collection = FeatureCollection {
            kind: "FeatureCollection".to_string(),
            grid: self.config(),
            features: self
                .polygons
                .iter()
                .enumerate()
                .map(|(cell_id, ring)| Feature {
                    kind: "Feature".to_string(),
                    properties: json!({ "cell_id": cell_id }),
                    geometry: Geometry {
                        kind: "Polygon".to_string(),
                        coordinates: vec![ring.clone()],
                    },
                })
                .collect(),
        };
        Ok(serde_json::to_value(collection)?)
    }

    /// Rebuild a grid from its GeoJSON export
    ///
    /// The grid is reconstructed from the `grid` member and every exported feature must match
    /// the polygon of the cell named by its `cell_id` property.
    pub fn from_geojson(value: &Value) -> EcosimResult<Self> {
        let collection: FeatureCollection = serde_json::from_value(value.clone())?;
        if collection.kind != "FeatureCollection" {
            return Err(EcosimError::InvalidGrid(format!(
                "expected a FeatureCollection, found '{}'",
                collection.kind
            )));
        }
        let grid = Grid::from_config(&collection.grid)?;

        if collection.features.len() != grid.n_cells() {
            return Err(EcosimError::InvalidGrid(format!(
                "GeoJSON holds {} features but the grid has {} cells",
                collection.features.len(),
                grid.n_cells()
            )));
        }

        let tol = grid.tolerance().max(1e-9);
        // With one feature per cell, rejecting repeats also rules out missing cells
        let mut seen = vec![false; grid.n_cells()];
        for feature in &collection.features {
            let cell_id = feature
                .properties
                .get("cell_id")
                .and_then(Value::as_u64)
                .ok_or_else(|| {
                    EcosimError::InvalidGrid("feature without a cell_id property".to_string())
                })? as usize;
            let expected = grid.polygon(cell_id)?;
            if std::mem::replace(&mut seen[cell_id], true) {
                return Err(EcosimError::InvalidGrid(format!(
                    "cell {} appears more than once",
                    cell_id
                )));
            }
            let ring = feature.geometry.coordinates.first().ok_or_else(|| {
                EcosimError::InvalidGrid(format!("cell {} has no polygon ring", cell_id))
            })?;
            if !rings_match(expected, ring, tol) {
                return Err(EcosimError::InvalidGrid(format!(
                    "polygon for cell {} does not match the grid parameters",
                    cell_id
                )));
            }
        }
        Ok(grid)
    }

    /// Write the GeoJSON export to a file
    pub fn dump_geojson(&self, path: impl AsRef<Path>) -> EcosimResult<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &self.to_geojson()?)?;
        Ok(())
    }

    /// Read a grid from a GeoJSON file written by [`Grid::dump_geojson`]
    pub fn load_geojson(path: impl AsRef<Path>) -> EcosimResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        let value: Value = serde_json::from_reader(reader)?;
        Self::from_geojson(&value)
    }
}
