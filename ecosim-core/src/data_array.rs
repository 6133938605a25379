//! Labelled n-dimensional arrays exchanged between the I/O layer, the data store and components.
//!
//! A [`DataArray`] is a thin wrapper around an [`ndarray::ArrayD`] that carries a name for each
//! dimension and, optionally, coordinate values along any of those dimensions.
//! Axis validation uses the dimension names and the presence of coordinates to decide how
//! an incoming array maps onto the simulation grid.

use crate::errors::{EcosimError, EcosimResult};
use ndarray::{Array1, ArrayD, Axis, IxDyn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type FloatValue = f64;

/// A named array with labelled dimensions and optional coordinates.
///
/// Deserialisation goes through the same checks as [`DataArray::new`] and
/// [`DataArray::with_coords`], so a malformed file is an error rather than a broken array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDataArray")]
pub struct DataArray {
    name: String,
    dims: Vec<String>,
    values: ArrayD<FloatValue>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    coords: BTreeMap<String, Array1<FloatValue>>,
}

/// Serialised form of a [`DataArray`], before validation
#[derive(Deserialize)]
struct RawDataArray {
    name: String,
    dims: Vec<String>,
    values: ArrayD<FloatValue>,
    #[serde(default)]
    coords: BTreeMap<String, Array1<FloatValue>>,
}

impl TryFrom<RawDataArray> for DataArray {
    type Error = EcosimError;

    fn try_from(raw: RawDataArray) -> EcosimResult<Self> {
        let array = DataArray::new(raw.name, raw.dims, raw.values)?;
        raw.coords
            .into_iter()
            .try_fold(array, |array, (dim, coords)| array.with_coords(&dim, coords))
    }
}

impl DataArray {
    /// Create a new array
    ///
    /// Returns an error if the number of dimension names does not match the dimensionality
    /// of `values` or if any dimension name is repeated.
    pub fn new(
        name: impl Into<String>,
        dims: Vec<String>,
        values: ArrayD<FloatValue>,
    ) -> EcosimResult<Self> {
        let name = name.into();
        if dims.len() != values.ndim() {
            return Err(EcosimError::Error(format!(
                "Array '{}' has {} dimensions but {} dimension names were given",
                name,
                values.ndim(),
                dims.len()
            )));
        }
        for (i, dim) in dims.iter().enumerate() {
            if dims[..i].contains(dim) {
                return Err(EcosimError::Error(format!(
                    "Array '{}' repeats dimension name '{}'",
                    name, dim
                )));
            }
        }
        Ok(Self {
            name,
            dims,
            values,
            coords: BTreeMap::new(),
        })
    }

    /// Create a one-dimensional array along a single named dimension
    pub fn from_vec(name: impl Into<String>, dim: &str, values: Vec<FloatValue>) -> Self {
        Self {
            name: name.into(),
            dims: vec![dim.to_string()],
            values: Array1::from(values).into_dyn(),
            coords: BTreeMap::new(),
        }
    }

    /// Attach coordinate values to a dimension
    ///
    /// The number of coordinate values must equal the length of the dimension.
    pub fn with_coords(
        mut self,
        dim: &str,
        coords: impl Into<Array1<FloatValue>>,
    ) -> EcosimResult<Self> {
        let coords = coords.into();
        let len = self.dim_len(dim).ok_or_else(|| {
            EcosimError::Error(format!(
                "Array '{}' has no dimension '{}' to attach coordinates to",
                self.name, dim
            ))
        })?;
        if coords.len() != len {
            return Err(EcosimError::Error(format!(
                "Array '{}': dimension '{}' has length {} but {} coordinate values were given",
                self.name,
                dim,
                len,
                coords.len()
            )));
        }
        self.coords.insert(dim.to_string(), coords);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return a copy of this array under a different name
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    pub fn values(&self) -> &ArrayD<FloatValue> {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut ArrayD<FloatValue> {
        &mut self.values
    }

    pub fn into_values(self) -> ArrayD<FloatValue> {
        self.values
    }

    pub fn shape(&self) -> &[usize] {
        self.values.shape()
    }

    pub fn has_dim(&self, dim: &str) -> bool {
        self.dims.iter().any(|d| d == dim)
    }

    /// Position of a named dimension
    pub fn axis_of(&self, dim: &str) -> Option<Axis> {
        self.dims.iter().position(|d| d == dim).map(Axis)
    }

    /// Length of a named dimension
    pub fn dim_len(&self, dim: &str) -> Option<usize> {
        self.axis_of(dim).map(|axis| self.values.len_of(axis))
    }

    pub fn has_coords(&self, dim: &str) -> bool {
        self.coords.contains_key(dim)
    }

    pub fn coords(&self, dim: &str) -> Option<&Array1<FloatValue>> {
        self.coords.get(dim)
    }

    /// Values along the first dimension as a flat vector, for one-dimensional arrays
    pub fn to_vec(&self) -> Option<Vec<FloatValue>> {
        (self.values.ndim() == 1).then(|| self.values.iter().copied().collect())
    }

    /// Move the named dimensions to the front, in the given order
    ///
    /// Coordinates are carried over unchanged since they are keyed by dimension name.
    pub(crate) fn with_leading_dims(&self, leading: &[&str]) -> Option<Self> {
        let mut order: Vec<usize> = Vec::with_capacity(self.dims.len());
        for dim in leading {
            order.push(self.axis_of(dim)?.index());
        }
        let rest: Vec<usize> = (0..self.dims.len())
            .filter(|i| !order.contains(i))
            .collect();
        order.extend(rest);

        let values = self
            .values
            .clone()
            .permuted_axes(IxDyn(&order))
            .as_standard_layout()
            .into_owned();
        Some(Self {
            name: self.name.clone(),
            dims: order.iter().map(|&i| self.dims[i].clone()).collect(),
            values,
            coords: self.coords.clone(),
        })
    }

    /// Build an array from pre-arranged parts without re-checking invariants
    pub(crate) fn from_parts(
        name: String,
        dims: Vec<String>,
        values: ArrayD<FloatValue>,
        coords: BTreeMap<String, Array1<FloatValue>>,
    ) -> Self {
        debug_assert_eq!(dims.len(), values.ndim());
        Self {
            name,
            dims,
            values,
            coords,
        }
    }

    /// Coordinates for every dimension other than the ones listed
    pub(crate) fn coords_except(&self, dims: &[&str]) -> BTreeMap<String, Array1<FloatValue>> {
        self.coords
            .iter()
            .filter(|(k, _)| !dims.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn dims_must_match_ndim() {
        let res = DataArray::new("a", vec!["x".to_string()], array![[1.0, 2.0]].into_dyn());
        assert!(res.is_err());
    }

    #[test]
    fn repeated_dims_rejected() {
        let res = DataArray::new(
            "a",
            vec!["x".to_string(), "x".to_string()],
            array![[1.0, 2.0]].into_dyn(),
        );
        assert!(res.unwrap_err().to_string().contains("repeats"));
    }

    #[test]
    fn coords_must_match_length() {
        let arr = DataArray::from_vec("a", "cell_id", vec![1.0, 2.0, 3.0]);
        assert!(arr.clone().with_coords("cell_id", vec![0.0, 1.0]).is_err());
        let arr = arr.with_coords("cell_id", vec![2.0, 1.0, 0.0]).unwrap();
        assert!(arr.has_coords("cell_id"));
        assert!(!arr.has_coords("x"));
    }

    #[test]
    fn leading_dims_permutes_values() {
        let arr = DataArray::new(
            "a",
            vec!["x".to_string(), "y".to_string()],
            array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]].into_dyn(),
        )
        .unwrap();
        let moved = arr.with_leading_dims(&["y", "x"]).unwrap();
        assert_eq!(moved.dims(), &["y".to_string(), "x".to_string()]);
        assert_eq!(moved.shape(), &[3, 2]);
        assert_eq!(
            moved.values().iter().copied().collect::<Vec<_>>(),
            vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]
        );
    }

    #[test]
    fn serialisation_roundtrip() {
        let arr = DataArray::from_vec("a", "cell_id", vec![1.0, 2.0])
            .with_coords("cell_id", vec![1.0, 0.0])
            .unwrap();
        let json = serde_json::to_string(&arr).unwrap();
        let back: DataArray = serde_json::from_str(&json).unwrap();
        assert_eq!(back, arr);
    }

    #[test]
    fn malformed_input_rejected() {
        let arr = DataArray::new(
            "a",
            vec!["cell_id".to_string(), "layer".to_string()],
            array![[1.0, 2.0], [3.0, 4.0]].into_dyn(),
        )
        .unwrap();
        let valid = serde_json::to_value(&arr).unwrap();

        let mut too_few_dims = valid.clone();
        too_few_dims["dims"] = serde_json::json!(["cell_id"]);
        let err = serde_json::from_value::<DataArray>(too_few_dims).unwrap_err();
        assert!(err.to_string().contains("2 dimensions but 1 dimension names"));

        let mut repeated = valid.clone();
        repeated["dims"] = serde_json::json!(["cell_id", "cell_id"]);
        assert!(serde_json::from_value::<DataArray>(repeated).is_err());

        let mut short_coords = valid.clone();
        short_coords["coords"] =
            serde_json::json!({ "cell_id": { "v": 1, "dim": [1], "data": [0.0] } });
        assert!(serde_json::from_value::<DataArray>(short_coords).is_err());

        let mut unknown_dim = valid;
        unknown_dim["coords"] =
            serde_json::json!({ "x": { "v": 1, "dim": [2], "data": [0.0, 1.0] } });
        assert!(serde_json::from_value::<DataArray>(unknown_dim).is_err());
    }
}
