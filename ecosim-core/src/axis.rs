//! Mapping of incoming arrays onto canonical simulation axes
//!
//! Each canonical axis owns a fixed, ordered set of validators. A validator pairs a match
//! predicate, decided purely from an array's dimension names and which of them carry
//! coordinates, with a transform that rewrites the array into the axis' canonical layout.
//!
//! [`dispatch`] applies the rule shared by every axis:
//!
//! - no validator matches: the axis does not apply to the array
//! - exactly one matches: its transform is run
//! - several match: the configuration of validators is broken and the array is rejected
//!
//! Only the spatial axis is defined. Its canonical form puts a `cell_id` dimension first,
//! with one entry per grid cell in `cell_id` order, followed by any other dimensions of the
//! input in their original order.

use crate::data_array::{DataArray, FloatValue};
use crate::errors::{EcosimError, EcosimResult, ValidationFailure};
use crate::grid::{Grid, GridType};
use ndarray::{ArrayD, Axis, IxDyn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::debug;

pub const CELL_ID: &str = "cell_id";
pub const X: &str = "x";
pub const Y: &str = "y";

/// A single matcher/transformer for one canonical axis
pub trait AxisValidator {
    /// What the transform needs to know about the simulation, e.g. the grid
    type Context: ?Sized;

    fn name(&self) -> &'static str;

    /// Whether this validator should handle the array
    fn matches(&self, array: &DataArray) -> bool;

    /// Rewrite the array into canonical form
    fn transform(
        &self,
        array: &DataArray,
        context: &Self::Context,
    ) -> Result<DataArray, ValidationFailure>;
}

/// Run the single matching validator for an axis
///
/// Returns `Ok(None)` when no validator applies, so the array is not on this axis.
pub fn dispatch<V: AxisValidator>(
    axis: &str,
    validators: &[V],
    array: &DataArray,
    context: &V::Context,
) -> EcosimResult<Option<DataArray>> {
    let matched: Vec<&V> = validators.iter().filter(|v| v.matches(array)).collect();

    match matched.as_slice() {
        [] => Ok(None),
        [validator] => {
            debug!(
                variable = array.name(),
                axis,
                validator = validator.name(),
                "Validating variable"
            );
            validator
                .transform(array, context)
                .map(Some)
                .map_err(|failure| EcosimError::Validation {
                    variable: array.name().to_string(),
                    axis: axis.to_string(),
                    validator: validator.name().to_string(),
                    failure,
                })
        }
        _ => Err(EcosimError::AmbiguousValidators {
            variable: array.name().to_string(),
            axis: axis.to_string(),
            validators: matched.iter().map(|v| v.name().to_string()).collect(),
        }),
    }
}

/// Canonical axes known to the data store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoreAxis {
    Spatial,
}

impl CoreAxis {
    pub const ALL: [CoreAxis; 1] = [CoreAxis::Spatial];

    pub fn name(&self) -> &'static str {
        match self {
            CoreAxis::Spatial => "spatial",
        }
    }

    /// Validate an array against this axis
    pub fn validate(&self, array: &DataArray, grid: &Grid) -> EcosimResult<Option<DataArray>> {
        match self {
            CoreAxis::Spatial => dispatch(self.name(), &SPATIAL_VALIDATORS, array, grid),
        }
    }
}

impl fmt::Display for CoreAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The ways a spatial array can be laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialValidator {
    /// A `cell_id` dimension already in canonical order
    CellIdDim,
    /// A `cell_id` dimension whose coordinates give the id of each entry
    CellIdCoords,
    /// `x` and `y` dimensions matching the columns and rows of a square grid
    XyDims,
    /// `x` and `y` dimensions with coordinates locating each entry in the plane
    XyCoords,
}

pub const SPATIAL_VALIDATORS: [SpatialValidator; 4] = [
    SpatialValidator::CellIdDim,
    SpatialValidator::CellIdCoords,
    SpatialValidator::XyDims,
    SpatialValidator::XyCoords,
];

impl AxisValidator for SpatialValidator {
    type Context = Grid;

    fn name(&self) -> &'static str {
        match self {
            SpatialValidator::CellIdDim => "cell_id_dim",
            SpatialValidator::CellIdCoords => "cell_id_coords",
            SpatialValidator::XyDims => "xy_dims",
            SpatialValidator::XyCoords => "xy_coords",
        }
    }

    fn matches(&self, array: &DataArray) -> bool {
        let xy = array.has_dim(X) && array.has_dim(Y);
        let xy_coords = array.has_coords(X) || array.has_coords(Y);
        match self {
            SpatialValidator::CellIdDim => array.has_dim(CELL_ID) && !array.has_coords(CELL_ID),
            SpatialValidator::CellIdCoords => array.has_dim(CELL_ID) && array.has_coords(CELL_ID),
            SpatialValidator::XyDims => xy && !xy_coords,
            SpatialValidator::XyCoords => xy && xy_coords,
        }
    }

    fn transform(&self, array: &DataArray, grid: &Grid) -> Result<DataArray, ValidationFailure> {
        match self {
            SpatialValidator::CellIdDim => cell_id_dim(array, grid),
            SpatialValidator::CellIdCoords => cell_id_coords(array, grid),
            SpatialValidator::XyDims => xy_dims(array, grid),
            SpatialValidator::XyCoords => xy_coords(array, grid),
        }
    }
}

fn missing_dim(dim: &str) -> ValidationFailure {
    ValidationFailure::ShapeMismatch {
        expected: format!("a '{}' dimension", dim),
        found: "none".to_string(),
    }
}

fn leading(array: &DataArray, dims: &[&str]) -> Result<ArrayD<FloatValue>, ValidationFailure> {
    array
        .with_leading_dims(dims)
        .map(DataArray::into_values)
        .ok_or_else(|| missing_dim(dims.join("/").as_str()))
}

/// Assemble the canonical array from values whose first axis is already `cell_id`
///
/// `consumed` lists the input dimensions folded into that first axis. Every other dimension
/// keeps its name and coordinates, even one called `x` or `y`.
fn canonical(array: &DataArray, values: ArrayD<FloatValue>, consumed: &[&str]) -> DataArray {
    let mut dims = vec![CELL_ID.to_string()];
    dims.extend(
        array
            .dims()
            .iter()
            .filter(|d| !consumed.contains(&d.as_str()))
            .cloned(),
    );
    DataArray::from_parts(
        array.name().to_string(),
        dims,
        values,
        array.coords_except(consumed),
    )
}

/// Merge leading `y` and `x` axes into one, row-major with `y` outer
fn flatten_xy(values: ArrayD<FloatValue>) -> Result<ArrayD<FloatValue>, ValidationFailure> {
    let shape = values.shape();
    let mut flat = vec![shape[0] * shape[1]];
    flat.extend_from_slice(&shape[2..]);
    values
        .into_shape_with_order(IxDyn(&flat))
        .map_err(|e| ValidationFailure::ShapeMismatch {
            expected: format!("a shape reshapable to {:?}", flat),
            found: e.to_string(),
        })
}

fn cell_id_dim(array: &DataArray, grid: &Grid) -> Result<DataArray, ValidationFailure> {
    let len = array.dim_len(CELL_ID).ok_or_else(|| missing_dim(CELL_ID))?;
    if len != grid.n_cells() {
        return Err(ValidationFailure::ShapeMismatch {
            expected: format!("{} entries along '{}'", grid.n_cells(), CELL_ID),
            found: len.to_string(),
        });
    }
    Ok(canonical(array, leading(array, &[CELL_ID])?, &[CELL_ID]))
}

fn cell_id_coords(array: &DataArray, grid: &Grid) -> Result<DataArray, ValidationFailure> {
    let ids = array.coords(CELL_ID).ok_or_else(|| missing_dim(CELL_ID))?;
    let n_cells = grid.n_cells();

    let mut position: Vec<Option<usize>> = vec![None; n_cells];
    let mut unknown = BTreeSet::new();
    let mut duplicates = BTreeSet::new();

    for (index, &value) in ids.iter().enumerate() {
        if !value.is_finite() || value.fract() != 0.0 {
            return Err(ValidationFailure::NonIntegralCellId { value });
        }
        let id = value as i64;
        if id < 0 || id as usize >= n_cells {
            unknown.insert(id);
            continue;
        }
        match position[id as usize] {
            Some(_) => {
                duplicates.insert(id);
            }
            None => position[id as usize] = Some(index),
        }
    }

    if !unknown.is_empty() {
        return Err(ValidationFailure::UnknownCellId {
            ids: unknown.into_iter().collect(),
        });
    }
    if !duplicates.is_empty() {
        return Err(ValidationFailure::DuplicateCellId {
            ids: duplicates.into_iter().collect(),
        });
    }
    let missing: Vec<usize> = position
        .iter()
        .enumerate()
        .filter(|(_, p)| p.is_none())
        .map(|(cell, _)| cell)
        .collect();
    if !missing.is_empty() {
        return Err(ValidationFailure::MissingCoverage { cells: missing });
    }

    let rows: Vec<usize> = position.into_iter().flatten().collect();
    let values = leading(array, &[CELL_ID])?.select(Axis(0), &rows);
    Ok(canonical(array, values, &[CELL_ID]))
}

fn xy_dims(array: &DataArray, grid: &Grid) -> Result<DataArray, ValidationFailure> {
    if grid.grid_type() != GridType::Square {
        return Err(ValidationFailure::ShapeMismatch {
            expected: "a square grid for x/y dimensions without coordinates".to_string(),
            found: format!("a {} grid", grid.grid_type()),
        });
    }
    let nx = array.dim_len(X).ok_or_else(|| missing_dim(X))?;
    let ny = array.dim_len(Y).ok_or_else(|| missing_dim(Y))?;
    if (nx, ny) != (grid.cell_nx(), grid.cell_ny()) {
        return Err(ValidationFailure::ShapeMismatch {
            expected: format!("x = {}, y = {}", grid.cell_nx(), grid.cell_ny()),
            found: format!("x = {}, y = {}", nx, ny),
        });
    }
    Ok(canonical(
        array,
        flatten_xy(leading(array, &[Y, X])?)?,
        &[Y, X],
    ))
}

fn xy_coords(array: &DataArray, grid: &Grid) -> Result<DataArray, ValidationFailure> {
    let (xs, ys) = match (array.coords(X), array.coords(Y)) {
        (Some(xs), Some(ys)) => (xs, ys),
        (Some(_), None) => {
            return Err(ValidationFailure::ShapeMismatch {
                expected: "coordinates on both 'x' and 'y'".to_string(),
                found: "coordinates on 'x' only".to_string(),
            })
        }
        _ => {
            return Err(ValidationFailure::ShapeMismatch {
                expected: "coordinates on both 'x' and 'y'".to_string(),
                found: "coordinates on 'y' only".to_string(),
            })
        }
    };

    // Lattice points in row-major order, y outer
    let points: Vec<[f64; 2]> = ys
        .iter()
        .flat_map(|&y| xs.iter().map(move |&x| [x, y]))
        .collect();

    // Data may extend beyond the grid, so points touching no cell are ignored
    let kept: Vec<usize> = (0..points.len())
        .filter(|&p| !grid.cells_touching(points[p]).is_empty())
        .collect();
    if kept.len() < points.len() {
        debug!(
            variable = array.name(),
            dropped = points.len() - kept.len(),
            "Ignoring lattice points outside the grid"
        );
    }

    let kx: Vec<f64> = kept.iter().map(|&p| points[p][0]).collect();
    let ky: Vec<f64> = kept.iter().map(|&p| points[p][1]).collect();
    let indexing = grid.map_xy_to_cell_indexing(&kx, &ky)?;
    let rows: Vec<usize> = indexing.into_iter().map(|i| kept[i]).collect();

    let values = flatten_xy(leading(array, &[Y, X])?)?.select(Axis(0), &rows);
    Ok(canonical(array, values, &[Y, X]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, Array3};

    fn dims(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn grid() -> Grid {
        Grid::square(100.0, 3, 3).unwrap()
    }

    fn validate(array: &DataArray) -> EcosimResult<Option<DataArray>> {
        CoreAxis::Spatial.validate(array, &grid())
    }

    fn failure(result: EcosimResult<Option<DataArray>>) -> (String, ValidationFailure) {
        match result {
            Err(EcosimError::Validation {
                validator, failure, ..
            }) => (validator, failure),
            other => panic!("expected a validation failure, got {:?}", other),
        }
    }

    #[test]
    fn no_spatial_dims_is_not_on_axis() {
        let array = DataArray::from_vec("co2", "time", vec![400.0, 410.0]);
        assert!(validate(&array).unwrap().is_none());

        let array = DataArray::from_vec("transect", "x", vec![1.0, 2.0, 3.0]);
        assert!(validate(&array).unwrap().is_none());
    }

    #[test]
    fn lone_x_dim_kept_beside_cell_id() {
        let values = Array::from_shape_fn((9, 2), |(cell, x)| (cell * 10 + x) as f64);
        let array = DataArray::new("transect", dims(&[CELL_ID, X]), values.into_dyn())
            .unwrap()
            .with_coords(X, vec![0.5, 1.5])
            .unwrap();
        let validated = validate(&array).unwrap().unwrap();
        assert_eq!(validated.dims(), &dims(&[CELL_ID, X])[..]);
        assert_eq!(validated.shape(), &[9, 2]);
        assert_eq!(validated.values()[[4, 1]], 41.0);
        assert!(validated.has_coords(X));

        let ids: Vec<f64> = (0..9).rev().map(|v| v as f64).collect();
        let reordered =
            DataArray::new("transect", dims(&[Y, CELL_ID]), Array::zeros((3, 9)).into_dyn())
                .unwrap()
                .with_coords(CELL_ID, ids)
                .unwrap();
        let validated = validate(&reordered).unwrap().unwrap();
        assert_eq!(validated.dims(), &dims(&[CELL_ID, Y])[..]);
        assert_eq!(validated.shape(), &[9, 3]);
        assert!(!validated.has_coords(CELL_ID));

        let mut data = crate::data::Data::new(grid());
        data.set("transect", array).unwrap();
        let stored = data.get("transect").unwrap();
        assert_eq!(stored.dims().len(), stored.shape().len());
    }

    #[test]
    fn canonical_array_is_unchanged() {
        let values: Vec<f64> = (0..9).map(|v| v as f64).collect();
        let array = DataArray::from_vec("temp", CELL_ID, values);
        let validated = validate(&array).unwrap().unwrap();
        assert_eq!(validated, array);

        // Validating the validated array again gives the same result
        let again = validate(&validated).unwrap().unwrap();
        assert_eq!(again, validated);
    }

    #[test]
    fn cell_id_moved_to_front() {
        let values = Array::from_shape_fn((2, 9), |(layer, cell)| (layer * 100 + cell) as f64);
        let array = DataArray::new("soil", dims(&["layer", CELL_ID]), values.into_dyn())
            .unwrap()
            .with_coords("layer", vec![0.1, 0.5])
            .unwrap();
        let validated = validate(&array).unwrap().unwrap();
        assert_eq!(validated.dims(), &dims(&[CELL_ID, "layer"])[..]);
        assert_eq!(validated.shape(), &[9, 2]);
        assert_eq!(validated.values()[[4, 1]], 104.0);
        assert!(validated.has_coords("layer"));
    }

    #[test]
    fn cell_id_wrong_length() {
        let array = DataArray::from_vec("temp", CELL_ID, vec![0.0; 8]);
        let (validator, failure) = failure(validate(&array));
        assert_eq!(validator, "cell_id_dim");
        assert!(matches!(failure, ValidationFailure::ShapeMismatch { .. }));
    }

    #[test]
    fn cell_id_coords_reordered() {
        let ids = vec![8.0, 7.0, 6.0, 5.0, 4.0, 3.0, 2.0, 1.0, 0.0];
        let values: Vec<f64> = ids.iter().map(|id| id * 10.0).collect();
        let array = DataArray::from_vec("temp", CELL_ID, values)
            .with_coords(CELL_ID, ids)
            .unwrap();
        let validated = validate(&array).unwrap().unwrap();
        assert_eq!(
            validated.to_vec().unwrap(),
            vec![0.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0]
        );
        assert!(!validated.has_coords(CELL_ID));
    }

    #[test]
    fn cell_id_coords_failures() {
        let build = |ids: Vec<f64>| {
            DataArray::from_vec("temp", CELL_ID, vec![0.0; ids.len()])
                .with_coords(CELL_ID, ids)
                .unwrap()
        };

        let (_, f) = failure(validate(&build(vec![0., 1., 2., 3., 4., 5., 6., 7., 7.])));
        assert_eq!(f, ValidationFailure::DuplicateCellId { ids: vec![7] });

        let (_, f) = failure(validate(&build(vec![0., 1., 2., 3., 4., 5., 6., 7., 12.])));
        assert_eq!(f, ValidationFailure::UnknownCellId { ids: vec![12] });

        let (_, f) = failure(validate(&build(vec![0., 1., 2., 3., 4., 5., 6., 7.])));
        assert_eq!(f, ValidationFailure::MissingCoverage { cells: vec![8] });

        let (_, f) = failure(validate(&build(vec![0.5, 1., 2., 3., 4., 5., 6., 7., 8.])));
        assert_eq!(f, ValidationFailure::NonIntegralCellId { value: 0.5 });
    }

    #[test]
    fn xy_dims_flattened_row_major() {
        // values[x][y][layer] = 10 * (row * 3 + col) + layer
        let values = Array3::from_shape_fn((3, 3, 2), |(x, y, layer)| {
            ((y * 3 + x) * 10 + layer) as f64
        });
        let array = DataArray::new("soil", dims(&[X, Y, "layer"]), values.into_dyn()).unwrap();
        let validated = validate(&array).unwrap().unwrap();
        assert_eq!(validated.dims(), &dims(&[CELL_ID, "layer"])[..]);
        for cell in 0..9 {
            assert_eq!(validated.values()[[cell, 0]], (cell * 10) as f64);
            assert_eq!(validated.values()[[cell, 1]], (cell * 10 + 1) as f64);
        }
    }

    #[test]
    fn xy_dims_must_match_grid() {
        let array =
            DataArray::new("temp", dims(&[Y, X]), Array::zeros((3, 4)).into_dyn()).unwrap();
        let (validator, f) = failure(validate(&array));
        assert_eq!(validator, "xy_dims");
        assert!(matches!(f, ValidationFailure::ShapeMismatch { .. }));

        let hex = Grid::hexagon(100.0, 3, 3).unwrap();
        let array =
            DataArray::new("temp", dims(&[Y, X]), Array::zeros((3, 3)).into_dyn()).unwrap();
        let err = CoreAxis::Spatial.validate(&array, &hex).unwrap_err();
        assert!(err.to_string().contains("square grid"));
    }

    #[test]
    fn xy_coords_at_centroids() {
        let values = Array::from_shape_fn((3, 3), |(y, x)| (y * 3 + x) as f64);
        let array = DataArray::new("temp", dims(&[Y, X]), values.into_dyn())
            .unwrap()
            .with_coords(X, vec![5.0, 15.0, 25.0])
            .unwrap()
            .with_coords(Y, vec![5.0, 15.0, 25.0])
            .unwrap();
        let validated = validate(&array).unwrap().unwrap();
        assert_eq!(validated.dims(), &dims(&[CELL_ID])[..]);
        assert_eq!(
            validated.to_vec().unwrap(),
            (0..9).map(|v| v as f64).collect::<Vec<_>>()
        );
    }

    #[test]
    fn xy_coords_larger_extent_is_subset() {
        let coords = vec![-5.0, 5.0, 15.0, 25.0, 35.0];
        let values = Array::from_shape_fn((5, 5), |(y, x)| (y * 5 + x) as f64);
        let array = DataArray::new("temp", dims(&[Y, X]), values.into_dyn())
            .unwrap()
            .with_coords(X, coords.clone())
            .unwrap()
            .with_coords(Y, coords)
            .unwrap();
        let validated = validate(&array).unwrap().unwrap();
        assert_eq!(
            validated.to_vec().unwrap(),
            vec![6.0, 7.0, 8.0, 11.0, 12.0, 13.0, 16.0, 17.0, 18.0]
        );
    }

    #[test]
    fn xy_coords_failures() {
        let build = |xs: Vec<f64>, ys: Vec<f64>| {
            DataArray::new(
                "temp",
                dims(&[Y, X]),
                Array::zeros((ys.len(), xs.len())).into_dyn(),
            )
            .unwrap()
            .with_coords(X, xs)
            .unwrap()
            .with_coords(Y, ys)
            .unwrap()
        };

        let (validator, f) = failure(validate(&build(vec![5., 10., 25.], vec![5., 15., 25.])));
        assert_eq!(validator, "xy_coords");
        assert!(matches!(f, ValidationFailure::AmbiguousCoordinate { .. }));

        let (_, f) = failure(validate(&build(vec![5., 15.], vec![5., 15., 25.])));
        assert_eq!(
            f,
            ValidationFailure::MissingCoverage {
                cells: vec![2, 5, 8]
            }
        );

        let (_, f) = failure(validate(&build(vec![5., 6., 15., 25.], vec![5., 15., 25.])));
        assert_eq!(
            f,
            ValidationFailure::DuplicateCoverage {
                cell: 0,
                points: vec![0, 1]
            }
        );

        let array = DataArray::new("temp", dims(&[Y, X]), Array::zeros((3, 3)).into_dyn())
            .unwrap()
            .with_coords(X, vec![5.0, 15.0, 25.0])
            .unwrap();
        let (_, f) = failure(validate(&array));
        assert!(matches!(f, ValidationFailure::ShapeMismatch { .. }));
    }

    #[test]
    fn overlapping_validators_rejected() {
        let array = DataArray::new(
            "temp",
            dims(&[CELL_ID, X, Y]),
            Array3::zeros((9, 1, 1)).into_dyn(),
        )
        .unwrap();
        match validate(&array).unwrap_err() {
            EcosimError::AmbiguousValidators { validators, .. } => {
                assert_eq!(validators, vec!["cell_id_dim", "xy_dims"])
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
