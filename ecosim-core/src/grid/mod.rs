//! Spatial grids for ecosystem simulations
//!
//! A [`Grid`] tiles a bounded rectangle of the plane into cells identified by a dense integer
//! `cell_id` running from `0` to `n_cells() - 1`. Two tilings are supported:
//!
//! - [`GridType::Square`]: square cells laid out row-major over a `cell_nx` × `cell_ny` lattice
//! - [`GridType::Hexagon`]: pointy-topped regular hexagons with odd rows offset by half a cell
//!
//! All per-cell data (polygons, centroids, neighbours, distances) is stored in parallel
//! collections indexed by `cell_id`.
//!
//! # Examples
//!
//! ```rust
//! use ecosim_core::grid::Grid;
//!
//! let grid = Grid::square(100.0, 3, 3).unwrap();
//! assert_eq!(grid.n_cells(), 9);
//! assert_eq!(grid.centroid(4).unwrap(), [15.0, 15.0]);
//!
//! // Orthogonal neighbours only
//! assert_eq!(grid.neighbours_within(4, 10.0).unwrap(), vec![1, 3, 5, 7]);
//! ```

mod export;
pub mod geometry;

use crate::errors::{EcosimError, EcosimResult, ValidationFailure};
use geometry::{locate, Bounds, Location, Point, Polygon};
use ndarray::{Array1, Array2, Zip};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::debug;

/// Cell shape used to tile the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridType {
    Square,
    Hexagon,
}

impl fmt::Display for GridType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridType::Square => write!(f, "square"),
            GridType::Hexagon => write!(f, "hexagon"),
        }
    }
}

impl FromStr for GridType {
    type Err = EcosimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "square" => Ok(GridType::Square),
            "hexagon" => Ok(GridType::Hexagon),
            other => Err(EcosimError::InvalidGrid(format!(
                "unsupported grid type '{}', expected 'square' or 'hexagon'",
                other
            ))),
        }
    }
}

fn default_grid_type() -> String {
    "square".to_string()
}

/// Grid parameters as they appear in the `[core.grid]` configuration section
///
/// The grid type is kept as a string so that an unknown tiling is reported as a grid
/// configuration error rather than a parse error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    #[serde(default = "default_grid_type")]
    pub grid_type: String,
    pub cell_area: f64,
    pub cell_nx: usize,
    pub cell_ny: usize,
    #[serde(default)]
    pub xoff: f64,
    #[serde(default)]
    pub yoff: f64,
}

/// A deterministic tiling of a rectangle into cells
#[derive(Debug, Clone)]
pub struct Grid {
    grid_type: GridType,
    cell_area: f64,
    cell_nx: usize,
    cell_ny: usize,
    xoff: f64,
    yoff: f64,
    /// Length of a cell edge
    side: f64,
    polygons: Vec<Polygon>,
    /// Bounding box of each polygon, used to skip cells during point mapping
    polygon_bounds: Vec<Bounds>,
    /// One row per cell, columns are x and y
    centroids: Array2<f64>,
    /// Threshold and neighbour lists from the last call to [`Grid::set_neighbours`]
    neighbours: Option<(f64, Vec<Vec<usize>>)>,
    distances: OnceLock<Array2<f64>>,
}

impl Grid {
    /// Create a new grid
    ///
    /// Fails if the cell area is not a positive finite number, if either lattice extent is
    /// zero or if an offset is not finite.
    pub fn new(
        grid_type: GridType,
        cell_area: f64,
        cell_nx: usize,
        cell_ny: usize,
        xoff: f64,
        yoff: f64,
    ) -> EcosimResult<Self> {
        if !(cell_area.is_finite() && cell_area > 0.0) {
            return Err(EcosimError::InvalidGrid(format!(
                "cell_area must be a positive number, got {}",
                cell_area
            )));
        }
        if cell_nx == 0 || cell_ny == 0 {
            return Err(EcosimError::InvalidGrid(format!(
                "cell_nx and cell_ny must be positive, got {} x {}",
                cell_nx, cell_ny
            )));
        }
        if !(xoff.is_finite() && yoff.is_finite()) {
            return Err(EcosimError::InvalidGrid(format!(
                "offsets must be finite, got ({}, {})",
                xoff, yoff
            )));
        }

        let (side, centroids, polygons) = match grid_type {
            GridType::Square => square_cells(cell_area, cell_nx, cell_ny, xoff, yoff),
            GridType::Hexagon => hexagon_cells(cell_area, cell_nx, cell_ny, xoff, yoff),
        };
        let polygon_bounds = polygons.iter().map(Bounds::of_points).collect();

        debug!(
            grid_type = %grid_type,
            n_cells = cell_nx * cell_ny,
            cell_area,
            "Created grid"
        );

        Ok(Self {
            grid_type,
            cell_area,
            cell_nx,
            cell_ny,
            xoff,
            yoff,
            side,
            polygons,
            polygon_bounds,
            centroids,
            neighbours: None,
            distances: OnceLock::new(),
        })
    }

    /// Create a square grid with no offset
    pub fn square(cell_area: f64, cell_nx: usize, cell_ny: usize) -> EcosimResult<Self> {
        Self::new(GridType::Square, cell_area, cell_nx, cell_ny, 0.0, 0.0)
    }

    /// Create a hexagonal grid with no offset
    pub fn hexagon(cell_area: f64, cell_nx: usize, cell_ny: usize) -> EcosimResult<Self> {
        Self::new(GridType::Hexagon, cell_area, cell_nx, cell_ny, 0.0, 0.0)
    }

    /// Create a grid from its configuration section
    pub fn from_config(config: &GridConfig) -> EcosimResult<Self> {
        Self::new(
            config.grid_type.parse()?,
            config.cell_area,
            config.cell_nx,
            config.cell_ny,
            config.xoff,
            config.yoff,
        )
    }

    /// The parameters this grid was built from
    pub fn config(&self) -> GridConfig {
        GridConfig {
            grid_type: self.grid_type.to_string(),
            cell_area: self.cell_area,
            cell_nx: self.cell_nx,
            cell_ny: self.cell_ny,
            xoff: self.xoff,
            yoff: self.yoff,
        }
    }

    pub fn grid_type(&self) -> GridType {
        self.grid_type
    }

    pub fn cell_area(&self) -> f64 {
        self.cell_area
    }

    pub fn cell_nx(&self) -> usize {
        self.cell_nx
    }

    pub fn cell_ny(&self) -> usize {
        self.cell_ny
    }

    pub fn xoff(&self) -> f64 {
        self.xoff
    }

    pub fn yoff(&self) -> f64 {
        self.yoff
    }

    /// Number of cells in the grid
    pub fn n_cells(&self) -> usize {
        self.cell_nx * self.cell_ny
    }

    /// Cell identifiers in canonical order
    pub fn cell_ids(&self) -> impl Iterator<Item = usize> {
        0..self.n_cells()
    }

    /// Tolerance used when deciding whether a point touches a cell boundary
    pub(crate) fn tolerance(&self) -> f64 {
        self.side * 1e-9
    }

    fn check_cell(&self, cell_id: usize) -> EcosimResult<()> {
        if cell_id < self.n_cells() {
            Ok(())
        } else {
            Err(EcosimError::not_found("cell", cell_id.to_string()))
        }
    }

    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    pub fn polygon(&self, cell_id: usize) -> EcosimResult<&Polygon> {
        self.check_cell(cell_id)?;
        Ok(&self.polygons[cell_id])
    }

    /// Cell centroids, one row of `[x, y]` per cell
    pub fn centroids(&self) -> &Array2<f64> {
        &self.centroids
    }

    pub fn centroid(&self, cell_id: usize) -> EcosimResult<Point> {
        self.check_cell(cell_id)?;
        Ok([self.centroids[[cell_id, 0]], self.centroids[[cell_id, 1]]])
    }

    /// Bounding box of the whole grid
    pub fn bounds(&self) -> Bounds {
        Bounds::of_points(self.polygons.iter().flatten())
    }

    fn centroid_distance(&self, a: usize, b: usize) -> f64 {
        let dx = self.centroids[[a, 0]] - self.centroids[[b, 0]];
        let dy = self.centroids[[a, 1]] - self.centroids[[b, 1]];
        dx.hypot(dy)
    }

    /// Distance between the centroids of two cells
    ///
    /// Reads the distance matrix when it has been populated and computes the value otherwise.
    pub fn distance(&self, a: usize, b: usize) -> EcosimResult<f64> {
        self.check_cell(a)?;
        self.check_cell(b)?;
        Ok(match self.distances.get() {
            Some(matrix) => matrix[[a, b]],
            None => self.centroid_distance(a, b),
        })
    }

    /// Distances from one cell to every cell, in canonical order
    pub fn distances_from(&self, cell_id: usize) -> EcosimResult<Array1<f64>> {
        self.check_cell(cell_id)?;
        Ok(match self.distances.get() {
            Some(matrix) => matrix.row(cell_id).to_owned(),
            None => (0..self.n_cells())
                .map(|other| self.centroid_distance(cell_id, other))
                .collect(),
        })
    }

    /// Compute the dense distance matrix between all cell centroids
    ///
    /// This trades `O(N²)` memory for constant-time lookups in [`Grid::distance`] and
    /// [`Grid::neighbours_within`]. Repeated calls return the existing matrix.
    pub fn populate_distances(&self) -> &Array2<f64> {
        self.distances.get_or_init(|| {
            let n = self.n_cells();
            debug!(n_cells = n, "Populating distance matrix");
            let mut matrix = Array2::<f64>::zeros((n, n));
            Zip::indexed(&mut matrix)
                .par_for_each(|(i, j), value| *value = self.centroid_distance(i, j));
            matrix
        })
    }

    /// The distance matrix, if it has been populated
    pub fn distance_matrix(&self) -> Option<&Array2<f64>> {
        self.distances.get()
    }

    /// Cells whose centroid lies within `distance` of the given cell, excluding the cell itself
    ///
    /// A centroid exactly at `distance` counts. The comparison allows a slack of
    /// `1e-9` times the cell side, so that rounding in the hexagon geometry does not drop
    /// neighbours at exactly the lattice spacing. Anything further out is excluded.
    pub fn neighbours_within(&self, cell_id: usize, distance: f64) -> EcosimResult<Vec<usize>> {
        self.check_cell(cell_id)?;
        Ok(self.compute_neighbours(cell_id, distance))
    }

    fn compute_neighbours(&self, cell_id: usize, distance: f64) -> Vec<usize> {
        let tol = self.tolerance();
        let matrix = self.distances.get();
        (0..self.n_cells())
            .filter(|&other| other != cell_id)
            .filter(|&other| {
                let d = match matrix {
                    Some(m) => m[[cell_id, other]],
                    None => self.centroid_distance(cell_id, other),
                };
                d <= distance + tol
            })
            .collect()
    }

    /// Precompute the neighbours of every cell for a distance threshold
    ///
    /// The lists are then available through [`Grid::neighbours`], and use the same
    /// comparison as [`Grid::neighbours_within`].
    pub fn set_neighbours(&mut self, distance: f64) -> EcosimResult<()> {
        if !(distance.is_finite() && distance >= 0.0) {
            return Err(EcosimError::Error(format!(
                "neighbour distance must be a non-negative number, got {}",
                distance
            )));
        }
        let lists = (0..self.n_cells())
            .into_par_iter()
            .map(|cell_id| self.compute_neighbours(cell_id, distance))
            .collect();
        self.neighbours = Some((distance, lists));
        Ok(())
    }

    /// Neighbours of a cell precomputed by [`Grid::set_neighbours`]
    pub fn neighbours(&self, cell_id: usize) -> EcosimResult<&[usize]> {
        self.check_cell(cell_id)?;
        match &self.neighbours {
            Some((_, lists)) => Ok(&lists[cell_id]),
            None => Err(EcosimError::Error(
                "neighbours have not been set for this grid; call set_neighbours first"
                    .to_string(),
            )),
        }
    }

    /// The threshold used for the precomputed neighbour lists
    pub fn neighbour_distance(&self) -> Option<f64> {
        self.neighbours.as_ref().map(|(d, _)| *d)
    }

    /// Map points onto the cells that contain or touch them
    ///
    /// A point on a shared edge or vertex is returned for every cell it touches,
    /// and a point outside the grid maps to an empty list.
    pub fn map_xy_to_cell_id(&self, x: &[f64], y: &[f64]) -> EcosimResult<Vec<Vec<usize>>> {
        if x.len() != y.len() {
            return Err(EcosimError::Error(format!(
                "x and y coordinates differ in length: {} and {}",
                x.len(),
                y.len()
            )));
        }
        Ok(x.iter()
            .zip(y.iter())
            .map(|(&px, &py)| self.cells_touching([px, py]))
            .collect())
    }

    pub(crate) fn cells_touching(&self, point: Point) -> Vec<usize> {
        let tol = self.tolerance();
        self.polygons
            .iter()
            .zip(self.polygon_bounds.iter())
            .enumerate()
            .filter(|(_, (_, bounds))| bounds.contains(point, tol))
            .filter(|(_, (ring, _))| locate(point, ring, tol) != Location::Outside)
            .map(|(cell_id, _)| cell_id)
            .collect()
    }

    /// Map points one-to-one onto cells
    ///
    /// On success the result holds, for each `cell_id` in canonical order, the index of the
    /// point that falls inside that cell, so that `source[result[i]]` is the value for cell `i`.
    ///
    /// Unlike [`Grid::map_xy_to_cell_id`] any boundary point is an error, as are points
    /// outside the grid, cells with more than one point and cells with none.
    pub fn map_xy_to_cell_indexing(
        &self,
        x: &[f64],
        y: &[f64],
    ) -> Result<Vec<usize>, ValidationFailure> {
        if x.len() != y.len() {
            return Err(ValidationFailure::ShapeMismatch {
                expected: format!("{} y coordinates", x.len()),
                found: format!("{}", y.len()),
            });
        }

        let mut points_in_cell: Vec<Vec<usize>> = vec![Vec::new(); self.n_cells()];
        let mut outside = Vec::new();

        for (point, (&px, &py)) in x.iter().zip(y.iter()).enumerate() {
            let cells = self.cells_touching([px, py]);
            match cells.len() {
                0 => outside.push(point),
                1 => points_in_cell[cells[0]].push(point),
                _ => {
                    return Err(ValidationFailure::AmbiguousCoordinate {
                        point,
                        x: px,
                        y: py,
                        cells,
                    })
                }
            }
        }

        if !outside.is_empty() {
            return Err(ValidationFailure::OutOfGrid { points: outside });
        }
        if let Some((cell, points)) = points_in_cell
            .iter()
            .enumerate()
            .find(|(_, points)| points.len() > 1)
        {
            return Err(ValidationFailure::DuplicateCoverage {
                cell,
                points: points.clone(),
            });
        }
        let missing: Vec<usize> = points_in_cell
            .iter()
            .enumerate()
            .filter(|(_, points)| points.is_empty())
            .map(|(cell, _)| cell)
            .collect();
        if !missing.is_empty() {
            return Err(ValidationFailure::MissingCoverage { cells: missing });
        }

        Ok(points_in_cell.into_iter().map(|points| points[0]).collect())
    }
}

/// Square cells, returning the side length, centroids and polygons
fn square_cells(
    cell_area: f64,
    cell_nx: usize,
    cell_ny: usize,
    xoff: f64,
    yoff: f64,
) -> (f64, Array2<f64>, Vec<Polygon>) {
    let side = cell_area.sqrt();
    let n = cell_nx * cell_ny;
    let mut centroids = Array2::zeros((n, 2));
    let mut polygons = Vec::with_capacity(n);

    for row in 0..cell_ny {
        for col in 0..cell_nx {
            let cell_id = row * cell_nx + col;
            let x0 = xoff + col as f64 * side;
            let y0 = yoff + row as f64 * side;
            let (x1, y1) = (x0 + side, y0 + side);
            centroids[[cell_id, 0]] = xoff + (col as f64 + 0.5) * side;
            centroids[[cell_id, 1]] = yoff + (row as f64 + 0.5) * side;
            polygons.push(vec![[x0, y0], [x1, y0], [x1, y1], [x0, y1], [x0, y0]]);
        }
    }
    (side, centroids, polygons)
}

/// Pointy-topped hexagonal cells with odd rows shifted right by one apothem
fn hexagon_cells(
    cell_area: f64,
    cell_nx: usize,
    cell_ny: usize,
    xoff: f64,
    yoff: f64,
) -> (f64, Array2<f64>, Vec<Polygon>) {
    // A = 3√3/2 · s²
    let side = (2.0 * cell_area / (3.0 * 3f64.sqrt())).sqrt();
    let apothem = side * 3f64.sqrt() / 2.0;
    let n = cell_nx * cell_ny;
    let mut centroids = Array2::zeros((n, 2));
    let mut polygons = Vec::with_capacity(n);

    let offsets: Vec<Point> = (0..6)
        .map(|k| {
            let angle = (30.0 + 60.0 * k as f64).to_radians();
            [side * angle.cos(), side * angle.sin()]
        })
        .collect();

    for row in 0..cell_ny {
        for col in 0..cell_nx {
            let cell_id = row * cell_nx + col;
            let cx = xoff + apothem * (2 * col + 1 + row % 2) as f64;
            let cy = yoff + side * (1.0 + 1.5 * row as f64);
            centroids[[cell_id, 0]] = cx;
            centroids[[cell_id, 1]] = cy;

            let mut ring: Polygon = offsets.iter().map(|[dx, dy]| [cx + dx, cy + dy]).collect();
            ring.push(ring[0]);
            polygons.push(ring);
        }
    }
    (side, centroids, polygons)
}
