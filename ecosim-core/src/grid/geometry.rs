//! Planar geometry helpers for cell polygons.

use serde::{Deserialize, Serialize};

/// A vertex in the plane
pub type Point = [f64; 2];

/// A closed ring of vertices; the last vertex repeats the first
pub type Polygon = Vec<Point>;

/// Where a point sits relative to a polygon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Inside,
    Boundary,
    Outside,
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl Bounds {
    /// Bounding box of a set of vertices
    pub fn of_points<'a>(points: impl IntoIterator<Item = &'a Point>) -> Self {
        let mut bounds = Bounds {
            xmin: f64::INFINITY,
            ymin: f64::INFINITY,
            xmax: f64::NEG_INFINITY,
            ymax: f64::NEG_INFINITY,
        };
        for [x, y] in points {
            bounds.xmin = bounds.xmin.min(*x);
            bounds.ymin = bounds.ymin.min(*y);
            bounds.xmax = bounds.xmax.max(*x);
            bounds.ymax = bounds.ymax.max(*y);
        }
        bounds
    }

    /// Whether a point lies within the box, widened by `tol` on every side
    pub fn contains(&self, point: Point, tol: f64) -> bool {
        point[0] >= self.xmin - tol
            && point[0] <= self.xmax + tol
            && point[1] >= self.ymin - tol
            && point[1] <= self.ymax + tol
    }
}

/// Distance from `p` to the segment `a`-`b`
fn segment_distance(p: Point, a: Point, b: Point) -> f64 {
    let (dx, dy) = (b[0] - a[0], b[1] - a[1]);
    let len2 = dx * dx + dy * dy;
    let t = if len2 == 0.0 {
        0.0
    } else {
        (((p[0] - a[0]) * dx + (p[1] - a[1]) * dy) / len2).clamp(0.0, 1.0)
    };
    let (cx, cy) = (a[0] + t * dx, a[1] + t * dy);
    (p[0] - cx).hypot(p[1] - cy)
}

/// Locate a point relative to a closed ring.
///
/// Points within `tol` of any edge are reported as [`Location::Boundary`];
/// otherwise an even-odd ray cast decides between inside and outside.
pub fn locate(point: Point, ring: &[Point], tol: f64) -> Location {
    for edge in ring.windows(2) {
        if segment_distance(point, edge[0], edge[1]) <= tol {
            return Location::Boundary;
        }
    }

    let [px, py] = point;
    let mut inside = false;
    for edge in ring.windows(2) {
        let ([xi, yi], [xj, yj]) = (edge[0], edge[1]);
        if (yi > py) != (yj > py) {
            let x_cross = xi + (py - yi) * (xj - xi) / (yj - yi);
            if px < x_cross {
                inside = !inside;
            }
        }
    }

    if inside {
        Location::Inside
    } else {
        Location::Outside
    }
}

/// Whether two rings have the same vertices, in the same order, within `tol`
pub fn rings_match(a: &[Point], b: &[Point], tol: f64) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b.iter())
            .all(|(p, q)| (p[0] - q[0]).abs() <= tol && (p[1] - q[1]).abs() <= tol)
}
