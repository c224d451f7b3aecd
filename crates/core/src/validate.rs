//! Validity checks run on source geometry before clipping.
//!
//! Boolean operations assume well-formed input. A self-intersecting ring or a
//! NaN coordinate can make the overlay produce garbage or panic, so such
//! geometries are reported and skipped instead of clipped.
//!
//! Checks:
//! - Non-finite coordinates
//! - LineStrings with fewer than 2 points
//! - Polygon rings with fewer than 4 points (3 distinct + closing point)
//! - Spikes, where a ring revisits one of its own vertices
//! - Self-intersections between non-adjacent ring edges
//!
//! # Usage
//!
//! ```
//! use mvt_geom_core::validate::validate_geometry;
//! use geo::{Geometry, LineString, Polygon};
//!
//! // A bowtie (self-intersecting) polygon
//! let bowtie = Geometry::Polygon(Polygon::new(
//!     LineString::from(vec![(0.0, 0.0), (10.0, 10.0), (10.0, 0.0), (0.0, 10.0), (0.0, 0.0)]),
//!     vec![],
//! ));
//! assert!(validate_geometry(&bowtie).is_invalid());
//! ```

use geo::line_intersection::{line_intersection, LineIntersection};
use geo::{Coord, Geometry, Line, LineString, Polygon};
use thiserror::Error;

/// Minimum number of points for a valid polygon ring (3 unique + closing = 4)
pub const MIN_POLYGON_RING_POINTS: usize = 4;

/// Minimum number of points for a valid linestring
pub const MIN_LINESTRING_POINTS: usize = 2;

/// Result of geometry validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// Geometry is valid and can be clipped
    Valid,
    /// Geometry is invalid and should be skipped
    Invalid(InvalidReason),
}

/// Reason why a geometry is invalid
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    #[error("non-finite coordinate at index {index}")]
    NonFiniteCoordinate { index: usize },

    #[error("linestring has {point_count} points, at least 2 are required")]
    LineStringTooFewPoints { point_count: usize },

    #[error("ring {ring_index} has {point_count} points, at least 4 are required")]
    RingTooFewPoints { ring_index: usize, point_count: usize },

    #[error("ring {ring_index} is not closed")]
    RingNotClosed { ring_index: usize },

    #[error("ring {ring_index} revisits a vertex")]
    RingSpike { ring_index: usize },

    #[error("ring {ring_index} intersects itself")]
    RingSelfIntersection { ring_index: usize },

    #[error("component {index}: {reason}")]
    Component {
        index: usize,
        reason: Box<InvalidReason>,
    },
}

impl ValidationResult {
    /// Returns true if the geometry is valid
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    /// Returns true if the geometry is invalid
    pub fn is_invalid(&self) -> bool {
        matches!(self, ValidationResult::Invalid(_))
    }

    fn from_reason(reason: Option<InvalidReason>) -> Self {
        match reason {
            Some(reason) => ValidationResult::Invalid(reason),
            None => ValidationResult::Valid,
        }
    }
}

/// Check if a geometry is valid for clipping.
pub fn is_valid_geometry(geom: &Geometry<f64>) -> bool {
    validate_geometry(geom).is_valid()
}

/// Validate a geometry, returning the first problem found.
///
/// Empty multi-geometries are valid: they simply clip to nothing.
pub fn validate_geometry(geom: &Geometry<f64>) -> ValidationResult {
    let reason = match geom {
        Geometry::Point(p) => check_coords(std::iter::once(p.0)),
        Geometry::MultiPoint(mp) => check_coords(mp.0.iter().map(|p| p.0)),
        Geometry::LineString(ls) => check_linestring(ls),
        Geometry::MultiLineString(mls) => first_component(mls.0.iter().map(check_linestring)),
        Geometry::Polygon(poly) => check_polygon(poly),
        Geometry::MultiPolygon(mp) => first_component(mp.0.iter().map(check_polygon)),
        Geometry::GeometryCollection(gc) => first_component(gc.0.iter().map(|g| {
            match validate_geometry(g) {
                ValidationResult::Valid => None,
                ValidationResult::Invalid(reason) => Some(reason),
            }
        })),
        Geometry::Line(line) => check_coords([line.start, line.end].into_iter()),
        Geometry::Rect(rect) => check_coords([rect.min(), rect.max()].into_iter()),
        Geometry::Triangle(tri) => check_coords(tri.to_array().into_iter()),
    };
    ValidationResult::from_reason(reason)
}

fn first_component(reasons: impl Iterator<Item = Option<InvalidReason>>) -> Option<InvalidReason> {
    reasons
        .enumerate()
        .find_map(|(index, reason)| reason.map(|r| (index, r)))
        .map(|(index, reason)| InvalidReason::Component {
            index,
            reason: Box::new(reason),
        })
}

fn check_coords(coords: impl Iterator<Item = Coord<f64>>) -> Option<InvalidReason> {
    coords
        .enumerate()
        .find(|(_, c)| !c.x.is_finite() || !c.y.is_finite())
        .map(|(index, _)| InvalidReason::NonFiniteCoordinate { index })
}

fn check_linestring(ls: &LineString<f64>) -> Option<InvalidReason> {
    if let Some(reason) = check_coords(ls.0.iter().copied()) {
        return Some(reason);
    }
    let point_count = ls.0.len();
    if point_count < MIN_LINESTRING_POINTS {
        return Some(InvalidReason::LineStringTooFewPoints { point_count });
    }
    None
}

fn check_polygon(poly: &Polygon<f64>) -> Option<InvalidReason> {
    std::iter::once(poly.exterior())
        .chain(poly.interiors())
        .enumerate()
        .find_map(|(ring_index, ring)| check_ring(ring, ring_index))
}

/// Validate a single ring. Index 0 is the exterior.
fn check_ring(ring: &LineString<f64>, ring_index: usize) -> Option<InvalidReason> {
    let coords = &ring.0;

    // An empty interior ring is harmless; an empty exterior makes an empty polygon.
    if coords.is_empty() {
        return None;
    }

    if let Some(reason) = check_coords(coords.iter().copied()) {
        return Some(reason);
    }

    if coords.len() < MIN_POLYGON_RING_POINTS {
        return Some(InvalidReason::RingTooFewPoints {
            ring_index,
            point_count: coords.len(),
        });
    }

    if coords.first() != coords.last() {
        return Some(InvalidReason::RingNotClosed { ring_index });
    }

    if has_spike(coords) {
        return Some(InvalidReason::RingSpike { ring_index });
    }

    if has_self_intersection(coords) {
        return Some(InvalidReason::RingSelfIntersection { ring_index });
    }

    None
}

/// Check if a closed ring revisits a vertex at non-adjacent positions.
///
/// A spike occurs when the ring goes to a point and returns, like:
/// `(2,4) → (2,6) → (2,4)`. Consecutive repeats are not spikes.
fn has_spike(coords: &[Coord<f64>]) -> bool {
    // The closing vertex duplicates the first one
    let n = coords.len() - 1;

    // Group equal vertices by sorting; adding 0.0 folds -0.0 into 0.0
    let key = |i: usize| (coords[i].x + 0.0, coords[i].y + 0.0);
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_unstable_by(|&a, &b| {
        let (ax, ay) = key(a);
        let (bx, by) = key(b);
        ax.total_cmp(&bx).then(ay.total_cmp(&by)).then(a.cmp(&b))
    });

    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && key(order[end]) == key(order[start]) {
            end += 1;
        }

        let group = &order[start..end];
        for (k, &i) in group.iter().enumerate() {
            for &j in &group[k + 1..] {
                if j < i + 2 || (i == 0 && j == n - 1) {
                    continue;
                }
                if coords[j - 1] != coords[j] {
                    return true;
                }
            }
        }

        start = end;
    }

    false
}

fn min_x(line: &Line<f64>) -> f64 {
    line.start.x.min(line.end.x)
}

fn y_ranges_overlap(a: &Line<f64>, b: &Line<f64>) -> bool {
    a.start.y.min(a.end.y) <= b.start.y.max(b.end.y)
        && b.start.y.min(b.end.y) <= a.start.y.max(a.end.y)
}

/// Check if a closed ring has a proper crossing between non-adjacent edges.
///
/// Edges are swept by their x range so only pairs with overlapping bounding
/// boxes reach `line_intersection`.
fn has_self_intersection(coords: &[Coord<f64>]) -> bool {
    let edges: Vec<Line<f64>> = coords.windows(2).map(|w| Line::new(w[0], w[1])).collect();
    let num_edges = edges.len();

    let mut order: Vec<usize> = (0..num_edges).collect();
    order.sort_unstable_by(|&a, &b| min_x(&edges[a]).total_cmp(&min_x(&edges[b])));

    for (pos, &a) in order.iter().enumerate() {
        let max_x = edges[a].start.x.max(edges[a].end.x);

        for &b in &order[pos + 1..] {
            if min_x(&edges[b]) > max_x {
                break;
            }

            let (i, j) = if a < b { (a, b) } else { (b, a) };
            // Adjacent edges share a vertex; first and last share the closing one
            if j == i + 1 || (i == 0 && j == num_edges - 1) {
                continue;
            }
            if !y_ranges_overlap(&edges[i], &edges[j]) {
                continue;
            }
            if edges_cross(edges[i], edges[j]) {
                return true;
            }
        }
    }

    false
}

fn edges_cross(edge_i: Line<f64>, edge_j: Line<f64>) -> bool {
    match line_intersection(edge_i, edge_j) {
        Some(LineIntersection::SinglePoint { intersection, .. }) => {
            let is_endpoint_i = intersection == edge_i.start || intersection == edge_i.end;
            let is_endpoint_j = intersection == edge_j.start || intersection == edge_j.end;

            // Touching at shared vertices is not a crossing
            !(is_endpoint_i && is_endpoint_j)
        }
        // Degenerate zero-length edges from repeated points overlap trivially
        Some(LineIntersection::Collinear { intersection }) => intersection.start != intersection.end,
        None => false,
    }
}
