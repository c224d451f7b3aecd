//! Geometry clipping to a tile envelope.
//!
//! Every source geometry is validated first, then intersected with the
//! envelope rectangle:
//! - **Points** are kept when they lie inside the envelope or on its boundary
//! - **Lines** are cut with `BooleanOps::clip`
//! - **Polygons** are intersected with `BooleanOps::intersection`
//!
//! Geometries that are invalid, or whose boolean operation fails, are skipped
//! and reported as [`ClipDiagnostic`]s. One bad geometry never stops a tile.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use geo::{
    BooleanOps, BoundingRect, Geometry, GeometryCollection, LineString, MultiLineString,
    MultiPoint, MultiPolygon, Point, Polygon, Rect,
};
use thiserror::Error;

use crate::envelope::TileEnvelope;
use crate::geometry::TaggedGeometry;
use crate::validate::{validate_geometry, InvalidReason, ValidationResult};

/// Why a source geometry was left out of the clipped output.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClipDiagnostic {
    #[error("geometry {index} is invalid: {reason}")]
    InvalidGeometry { index: usize, reason: InvalidReason },

    #[error("geometry {index} could not be clipped: {message}")]
    TopologyFailure { index: usize, message: String },
}

impl ClipDiagnostic {
    /// Position of the offending geometry in the clipper's input.
    pub fn index(&self) -> usize {
        match self {
            ClipDiagnostic::InvalidGeometry { index, .. }
            | ClipDiagnostic::TopologyFailure { index, .. } => *index,
        }
    }

    /// Same diagnostic pointing at `index` instead.
    pub fn with_index(mut self, new_index: usize) -> Self {
        match &mut self {
            ClipDiagnostic::InvalidGeometry { index, .. }
            | ClipDiagnostic::TopologyFailure { index, .. } => *index = new_index,
        }
        self
    }
}

/// Surviving geometries in input order, plus one diagnostic per skipped input.
#[derive(Debug, Clone)]
pub struct ClipOutput<D> {
    pub geometries: Vec<TaggedGeometry<D>>,
    pub diagnostics: Vec<ClipDiagnostic>,
}

/// Intersects geometries with one tile envelope.
#[derive(Debug, Clone)]
pub struct TileClipper {
    envelope: TileEnvelope,
    bounds: Rect<f64>,
    clip_poly: Polygon<f64>,
}

impl TileClipper {
    pub fn new(envelope: &TileEnvelope) -> Self {
        Self {
            envelope: *envelope,
            bounds: envelope.to_rect(),
            clip_poly: envelope.to_polygon(),
        }
    }

    pub fn envelope(&self) -> &TileEnvelope {
        &self.envelope
    }

    /// Clip every geometry, keeping order and user data.
    ///
    /// Inputs that clip to nothing are dropped without a diagnostic.
    pub fn clip_all<D>(&self, geometries: &[TaggedGeometry<D>]) -> ClipOutput<D> {
        self.clip_all_with(geometries, |geom: &Geometry<f64>| self.clip(geom))
    }

    fn clip_all_with<D, F>(&self, geometries: &[TaggedGeometry<D>], op: F) -> ClipOutput<D>
    where
        F: Fn(&Geometry<f64>) -> Option<Geometry<f64>>,
    {
        let mut output = ClipOutput {
            geometries: Vec::with_capacity(geometries.len()),
            diagnostics: Vec::new(),
        };

        for (index, tagged) in geometries.iter().enumerate() {
            match self.clip_tagged_with(index, tagged, &op) {
                Ok(Some(clipped)) => output.geometries.push(clipped),
                Ok(None) => {}
                Err(diagnostic) => {
                    log::warn!("skipping geometry: {}", diagnostic);
                    output.diagnostics.push(diagnostic);
                }
            }
        }

        output
    }

    /// Clip one tagged geometry; `index` only labels the diagnostic.
    pub fn clip_tagged<D>(
        &self,
        index: usize,
        tagged: &TaggedGeometry<D>,
    ) -> Result<Option<TaggedGeometry<D>>, ClipDiagnostic> {
        self.clip_tagged_with(index, tagged, &|geom: &Geometry<f64>| self.clip(geom))
    }

    /// Validate, then run `op` with panics turned into topology failures.
    fn clip_tagged_with<D, F>(
        &self,
        index: usize,
        tagged: &TaggedGeometry<D>,
        op: &F,
    ) -> Result<Option<TaggedGeometry<D>>, ClipDiagnostic>
    where
        F: Fn(&Geometry<f64>) -> Option<Geometry<f64>>,
    {
        if let ValidationResult::Invalid(reason) = validate_geometry(&tagged.geometry) {
            return Err(ClipDiagnostic::InvalidGeometry { index, reason });
        }

        let clipped = catch_unwind(AssertUnwindSafe(|| op(&tagged.geometry))).map_err(
            |payload| ClipDiagnostic::TopologyFailure {
                index,
                message: panic_message(payload.as_ref()),
            },
        )?;

        Ok(clipped.map(|geometry| tagged.derive(geometry)))
    }

    /// Intersect a geometry with the envelope.
    ///
    /// Returns `None` when nothing of the geometry lies inside. Assumes the
    /// geometry already passed validation.
    pub fn clip(&self, geom: &Geometry<f64>) -> Option<Geometry<f64>> {
        match geom {
            Geometry::Point(p) => self.clip_point(p).map(Geometry::Point),
            Geometry::MultiPoint(mp) => self.clip_multipoint(mp).map(Geometry::MultiPoint),
            Geometry::LineString(ls) => {
                let mut parts = self.clip_lines(&MultiLineString::new(vec![ls.clone()]))?;
                if parts.0.len() == 1 {
                    parts.0.pop().map(Geometry::LineString)
                } else {
                    Some(Geometry::MultiLineString(parts))
                }
            }
            Geometry::MultiLineString(mls) => self.clip_lines(mls).map(Geometry::MultiLineString),
            Geometry::Polygon(poly) => self.clip_polygon(poly),
            Geometry::MultiPolygon(mp) => self.clip_multipolygon(mp).map(Geometry::MultiPolygon),
            Geometry::GeometryCollection(gc) => {
                let parts: Vec<Geometry<f64>> = gc.0.iter().filter_map(|g| self.clip(g)).collect();
                if parts.is_empty() {
                    None
                } else {
                    Some(Geometry::GeometryCollection(GeometryCollection::new_from(parts)))
                }
            }
            other => {
                log::trace!("not clipping unsupported geometry: {:?}", other);
                None
            }
        }
    }

    /// Simple containment check, boundary included.
    fn clip_point(&self, point: &Point<f64>) -> Option<Point<f64>> {
        self.envelope.contains(point.0).then_some(*point)
    }

    fn clip_multipoint(&self, mp: &MultiPoint<f64>) -> Option<MultiPoint<f64>> {
        let kept: Vec<Point<f64>> = mp.0.iter().filter_map(|p| self.clip_point(p)).collect();
        if kept.is_empty() {
            None
        } else {
            Some(MultiPoint::new(kept))
        }
    }

    /// `clip_poly.clip(&lines, false)` keeps the parts inside the polygon.
    fn clip_lines(&self, mls: &MultiLineString<f64>) -> Option<MultiLineString<f64>> {
        let rect = mls.bounding_rect()?;
        if !self.intersects(&rect) {
            return None;
        }
        if self.covers(&rect) {
            return Some(mls.clone());
        }

        let clipped = self.clip_poly.clip(mls, false);
        let parts: Vec<LineString<f64>> =
            clipped.0.into_iter().filter(|ls| ls.0.len() >= 2).collect();

        if parts.is_empty() {
            None
        } else {
            Some(MultiLineString::new(parts))
        }
    }

    /// Returns `Geometry::Polygon` for a single result, or
    /// `Geometry::MultiPolygon` when the clip splits the polygon
    /// (e.g. a U shape clipped across its opening).
    fn clip_polygon(&self, poly: &Polygon<f64>) -> Option<Geometry<f64>> {
        let rect = poly.bounding_rect()?;
        if !self.intersects(&rect) {
            return None;
        }

        // FAST PATH: fully inside, nothing to cut
        if self.covers(&rect) {
            return Some(Geometry::Polygon(poly.clone()));
        }

        let mut result: MultiPolygon<f64> = poly.intersection(&self.clip_poly);
        match result.0.len() {
            0 => None,
            1 => result.0.pop().map(Geometry::Polygon),
            _ => Some(Geometry::MultiPolygon(result)),
        }
    }

    fn clip_multipolygon(&self, mp: &MultiPolygon<f64>) -> Option<MultiPolygon<f64>> {
        let rect = mp.bounding_rect()?;
        if !self.intersects(&rect) {
            return None;
        }
        if self.covers(&rect) {
            return Some(mp.clone());
        }

        let result = mp.intersection(&self.clip_poly);
        if result.0.is_empty() {
            None
        } else {
            Some(result)
        }
    }

    /// Quick rejection test
    fn intersects(&self, rect: &Rect<f64>) -> bool {
        rect.max().x >= self.bounds.min().x
            && rect.min().x <= self.bounds.max().x
            && rect.max().y >= self.bounds.min().y
            && rect.min().y <= self.bounds.max().y
    }

    fn covers(&self, rect: &Rect<f64>) -> bool {
        rect.min().x >= self.bounds.min().x
            && rect.max().x <= self.bounds.max().x
            && rect.min().y >= self.bounds.min().y
            && rect.max().y <= self.bounds.max().y
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "boolean operation panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{coord, line_string, point, polygon, Area, CoordsIter};

    fn clipper() -> TileClipper {
        TileClipper::new(&TileEnvelope::new(0.0, 0.0, 10.0, 10.0, 4096).unwrap())
    }

    fn all_coords_within(geom: &Geometry<f64>, min: f64, max: f64) -> bool {
        geom.coords_iter()
            .all(|c| c.x >= min - 1e-9 && c.x <= max + 1e-9 && c.y >= min - 1e-9 && c.y <= max + 1e-9)
    }

    // ========== Point Clipping Tests ==========

    #[test]
    fn test_clip_point_inside() {
        let geom = Geometry::Point(point!(x: 5.0, y: 5.0));
        assert_eq!(clipper().clip(&geom), Some(geom));
    }

    #[test]
    fn test_clip_point_outside() {
        let geom = Geometry::Point(point!(x: 15.0, y: 5.0));
        assert_eq!(clipper().clip(&geom), None);
    }

    #[test]
    fn test_clip_point_on_boundary() {
        let geom = Geometry::Point(point!(x: 10.0, y: 5.0));
        assert!(clipper().clip(&geom).is_some());
    }

    #[test]
    fn test_clip_multipoint_filters_outside() {
        let geom = Geometry::MultiPoint(MultiPoint::from(vec![(1.0, 1.0), (20.0, 1.0), (9.0, 9.0)]));
        assert_eq!(
            clipper().clip(&geom),
            Some(Geometry::MultiPoint(MultiPoint::from(vec![(1.0, 1.0), (9.0, 9.0)])))
        );
    }

    // ========== Line Clipping Tests ==========

    #[test]
    fn test_clip_linestring_crossing() {
        let geom = Geometry::LineString(line_string![(x: -5.0, y: 5.0), (x: 15.0, y: 5.0)]);
        let clipped = clipper().clip(&geom).unwrap();

        match &clipped {
            Geometry::LineString(ls) => {
                let xs: Vec<f64> = ls.coords().map(|c| c.x).collect();
                assert!(xs.iter().any(|x| (x - 0.0).abs() < 1e-9));
                assert!(xs.iter().any(|x| (x - 10.0).abs() < 1e-9));
            }
            other => panic!("Expected LineString, got {:?}", other),
        }
        assert!(all_coords_within(&clipped, 0.0, 10.0));
    }

    #[test]
    fn test_clip_linestring_split_in_two() {
        // Leaves the tile through the top and comes back
        let geom = Geometry::LineString(line_string![
            (x: 2.0, y: 5.0),
            (x: 2.0, y: 15.0),
            (x: 8.0, y: 15.0),
            (x: 8.0, y: 5.0),
        ]);
        match clipper().clip(&geom) {
            Some(Geometry::MultiLineString(mls)) => assert_eq!(mls.0.len(), 2),
            other => panic!("Expected MultiLineString, got {:?}", other),
        }
    }

    #[test]
    fn test_clip_linestring_outside() {
        let geom = Geometry::LineString(line_string![(x: 20.0, y: 20.0), (x: 30.0, y: 30.0)]);
        assert_eq!(clipper().clip(&geom), None);
    }

    // ========== Polygon Clipping Tests ==========

    #[test]
    fn test_clip_polygon_partial() {
        let geom = Geometry::Polygon(polygon![
            (x: -5.0, y: -5.0),
            (x: 5.0, y: -5.0),
            (x: 5.0, y: 5.0),
            (x: -5.0, y: 5.0),
            (x: -5.0, y: -5.0),
        ]);
        let clipped = clipper().clip(&geom).unwrap();

        assert!(all_coords_within(&clipped, 0.0, 10.0));
        assert!((clipped.unsigned_area() - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_clip_polygon_fully_inside_unchanged() {
        let geom = Geometry::Polygon(polygon![
            (x: 1.0, y: 1.0),
            (x: 4.0, y: 1.0),
            (x: 4.0, y: 4.0),
            (x: 1.0, y: 4.0),
            (x: 1.0, y: 1.0),
        ]);
        assert_eq!(clipper().clip(&geom), Some(geom));
    }

    #[test]
    fn test_clip_u_shape_splits_into_multipolygon() {
        let clipper =
            TileClipper::new(&TileEnvelope::from_bounds(0.0, 20.0, 30.0, 40.0, 4096).unwrap());
        let u_shape = Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: 30.0, y: 0.0),
            (x: 30.0, y: 30.0),
            (x: 20.0, y: 30.0),
            (x: 20.0, y: 10.0),
            (x: 10.0, y: 10.0),
            (x: 10.0, y: 30.0),
            (x: 0.0, y: 30.0),
            (x: 0.0, y: 0.0),
        ]);

        match clipper.clip(&u_shape) {
            Some(Geometry::MultiPolygon(mp)) => {
                assert_eq!(mp.0.len(), 2);
                assert!((mp.unsigned_area() - 200.0).abs() < 1e-9);
            }
            other => panic!("Expected MultiPolygon, got {:?}", other),
        }
    }

    #[test]
    fn test_clip_polygon_outside() {
        let geom = Geometry::Polygon(polygon![
            (x: 20.0, y: 20.0),
            (x: 30.0, y: 20.0),
            (x: 30.0, y: 30.0),
            (x: 20.0, y: 20.0),
        ]);
        assert_eq!(clipper().clip(&geom), None);
    }

    // ========== Batch Tests ==========

    #[test]
    fn test_clip_all_reports_invalid_and_keeps_order() {
        let bowtie = Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 10.0, y: 0.0),
            (x: 0.0, y: 10.0),
            (x: 0.0, y: 0.0),
        ]);
        let input = vec![
            TaggedGeometry::with_user_data(Geometry::Point(point!(x: 1.0, y: 1.0)), "a"),
            TaggedGeometry::with_user_data(bowtie, "b"),
            TaggedGeometry::with_user_data(Geometry::Point(point!(x: 50.0, y: 1.0)), "c"),
            TaggedGeometry::with_user_data(Geometry::Point(point!(x: 2.0, y: 2.0)), "d"),
        ];

        let output = clipper().clip_all(&input);

        let tags: Vec<&str> = output.geometries.iter().filter_map(|g| g.user_data().copied()).collect();
        assert_eq!(tags, vec!["a", "d"]);
        assert_eq!(output.diagnostics.len(), 1);
        assert!(matches!(
            output.diagnostics[0],
            ClipDiagnostic::InvalidGeometry { index: 1, .. }
        ));
    }

    #[test]
    fn test_clip_non_finite_point_reported() {
        let input = vec![TaggedGeometry::<()>::new(Geometry::Point(point!(x: f64::NAN, y: 1.0)))];
        let output = clipper().clip_all(&input);

        assert!(output.geometries.is_empty());
        assert_eq!(output.diagnostics[0].index(), 0);
    }

    #[test]
    fn test_clip_panic_reported_as_topology_failure() {
        let input = vec![
            TaggedGeometry::with_user_data(Geometry::Point(point!(x: 1.0, y: 1.0)), "a"),
            TaggedGeometry::with_user_data(Geometry::Point(point!(x: 2.0, y: 2.0)), "b"),
            TaggedGeometry::with_user_data(Geometry::Point(point!(x: 3.0, y: 3.0)), "c"),
        ];
        let clipper = clipper();

        let output = clipper.clip_all_with(&input, |geom| {
            if geom == &Geometry::Point(point!(x: 2.0, y: 2.0)) {
                panic!("sweep line failed");
            }
            clipper.clip(geom)
        });

        let tags: Vec<&str> = output.geometries.iter().filter_map(|g| g.user_data().copied()).collect();
        assert_eq!(tags, vec!["a", "c"]);
        assert_eq!(
            output.diagnostics,
            vec![ClipDiagnostic::TopologyFailure {
                index: 1,
                message: "sweep line failed".to_string(),
            }]
        );
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("overlay failed");
        assert_eq!(panic_message(payload.as_ref()), "overlay failed");

        let payload: Box<dyn Any + Send> = Box::new(String::from("sweep failed"));
        assert_eq!(panic_message(payload.as_ref()), "sweep failed");
    }

    #[test]
    fn test_envelope_accessor() {
        let clipper = clipper();
        assert_eq!(clipper.envelope().to_rect().max(), coord! { x: 10.0, y: 10.0 });
    }
}
