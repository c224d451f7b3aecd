//! World-to-tile coordinate transformation.
//!
//! Maps clipped geometry from world coordinates into the tile's pixel grid,
//! snaps every coordinate to an integer, and then runs a topology-preserving
//! Visvalingam-Whyatt pass to remove the near-collinear vertices the snapping
//! leaves behind.
//!
//! # Coordinate Spaces
//!
//! ```text
//! world (min_x..min_x+width, min_y..min_y+height, y up)
//!     → tile pixels (0..extent, 0..extent, y down)
//! ```
//!
//! The envelope's top-left corner lands on `(0, 0)` and its bottom-right
//! corner on `(extent, extent)`.

use geo::{
    AffineOps, AffineTransform, Coord, Geometry, LineString, MapCoordsInPlace, MultiLineString,
    SimplifyVwPreserve,
};

use crate::envelope::TileEnvelope;
use crate::geometry::TaggedGeometry;
use crate::{Error, Result};

/// Round half-up: `2.5 → 3`, `-2.5 → -2`.
#[inline]
pub fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

/// Transforms world geometry into integer tile coordinates.
#[derive(Debug, Clone)]
pub struct TileTransformer {
    affine: AffineTransform<f64>,
    tolerance: f64,
}

impl TileTransformer {
    /// Build the transform for `envelope`.
    ///
    /// `tolerance` is the simplification threshold in square pixels and must
    /// lie strictly between 0 and 0.5.
    pub fn new(envelope: &TileEnvelope, tolerance: f64) -> Result<Self> {
        if !(tolerance > 0.0 && tolerance < 0.5) {
            return Err(Error::InvalidTolerance(tolerance));
        }

        let extent = envelope.extent() as f64;
        let sx = extent / envelope.width();
        let sy = extent / envelope.height();

        // translate(-min) → scale(sx, -sy) → translate(0, extent), composed by hand
        let affine = AffineTransform::new(
            sx,
            0.0,
            -sx * envelope.min_x(),
            0.0,
            -sy,
            sy * envelope.min_y() + extent,
        );

        Ok(Self { affine, tolerance })
    }

    pub fn affine(&self) -> &AffineTransform<f64> {
        &self.affine
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Map a single world coordinate into tile space, without rounding.
    pub fn to_tile_coord(&self, coord: Coord<f64>) -> Coord<f64> {
        self.affine.apply(coord)
    }

    /// Transform, round and simplify one geometry.
    pub fn transform_geometry(&self, geom: &Geometry<f64>) -> Geometry<f64> {
        let mut tile_geom = geom.affine_transform(&self.affine);
        tile_geom.map_coords_in_place(|c| Coord {
            x: round_half_up(c.x),
            y: round_half_up(c.y),
        });
        self.simplify(tile_geom)
    }

    /// Transform a tagged geometry; the user data carries over.
    pub fn transform<D>(&self, tagged: &TaggedGeometry<D>) -> TaggedGeometry<D> {
        tagged.derive(self.transform_geometry(&tagged.geometry))
    }

    pub fn transform_all<D>(&self, geometries: &[TaggedGeometry<D>]) -> Vec<TaggedGeometry<D>> {
        geometries.iter().map(|g| self.transform(g)).collect()
    }

    fn simplify(&self, geom: Geometry<f64>) -> Geometry<f64> {
        let tolerance = self.tolerance;
        match geom {
            // Points have no vertices to simplify
            Geometry::Point(_) | Geometry::MultiPoint(_) => geom,

            // Degenerate linestrings are returned unchanged; the encoder rejects them
            Geometry::LineString(ls) => Geometry::LineString(simplify_line(ls, tolerance)),
            Geometry::MultiLineString(mls) => Geometry::MultiLineString(MultiLineString::new(
                mls.0.into_iter().map(|ls| simplify_line(ls, tolerance)).collect(),
            )),
            Geometry::Polygon(poly) => Geometry::Polygon(poly.simplify_vw_preserve(&tolerance)),
            Geometry::MultiPolygon(mp) => {
                Geometry::MultiPolygon(mp.simplify_vw_preserve(&tolerance))
            }
            Geometry::GeometryCollection(mut gc) => {
                gc.0 = gc.0.into_iter().map(|g| self.simplify(g)).collect();
                Geometry::GeometryCollection(gc)
            }
            other => other,
        }
    }
}

fn simplify_line(ls: LineString<f64>, tolerance: f64) -> LineString<f64> {
    if ls.0.len() < 3 {
        return ls;
    }
    ls.simplify_vw_preserve(&tolerance)
}
