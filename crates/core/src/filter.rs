//! Acceptance filters applied to tile-space geometry before encoding.

use geo::Geometry;

/// Decides whether a geometry becomes a feature.
///
/// A rejected geometry does not consume a feature id.
pub trait GeometryFilter {
    fn accept(&self, geometry: &Geometry<f64>) -> bool;
}

impl<F> GeometryFilter for F
where
    F: Fn(&Geometry<f64>) -> bool,
{
    fn accept(&self, geometry: &Geometry<f64>) -> bool {
        self(geometry)
    }
}

/// Accepts every geometry.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl GeometryFilter for AcceptAll {
    fn accept(&self, _geometry: &Geometry<f64>) -> bool {
        true
    }
}
