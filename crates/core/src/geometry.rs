//! Geometry paired with caller-defined user data.

use std::sync::Arc;

use geo::Geometry;

/// A geometry plus an opaque attachment handed to the tag converter.
///
/// The attachment is shared, so clipping and transforming a geometry hands
/// the same user data to every geometry derived from it.
#[derive(Debug, PartialEq)]
pub struct TaggedGeometry<D> {
    pub geometry: Geometry<f64>,
    pub user_data: Option<Arc<D>>,
}

impl<D> TaggedGeometry<D> {
    /// A geometry without user data.
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            geometry,
            user_data: None,
        }
    }

    pub fn with_user_data(geometry: Geometry<f64>, user_data: D) -> Self {
        Self {
            geometry,
            user_data: Some(Arc::new(user_data)),
        }
    }

    /// A new geometry carrying the same user data as `self`.
    pub fn derive(&self, geometry: Geometry<f64>) -> Self {
        Self {
            geometry,
            user_data: self.user_data.clone(),
        }
    }

    pub fn user_data(&self) -> Option<&D> {
        self.user_data.as_deref()
    }
}

// Manual impl: cloning shares the attachment, so `D` need not be `Clone`.
impl<D> Clone for TaggedGeometry<D> {
    fn clone(&self) -> Self {
        self.derive(self.geometry.clone())
    }
}

impl<D> From<Geometry<f64>> for TaggedGeometry<D> {
    fn from(geometry: Geometry<f64>) -> Self {
        Self::new(geometry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::point;

    #[test]
    fn test_derive_shares_user_data() {
        let source = TaggedGeometry::with_user_data(Geometry::Point(point!(x: 1.0, y: 2.0)), "road");
        let derived = source.derive(Geometry::Point(point!(x: 3.0, y: 4.0)));

        assert_eq!(derived.user_data(), Some(&"road"));
        assert!(Arc::ptr_eq(
            source.user_data.as_ref().unwrap(),
            derived.user_data.as_ref().unwrap()
        ));
    }

    #[test]
    fn test_new_has_no_user_data() {
        let tagged: TaggedGeometry<String> = Geometry::Point(point!(x: 0.0, y: 0.0)).into();
        assert!(tagged.user_data().is_none());
    }
}
