//! Flatten geometry trees into MVT-ready primitives.
//!
//! MVT features carry one of three geometry types, so nested
//! `GeometryCollection`s have to be broken up into a flat list of
//! Point, MultiPoint, LineString, MultiLineString, Polygon and MultiPolygon.
//! Any other variant (`Line`, `Rect`, `Triangle`) is discarded.
//!
//! Traversal uses an explicit stack, so arbitrarily deep collections cannot
//! overflow the call stack.

use geo::Geometry;

use crate::geometry::TaggedGeometry;

/// True for the geometry types an MVT feature can be built from.
pub fn is_primitive(geom: &Geometry<f64>) -> bool {
    matches!(
        geom,
        Geometry::Point(_)
            | Geometry::MultiPoint(_)
            | Geometry::LineString(_)
            | Geometry::MultiLineString(_)
            | Geometry::Polygon(_)
            | Geometry::MultiPolygon(_)
    )
}

/// Depth-first iterator over the primitives of a geometry tree.
///
/// Children of a collection come out in their original order.
pub struct Flatten<'a> {
    stack: Vec<&'a Geometry<f64>>,
}

impl<'a> Flatten<'a> {
    pub fn new(geom: &'a Geometry<f64>) -> Self {
        Self { stack: vec![geom] }
    }
}

impl<'a> Iterator for Flatten<'a> {
    type Item = &'a Geometry<f64>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(geom) = self.stack.pop() {
            match geom {
                Geometry::GeometryCollection(collection) => {
                    self.stack.extend(collection.0.iter().rev());
                }
                g if is_primitive(g) => return Some(g),
                other => {
                    log::trace!("discarding unsupported geometry: {:?}", other);
                }
            }
        }
        None
    }
}

/// Iterate the primitives of `geom` without copying them.
pub fn flat_geometries(geom: &Geometry<f64>) -> Flatten<'_> {
    Flatten::new(geom)
}

/// Owned copies of the primitives of `geom`.
pub fn flatten(geom: &Geometry<f64>) -> Vec<Geometry<f64>> {
    flat_geometries(geom).cloned().collect()
}

/// Flatten a tagged geometry; every primitive keeps the source's user data.
pub fn flatten_tagged<D>(tagged: &TaggedGeometry<D>) -> Vec<TaggedGeometry<D>> {
    flat_geometries(&tagged.geometry)
        .map(|geom| tagged.derive(geom.clone()))
        .collect()
}

/// Flatten every geometry of a list, preserving order.
pub fn flatten_all<D>(geometries: &[TaggedGeometry<D>]) -> Vec<TaggedGeometry<D>> {
    geometries.iter().flat_map(flatten_tagged).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{
        coord, line_string, point, polygon, CoordsIter, GeometryCollection, Line, MultiPoint,
        Rect,
    };

    fn square() -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: 4.0, y: 0.0),
            (x: 4.0, y: 4.0),
            (x: 0.0, y: 4.0),
            (x: 0.0, y: 0.0),
        ])
    }

    fn collection(children: Vec<Geometry<f64>>) -> Geometry<f64> {
        Geometry::GeometryCollection(GeometryCollection::new_from(children))
    }

    #[test]
    fn test_flatten_primitive_is_identity() {
        let geom = Geometry::Point(point!(x: 1.0, y: 1.0));
        assert_eq!(flatten(&geom), vec![geom]);
    }

    #[test]
    fn test_flatten_nested_collections_in_order() {
        let p = Geometry::Point(point!(x: 1.0, y: 1.0));
        let l = Geometry::LineString(line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0)]);
        let mp = Geometry::MultiPoint(MultiPoint::from(vec![(2.0, 2.0), (3.0, 3.0)]));

        let tree = collection(vec![
            p.clone(),
            collection(vec![l.clone(), collection(vec![square()])]),
            mp.clone(),
        ]);

        assert_eq!(flatten(&tree), vec![p, l, square(), mp]);
    }

    #[test]
    fn test_flatten_discards_non_primitives() {
        let tree = collection(vec![
            Geometry::Line(Line::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 1.0, y: 1.0 })),
            Geometry::Rect(Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 1.0, y: 1.0 })),
            square(),
        ]);

        assert_eq!(flatten(&tree), vec![square()]);
    }

    #[test]
    fn test_flatten_preserves_coordinate_count() {
        let tree = collection(vec![
            square(),
            collection(vec![
                Geometry::Point(point!(x: 1.0, y: 1.0)),
                collection(vec![Geometry::LineString(
                    line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 1.0), (x: 2.0, y: 0.0)],
                )]),
            ]),
        ]);

        let flat = flatten(&tree);
        assert!(flat.iter().all(is_primitive));

        let flat_count: usize = flat.iter().map(|g| g.coords_count()).sum();
        assert_eq!(flat_count, tree.coords_count());
    }

    #[test]
    fn test_flatten_deep_nesting_does_not_recurse() {
        let mut tree = Geometry::Point(point!(x: 7.0, y: 7.0));
        for _ in 0..10_000 {
            tree = collection(vec![tree]);
        }

        assert_eq!(flat_geometries(&tree).count(), 1);

        // Dropping the tree recurses, so unwind it by hand.
        let mut current = tree;
        while let Geometry::GeometryCollection(mut gc) = current {
            current = gc.0.pop().unwrap_or(Geometry::Point(point!(x: 0.0, y: 0.0)));
        }
    }

    #[test]
    fn test_flatten_is_restartable() {
        let tree = collection(vec![square(), Geometry::Point(point!(x: 1.0, y: 1.0))]);
        assert_eq!(flatten(&tree), flatten(&tree));
    }

    #[test]
    fn test_flatten_tagged_inherits_user_data() {
        let tree = TaggedGeometry::with_user_data(
            collection(vec![square(), Geometry::Point(point!(x: 1.0, y: 1.0))]),
            42u32,
        );

        let flat = flatten_tagged(&tree);
        assert_eq!(flat.len(), 2);
        assert!(flat.iter().all(|g| g.user_data() == Some(&42)));
    }

    #[test]
    fn test_empty_collection_yields_nothing() {
        assert!(flatten(&collection(vec![])).is_empty());
    }
}
