use geo::{BoundingRect, Contains, Coord, MultiPolygon, Point, Rect};
use rstar::{RTree, AABB};

use crate::geom::UnitBox;

/// Unit geometries (one MultiPolygon per unit) with an R-tree over their bounding boxes.
#[derive(Debug, Clone)]
pub(crate) struct Geometries {
    shapes: Vec<MultiPolygon<f64>>,
    rtree: RTree<UnitBox>,
}

impl Geometries {
    /// Construct a Geometries object from a vector of MultiPolygons.
    pub(crate) fn new(shapes: Vec<MultiPolygon<f64>>) -> Self {
        Self {
            rtree: RTree::bulk_load(
                shapes.iter().enumerate()
                    .filter_map(|(i, shape)| UnitBox::of(i, shape))
                    .collect()
            ),
            shapes,
        }
    }

    /// Get the number of MultiPolygons.
    #[inline] pub(crate) fn len(&self) -> usize { self.shapes.len() }

    /// Check if there are no MultiPolygons.
    #[inline] pub(crate) fn is_empty(&self) -> bool { self.shapes.is_empty() }

    /// Get a reference to the list of MultiPolygons.
    #[inline] pub(crate) fn shapes(&self) -> &[MultiPolygon<f64>] { &self.shapes }

    /// Reorder (or subset) the geometries by index.
    pub(crate) fn take(&self, order: &[usize]) -> Self {
        Self::new(order.iter().map(|&i| self.shapes[i].clone()).collect())
    }

    /// Index of the first geometry whose interior contains `coord`.
    pub(crate) fn locate(&self, coord: Coord<f64>) -> Option<usize> {
        let point = Point(coord);
        let envelope = AABB::from_point([coord.x, coord.y]);
        self.rtree.locate_in_envelope_intersecting(&envelope)
            .map(UnitBox::unit)
            .filter(|&i| self.shapes[i].contains(&point))
            .min()
    }

    /// Compute the bounding rectangle of all MultiPolygons.
    pub(crate) fn bounds(&self) -> Option<Rect<f64>> {
        self.shapes.iter()
            .filter_map(|shape| shape.bounding_rect())
            .reduce(|a, b| Rect::new(
                Coord { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
                Coord { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn squares() -> Geometries {
        Geometries::new(vec![
            MultiPolygon(vec![polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)]]),
            MultiPolygon(vec![polygon![(x: 1.0, y: 0.0), (x: 3.0, y: 0.0), (x: 3.0, y: 1.0), (x: 1.0, y: 1.0)]]),
            MultiPolygon(vec![]),
        ])
    }

    #[test]
    fn locate_finds_containing_unit() {
        let geoms = squares();
        assert_eq!(geoms.locate(Coord { x: 0.5, y: 0.5 }), Some(0));
        assert_eq!(geoms.locate(Coord { x: 2.5, y: 0.5 }), Some(1));
        assert_eq!(geoms.locate(Coord { x: 5.0, y: 5.0 }), None);
    }

    #[test]
    fn boundary_points_are_not_inside() {
        assert_eq!(squares().locate(Coord { x: 1.0, y: 0.5 }), None);
    }

    #[test]
    fn bounds_cover_all_shapes() {
        let geoms = squares();
        assert_eq!(geoms.len(), 3);
        let bounds = geoms.bounds().unwrap();
        assert_eq!(bounds.min(), Coord { x: 0.0, y: 0.0 });
        assert_eq!(bounds.max(), Coord { x: 3.0, y: 1.0 });
    }

    #[test]
    fn take_reorders() {
        let geoms = squares().take(&[1, 0]);
        assert_eq!(geoms.len(), 2);
        assert_eq!(geoms.locate(Coord { x: 0.5, y: 0.5 }), Some(1));
    }

    #[test]
    fn empty_collection() {
        let geoms = Geometries::new(vec![]);
        assert!(geoms.is_empty());
        assert!(geoms.bounds().is_none());
        assert_eq!(geoms.locate(Coord { x: 0.0, y: 0.0 }), None);
    }
}
