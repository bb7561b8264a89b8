use geo::{BoundingRect, MultiPolygon};
use rstar::{RTreeObject, AABB};

/// R-tree entry: the envelope of one unit, tagged with the unit's index.
#[derive(Debug, Clone)]
pub(super) struct UnitBox {
    unit: usize,
    envelope: AABB<[f64; 2]>,
}

impl UnitBox {
    /// `None` for empty shapes, which have no extent to index.
    pub(super) fn of(unit: usize, shape: &MultiPolygon<f64>) -> Option<Self> {
        let rect = shape.bounding_rect()?;
        Some(Self { unit, envelope: AABB::from_corners(rect.min().into(), rect.max().into()) })
    }

    #[inline] pub(super) fn unit(&self) -> usize { self.unit }
}

impl RTreeObject for UnitBox {
    type Envelope = AABB<[f64; 2]>;

    #[inline]
    fn envelope(&self) -> Self::Envelope { self.envelope }
}
