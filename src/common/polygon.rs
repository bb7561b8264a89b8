use geo::{Area, Contains, Coord, LineString, MultiPolygon, Polygon};
use shapefile as shp;

/// Signed shoelace area of a closed ring (positive when counter-clockwise).
fn signed_area(pts: &[Coord<f64>]) -> f64 {
    pts.windows(2)
        .map(|w| w[0].x * w[1].y - w[1].x * w[0].y)
        .sum::<f64>() / 2.0
}

/// Ensure first and last coords are equal.
fn close_ring(coords: &mut Vec<Coord<f64>>) {
    if let (Some(&first), Some(&last)) = (coords.first(), coords.last()) {
        if first != last { coords.push(first) }
    }
}

/// Convert a shapefile polygon into a MultiPolygon.
///
/// Shapefile outer rings run clockwise and holes counter-clockwise. Each hole is
/// attached to the smallest outer ring containing the whole hole ring, so ring
/// order in the file does not matter and islands inside a hole stay separate.
pub(crate) fn shp_to_geo(p: &shp::Polygon) -> MultiPolygon<f64> {
    let mut exteriors: Vec<LineString<f64>> = Vec::new();
    let mut holes: Vec<LineString<f64>> = Vec::new();

    for ring in p.rings() {
        let mut coords = ring.points().iter()
            .map(|pt| Coord { x: pt.x, y: pt.y })
            .collect::<Vec<_>>();
        close_ring(&mut coords);
        if coords.len() < 4 { continue }

        if signed_area(&coords) < 0.0 {
            exteriors.push(LineString(coords));
        } else {
            holes.push(LineString(coords));
        }
    }

    let outlines = exteriors.iter()
        .map(|ext| Polygon::new(ext.clone(), vec![]))
        .collect::<Vec<_>>();
    let mut interiors: Vec<Vec<LineString<f64>>> = vec![Vec::new(); outlines.len()];
    let mut orphans = Vec::new();

    for hole in holes {
        let owner = outlines.iter().enumerate()
            .filter(|(_, outline)| outline.contains(&hole))
            .min_by(|(_, a), (_, b)| a.unsigned_area().total_cmp(&b.unsigned_area()))
            .map(|(i, _)| i);

        match owner {
            Some(i) => interiors[i].push(hole),
            // A hole without an outer ring is kept as a polygon of its own.
            None => orphans.push(Polygon::new(hole, vec![])),
        }
    }

    let polygons = exteriors.into_iter()
        .zip(interiors)
        .map(|(ext, holes)| Polygon::new(ext, holes))
        .chain(orphans)
        .collect::<Vec<_>>();

    MultiPolygon(polygons)
}

/// Convert a MultiPolygon into a shapefile polygon (outer rings CW, holes CCW).
pub(crate) fn geo_to_shp(mp: &MultiPolygon<f64>) -> shp::Polygon {
    fn ring_points(ls: &LineString<f64>, clockwise: bool) -> Vec<shp::Point> {
        let mut coords = ls.0.clone();
        close_ring(&mut coords);
        let area = signed_area(&coords);
        if (clockwise && area > 0.0) || (!clockwise && area < 0.0) {
            coords.reverse();
        }
        coords.into_iter().map(|c| shp::Point { x: c.x, y: c.y }).collect()
    }

    let mut rings = Vec::new();
    for poly in &mp.0 {
        rings.push(shp::PolygonRing::Outer(ring_points(poly.exterior(), true)));
        for hole in poly.interiors() {
            rings.push(shp::PolygonRing::Inner(ring_points(hole, false)));
        }
    }

    shp::Polygon::with_rings(rings)
}
