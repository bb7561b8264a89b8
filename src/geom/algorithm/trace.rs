use std::collections::BTreeMap;

use ahash::AHashMap;
use geo::{Area, Contains, Coord, LineString, MultiPolygon, Point, Polygon};
use smallvec::SmallVec;

/// Unit step along a pixel side, in grid space (x = column, y = row).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Dir { E, N, W, S }

impl Dir {
    #[inline]
    fn step(self) -> (i64, i64) {
        match self {
            Dir::E => (1, 0),
            Dir::N => (0, 1),
            Dir::W => (-1, 0),
            Dir::S => (0, -1),
        }
    }

    #[inline]
    fn left(self) -> Dir {
        match self {
            Dir::E => Dir::N,
            Dir::N => Dir::W,
            Dir::W => Dir::S,
            Dir::S => Dir::E,
        }
    }

    #[inline]
    fn right(self) -> Dir {
        match self {
            Dir::E => Dir::S,
            Dir::S => Dir::W,
            Dir::W => Dir::N,
            Dir::N => Dir::E,
        }
    }
}

/// A directed pixel side with the labelled pixel on its left.
#[derive(Clone, Copy, Debug)]
struct Edge {
    from: (u32, u32),
    dir: Dir,
}

impl Edge {
    #[inline]
    fn to(&self) -> (u32, u32) {
        let (dx, dy) = self.dir.step();
        ((self.from.0 as i64 + dx) as u32, (self.from.1 as i64 + dy) as u32)
    }

    /// Centre of the pixel on the left of this edge.
    fn inside_point(&self) -> Coord<f64> {
        let (x, y) = (self.from.0 as f64, self.from.1 as f64);
        let (col, row) = match self.dir {
            Dir::E => (x, y),
            Dir::N => (x - 1.0, y),
            Dir::W => (x - 1.0, y - 1.0),
            Dir::S => (x, y - 1.0),
        };
        Coord { x: col + 0.5, y: row + 0.5 }
    }
}

/// Boundary edges of one label, indexed by their start vertex.
#[derive(Default)]
struct LabelEdges {
    edges: Vec<Edge>,
    outgoing: AHashMap<(u32, u32), SmallVec<[u32; 2]>>,
}

impl LabelEdges {
    fn push(&mut self, from: (u32, u32), dir: Dir) {
        self.outgoing.entry(from).or_default().push(self.edges.len() as u32);
        self.edges.push(Edge { from, dir });
    }

    /// Chain edges into closed rings. At a vertex shared by two diagonal pixels the
    /// sharpest left turn is taken, which keeps diagonal neighbours apart (4-connectivity).
    fn rings(&self) -> Vec<(LineString<f64>, Coord<f64>)> {
        let mut used = vec![false; self.edges.len()];
        let mut rings = Vec::new();

        for start in 0..self.edges.len() {
            if used[start] { continue }

            let mut cycle: Vec<Edge> = Vec::new();
            let mut cur = start;
            loop {
                used[cur] = true;
                let edge = self.edges[cur];
                cycle.push(edge);

                let candidates = self.outgoing.get(&edge.to());
                let next = [edge.dir.left(), edge.dir, edge.dir.right()].into_iter()
                    .find_map(|dir| candidates?.iter()
                        .map(|&k| k as usize)
                        .find(|&k| self.edges[k].dir == dir && (!used[k] || k == start)));

                match next {
                    Some(k) if k != start => cur = k,
                    _ => break,
                }
            }

            // Keep only the corners of the cycle.
            let mut coords = cycle.iter().enumerate()
                .filter(|&(i, edge)| edge.dir != cycle[(i + cycle.len() - 1) % cycle.len()].dir)
                .map(|(_, edge)| Coord { x: edge.from.0 as f64, y: edge.from.1 as f64 })
                .collect::<Vec<_>>();
            if coords.len() < 4 { continue }
            coords.push(coords[0]);

            rings.push((LineString(coords), cycle[0].inside_point()));
        }

        rings
    }

    /// Assemble rings into polygons: counter-clockwise rings are outer boundaries,
    /// clockwise rings are holes of the smallest outer ring around them.
    fn polygons(&self) -> MultiPolygon<f64> {
        let mut outers: Vec<Polygon<f64>> = Vec::new();
        let mut holes: Vec<(LineString<f64>, Coord<f64>)> = Vec::new();

        for (ring, inside) in self.rings() {
            let outline = Polygon::new(ring, vec![]);
            if outline.signed_area() > 0.0 {
                outers.push(outline);
            } else {
                holes.push((outline.into_inner().0, inside));
            }
        }

        let areas = outers.iter().map(|p| p.unsigned_area()).collect::<Vec<_>>();
        let mut interiors: Vec<Vec<LineString<f64>>> = vec![Vec::new(); outers.len()];
        for (hole, inside) in holes {
            let point = Point(inside);
            let owner = outers.iter().enumerate()
                .filter(|(_, outer)| outer.contains(&point))
                .min_by(|(a, _), (b, _)| areas[*a].total_cmp(&areas[*b]))
                .map(|(i, _)| i);
            if let Some(i) = owner {
                interiors[i].push(hole);
            }
        }

        MultiPolygon(
            outers.into_iter()
                .zip(interiors)
                .map(|(outer, holes)| Polygon::new(outer.into_inner().0, holes))
                .collect()
        )
    }
}

/// Trace the dissolved outline of every label in a `rows x cols` grid.
///
/// `label(row, col)` returns `None` for masked pixels. Geometries are returned in grid
/// space: pixel `(row, col)` covers `[col, col + 1] x [row, row + 1]`. Labels are keyed
/// in ascending order.
pub(crate) fn trace_label_boundaries(
    rows: usize,
    cols: usize,
    label: impl Fn(usize, usize) -> Option<i32>,
) -> BTreeMap<i32, MultiPolygon<f64>> {
    let mut by_label: BTreeMap<i32, LabelEdges> = BTreeMap::new();

    for row in 0..rows {
        for col in 0..cols {
            let Some(value) = label(row, col) else { continue };
            let differs = |r: Option<usize>, c: Option<usize>| match (r, c) {
                (Some(r), Some(c)) if r < rows && c < cols => label(r, c) != Some(value),
                _ => true,
            };

            let (x, y) = (col as u32, row as u32);
            let edges = by_label.entry(value).or_default();
            if differs(row.checked_sub(1), Some(col)) { edges.push((x, y), Dir::E) }
            if differs(Some(row), Some(col + 1)) { edges.push((x + 1, y), Dir::N) }
            if differs(Some(row + 1), Some(col)) { edges.push((x + 1, y + 1), Dir::W) }
            if differs(Some(row), col.checked_sub(1)) { edges.push((x, y + 1), Dir::S) }
        }
    }

    by_label.into_iter()
        .map(|(value, edges)| (value, edges.polygons()))
        .collect()
}
