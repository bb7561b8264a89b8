use std::path::Path;

use anyhow::{Result, ensure};
use geo::{BoundingRect, MultiPolygon};
use ndarray::Array2;
use polars::prelude::*;
use tracing::{debug, info};

use crate::{common, config::Columns, geom::Geometries, raster::Raster, units::{LayerSource, UnitLayer}};

/// Columns recomputed by every density run.
const STALE_COLUMNS: [&str; 3] = ["area", "density", "sum"];

/// Sum of the valid pixel values whose centres fall strictly inside each geometry
/// (`None` for geometries that contain no pixel centre). A pixel whose centre lies
/// in several geometries counts for the first.
///
/// North-up rasters are scanned row by row over each geometry's bounding box;
/// rotated rasters fall back to a point lookup per pixel.
fn zonal_sum(geoms: &Geometries, raster: &Raster<f64>) -> Vec<Option<f64>> {
    let [_, a, b, _, d, e] = raster.transform().coeffs();
    if b != 0.0 || d != 0.0 || a == 0.0 || e == 0.0 {
        return zonal_sum_by_lookup(geoms, raster);
    }

    let mut claimed = Array2::from_elem(raster.data().dim(), false);
    geoms.shapes().iter()
        .map(|shape| {
            let mut sum = None;
            scan_pixels(shape, raster, |row, col| {
                if std::mem::replace(&mut claimed[[row, col]], true) {
                    return;
                }
                if let Some(value) = raster.value(row, col) {
                    *sum.get_or_insert(0.0) += value;
                }
            });
            sum
        })
        .collect()
}

fn zonal_sum_by_lookup(geoms: &Geometries, raster: &Raster<f64>) -> Vec<Option<f64>> {
    let mut sums = vec![None; geoms.len()];
    let transform = raster.transform();
    for ((row, col), &value) in raster.data().indexed_iter() {
        if !raster.is_valid(value) {
            continue;
        }
        if let Some(unit) = geoms.locate(transform.pixel_center(row, col)) {
            *sums[unit].get_or_insert(0.0) += value;
        }
    }
    sums
}

/// Visit the pixels of a north-up raster whose centres lie strictly inside `shape`,
/// using the even-odd rule over all of its rings.
fn scan_pixels(shape: &MultiPolygon<f64>, raster: &Raster<f64>, mut visit: impl FnMut(usize, usize)) {
    let Some(bounds) = shape.bounding_rect() else { return };
    let [x0, a, _, y0, _, e] = raster.transform().coeffs();
    // Fractional pixel index whose centre sits at a world coordinate.
    let row_at = |y: f64| (y - y0) / e - 0.5;
    let col_at = |x: f64| (x - x0) / a - 0.5;

    let edges = shape.iter()
        .flat_map(|polygon| std::iter::once(polygon.exterior()).chain(polygon.interiors()))
        .flat_map(|ring| ring.lines())
        .collect::<Vec<_>>();

    let mut crossings = Vec::new();
    for row in span(row_at(bounds.min().y), row_at(bounds.max().y), raster.rows()) {
        let y = y0 + (row as f64 + 0.5) * e;
        crossings.clear();
        crossings.extend(edges.iter()
            .filter(|line| (line.start.y > y) != (line.end.y > y))
            .map(|line| col_at(line.start.x + (y - line.start.y) * line.dx() / line.dy())));
        crossings.sort_by(f64::total_cmp);

        for pair in crossings.chunks_exact(2) {
            for col in span(pair[0], pair[1], raster.cols()) {
                visit(row, col);
            }
        }
    }
}

/// Indices strictly between two fractional positions, clamped to `0..len`.
fn span(a: f64, b: f64, len: usize) -> std::ops::Range<usize> {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    let start = (lo.floor() + 1.0).max(0.0);
    let end = hi.ceil().min(len as f64);
    if start < end { start as usize..end as usize } else { 0..0 }
}

/// Population per unit area. Null when either side is missing or the area is zero.
pub(crate) fn pop_density(pop: Option<f64>, area: Option<f64>) -> Option<f64> {
    match (pop, area) {
        (Some(pop), Some(area)) if area != 0.0 => Some(pop / area),
        _ => None,
    }
}

/// Compute per-unit `area` (zonal sum of the pixel-area raster) and
/// `density = pop / area`, and write `[shp_id, pop_col, area, density]` to `out_shp`.
pub fn get_pop_density<'a>(
    source: impl Into<LayerSource<'a>>,
    raster: &Path,
    out_shp: &Path,
    columns: &Columns,
) -> Result<UnitLayer> {
    let layer = source.into().load(&columns.shp_id)?
        .drop_columns(&STALE_COLUMNS)?;
    ensure!(
        layer.has_column(&columns.pop_col),
        "Units have no population column {:?}; join the population table first", columns.pop_col
    );

    let pixel_area = Raster::<f64>::read(raster)?;
    let area = zonal_sum(layer.geoms(), &pixel_area);
    let empty = area.iter().filter(|a| a.is_none()).count();
    debug!(units = layer.len(), empty, "zonal sum of pixel areas");

    let pop = layer.f64_column(&columns.pop_col)?;
    let densities = pop.iter().zip(&area)
        .map(|(&pop, &area)| pop_density(pop, area))
        .collect::<Vec<_>>();

    let mut data = layer.data().select([columns.shp_id.as_str(), columns.pop_col.as_str()])?;
    data.with_column(Column::new("area".into(), area))?;
    data.with_column(Column::new("density".into(), densities))?;
    let layer = layer.with_data(data)?;

    common::ensure_parent_exists(out_shp)?;
    layer.write_shapefile(out_shp)?;
    info!(units = layer.len(), path = %out_shp.display(), "computed population density");

    Ok(layer)
}
