use std::path::Path;

use anyhow::Result;
use geo::{MapCoords, MultiPolygon};
use tracing::{debug, info};

use crate::{common, geom, raster::Raster, units::UnitLayer};

/// Default id column of polygonised mastergrids.
pub(crate) const ADM_ID: &str = "adm_id";

/// Polygonise a label raster: one dissolved MultiPolygon per distinct valid label,
/// sorted by label, with the label stored in `id_col`.
pub fn raster_to_layer(raster: &Raster<i32>, id_col: &str) -> Result<UnitLayer> {
    let transform = *raster.transform();
    let traced = geom::trace_label_boundaries(raster.rows(), raster.cols(), |row, col| raster.value(row, col));

    let (ids, shapes): (Vec<i64>, Vec<MultiPolygon<f64>>) = traced.into_iter()
        .map(|(label, mp)| (i64::from(label), mp.map_coords(|c| transform.vertex(c.x, c.y))))
        .unzip();

    let layer = UnitLayer::from_ids(id_col, ids, shapes)?;
    debug!(units = layer.len(), bounds = ?layer.geoms().bounds(), "polygonised label raster");
    Ok(layer)
}

/// Polygonise the mastergrid at `raster` into an `adm_id` layer, optionally saving it
/// to `out_shp`. Refuses to overwrite an existing shapefile.
pub fn raster_to_polygon(raster: &Path, out_shp: Option<&Path>) -> Result<UnitLayer> {
    if let Some(out) = out_shp {
        common::require_shapefile_absent(out)?;
    }
    let grid = Raster::<i32>::read(raster)?;
    polygonize_grid(&grid, ADM_ID, out_shp)
}

/// Polygonise an already loaded mastergrid, saving the layer to `out_shp` if given.
pub(crate) fn polygonize_grid(grid: &Raster<i32>, id_col: &str, out_shp: Option<&Path>) -> Result<UnitLayer> {
    if let Some(out) = out_shp {
        common::require_shapefile_absent(out)?;
    }

    let layer = raster_to_layer(grid, id_col)?;
    info!(units = layer.len(), rows = grid.rows(), cols = grid.cols(), "polygonised mastergrid");

    if let Some(out) = out_shp {
        common::ensure_parent_exists(out)?;
        layer.write_shapefile(out)?;
        info!(path = %out.display(), "saved admin units");
    }

    Ok(layer)
}
