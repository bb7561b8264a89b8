use std::path::Path;

use ahash::AHashSet;
use anyhow::{Context, Result, bail};
use polars::{frame::DataFrame, prelude::*};
use tracing::{info, warn};

use crate::{common, config::Columns, units::{LayerSource, UnitLayer}};

/// Population table reduced to `[shp_id, pop_col]` with Int64 ids and Float64 counts.
fn read_population_table(csv: &Path, columns: &Columns) -> Result<DataFrame> {
    let table = common::read_from_csv_file(csv)?;

    let ids = table.column(&columns.csv_id)
        .with_context(|| format!("Population table {} has no {:?} column", csv.display(), columns.csv_id))?
        .cast(&DataType::Int64)?;
    let pop = table.column(&columns.pop_col)
        .with_context(|| format!("Population table {} has no {:?} column", csv.display(), columns.pop_col))?
        .cast(&DataType::Float64)?;

    let mut seen = AHashSet::with_capacity(ids.len());
    for id in ids.i64()?.into_iter() {
        let Some(id) = id else {
            bail!("Population table {} has a missing or non-integer {:?}", csv.display(), columns.csv_id);
        };
        if !seen.insert(id) {
            bail!("Population table {} lists {} = {} more than once", csv.display(), columns.csv_id, id);
        }
    }

    Ok(DataFrame::new(vec![
        ids.with_name(columns.shp_id.as_str().into()),
        pop.with_name(columns.pop_col.as_str().into()),
    ])?)
}

/// Left-join population counts from `csv` onto the units of `source` by unit id.
///
/// Unit order is preserved and units without a table row get a null population.
/// When `source` is a shapefile path, the joined layer is written back to it.
pub fn join_population_to_shp<'a>(
    source: impl Into<LayerSource<'a>>,
    csv: &Path,
    columns: &Columns,
) -> Result<UnitLayer> {
    let source = source.into();
    let path = source.path();
    let layer = source.load(&columns.shp_id)?
        .drop_columns(&[columns.pop_col.as_str()])?;

    let pop = read_population_table(csv, columns)?;

    let data = layer.data()
        .with_row_index("idx".into(), None)?
        .left_join(&pop, [columns.shp_id.as_str()], [columns.shp_id.as_str()])?
        .sort(["idx"], SortMultipleOptions::default())?
        .drop("idx")?;

    let layer = layer.with_data(data)?;

    let missing = layer.data().column(&columns.pop_col)?.null_count();
    if missing > 0 {
        warn!(units = missing, "units without a population count");
    }
    info!(units = layer.len(), table = %csv.display(), "joined population");

    if let Some(path) = path {
        layer.write_shapefile(path)?;
    }
    Ok(layer)
}
