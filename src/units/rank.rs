use anyhow::{Context, Result};
use polars::prelude::*;
use tracing::debug;

use crate::units::UnitLayer;

/// Sort units by `density` (descending, nulls last, stable) and attach the pairing
/// columns: `labels` (each unit's own id) and `paired` (all false).
pub fn sort_by_density(layer: UnitLayer) -> Result<UnitLayer> {
    let sorted = layer.data()
        .select(["density"])
        .context("Units have no density column; compute densities first")?
        .with_row_index("idx".into(), None)?
        .sort(
            ["density"],
            SortMultipleOptions::default()
                .with_order_descending(true)
                .with_nulls_last(true)
                .with_maintain_order(true),
        )?;

    let order = sorted.column("idx")?.cast(&DataType::Int64)?.i64()?
        .into_no_null_iter()
        .map(|i| i as usize)
        .collect::<Vec<_>>();

    let layer = layer.take(&order)?;
    let labels = layer.adm_ids()?;
    let paired = vec![false; labels.len()];
    debug!(units = labels.len(), "ranked units by density");

    let mut data = layer.data().drop_many(["labels", "paired"]);
    data.with_column(Column::new("labels".into(), labels))?;
    data.with_column(Column::new("paired".into(), paired))?;
    layer.with_data(data)
}
