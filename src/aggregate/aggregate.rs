use std::{collections::BTreeMap, path::{Path, PathBuf}};

use ahash::AHashMap;
use anyhow::{Context, Result};
use polars::prelude::*;
use tracing::info;

use crate::{
    aggregate::pairing::{pair_by_density, Pairing},
    common,
    config::AggregateConfig,
    graph::Graph,
    raster::{polygonize_grid, raster_to_layer, Raster},
    units::{get_pop_density, join_population_to_shp, pop_density, sort_by_density, UnitLayer},
};

/// Counts reported by one aggregation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateSummary {
    /// Units in the mastergrid.
    pub units: usize,
    /// Units after merging.
    pub aggregates: usize,
    /// Units that were merged with a neighbour.
    pub paired: usize,
}

/// An aggregated unit: the merged members and their summed totals.
#[derive(Debug, Default)]
struct Group {
    pop: Option<f64>,
    area: Option<f64>,
    members: Vec<i64>,
}

impl Group {
    fn add(&mut self, id: i64, pop: Option<f64>, area: Option<f64>) {
        if let Some(pop) = pop { *self.pop.get_or_insert(0.0) += pop }
        if let Some(area) = area { *self.area.get_or_insert(0.0) += area }
        self.members.push(id);
    }

    #[inline] fn density(&self) -> Option<f64> { pop_density(self.pop, self.area) }
}

/// One aggregation pass over a mastergrid: polygonise, join population, compute
/// densities, rank, pair neighbours, and write the merged raster, table and shapefile.
#[derive(Debug, Clone)]
pub struct AggregateUnits {
    mastergrid: PathBuf,
    table: PathBuf,
    pixel_area: PathBuf,
    out_raster: PathBuf,
    out_table: PathBuf,
    out_shp: PathBuf,
    config: AggregateConfig,
}

impl AggregateUnits {
    pub fn new(
        mastergrid: impl Into<PathBuf>,
        table: impl Into<PathBuf>,
        pixel_area: impl Into<PathBuf>,
        out_raster: impl Into<PathBuf>,
        out_table: impl Into<PathBuf>,
        out_shp: impl Into<PathBuf>,
        config: AggregateConfig,
    ) -> Self {
        Self {
            mastergrid: mastergrid.into(),
            table: table.into(),
            pixel_area: pixel_area.into(),
            out_raster: out_raster.into(),
            out_table: out_table.into(),
            out_shp: out_shp.into(),
            config,
        }
    }

    /// Outputs next to their inputs: `<mastergrid>_A.tif`, `<table>_A.csv`, `<mastergrid>_A.shp`.
    pub fn with_default_outputs(
        mastergrid: impl Into<PathBuf>,
        table: impl Into<PathBuf>,
        pixel_area: impl Into<PathBuf>,
        config: AggregateConfig,
    ) -> Self {
        let (mastergrid, table) = (mastergrid.into(), table.into());
        let out_raster = common::sibling_path(&mastergrid, "_A", "tif");
        let out_table = common::sibling_path(&table, "_A", "csv");
        let out_shp = common::sibling_path(&mastergrid, "_A", "shp");
        Self::new(mastergrid, table, pixel_area, out_raster, out_table, out_shp, config)
    }

    #[inline] pub fn out_raster(&self) -> &Path { &self.out_raster }

    #[inline] pub fn out_table(&self) -> &Path { &self.out_table }

    #[inline] pub fn out_shp(&self) -> &Path { &self.out_shp }

    /// Where the per-unit shapefile goes when `save_admin_shape` is set.
    pub fn admin_shape_path(&self) -> PathBuf {
        common::sibling_path(&self.mastergrid, "", "shp")
    }

    /// Run the pass and write all three outputs.
    pub fn aggregate(&self) -> Result<AggregateSummary> {
        let columns = &self.config.columns;
        let admin_shp = self.config.save_admin_shape.then(|| self.admin_shape_path());
        if let Some(path) = &admin_shp {
            common::require_shapefile_absent(path)?;
        }

        let grid = Raster::<i32>::read(&self.mastergrid)?;
        let units = polygonize_grid(&grid, &columns.shp_id, admin_shp.as_deref())?;
        let units = join_population_to_shp(units, &self.table, columns)?;

        let scratch = tempfile::tempdir().context("Failed to create scratch directory")?;
        let density_shp = admin_shp.clone().unwrap_or_else(|| scratch.path().join("density.shp"));
        let units = get_pop_density(units, &self.pixel_area, &density_shp, columns)?;
        let units = sort_by_density(units)?;

        let (units, pairing) = self.pair_units(&grid, units)?;
        if let Some(path) = &admin_shp {
            units.write_shapefile(path)?;
        }

        let relabel = units.adm_ids()?.into_iter()
            .zip(pairing.labels.iter().copied())
            .map(|(id, label)| Ok((grid_label(id)?, grid_label(label)?)))
            .collect::<Result<AHashMap<i32, i32>>>()?;
        let aggregated = grid.map_labels(|v| relabel.get(&v).copied().unwrap_or(v));
        aggregated.write(&self.out_raster)?;
        info!(path = %self.out_raster.display(), "wrote aggregated raster");

        let groups = self.groups(&units, &pairing)?;
        self.write_table(&groups)?;
        self.write_shapefile(&aggregated, &groups)?;

        let summary = AggregateSummary {
            units: units.len(),
            aggregates: groups.len(),
            paired: pairing.paired_count(),
        };
        info!(units = summary.units, aggregates = summary.aggregates, paired = summary.paired, "aggregation complete");
        Ok(summary)
    }

    /// Pair ranked units over the rook adjacency of the mastergrid and store the result
    /// in the `labels` and `paired` columns.
    fn pair_units(&self, grid: &Raster<i32>, units: UnitLayer) -> Result<(UnitLayer, Pairing)> {
        let ids = units.adm_ids()?;
        let index = ids.iter().enumerate()
            .map(|(node, &id)| Ok((grid_label(id)?, node as u32)))
            .collect::<Result<AHashMap<i32, u32>>>()?;
        let graph = Graph::rook_adjacency(grid.rows(), grid.cols(), |row, col| grid.value(row, col), &index);

        let density = units.f64_column("density")?;
        let pairing = pair_by_density(&ids, &density, &graph);
        info!(units = ids.len(), adjacencies = graph.edge_count() / 2, paired = pairing.paired_count(), "paired units");

        let mut data = units.data().drop_many(["labels", "paired"]);
        data.with_column(Column::new("labels".into(), pairing.labels.clone()))?;
        data.with_column(Column::new("paired".into(), pairing.paired.clone()))?;
        Ok((units.with_data(data)?, pairing))
    }

    /// Group units by label, summing population and area.
    fn groups(&self, units: &UnitLayer, pairing: &Pairing) -> Result<BTreeMap<i64, Group>> {
        let columns = &self.config.columns;
        let ids = units.adm_ids()?;
        let pop = units.f64_column(&columns.pop_col)?;
        let area = units.f64_column("area")?;

        let mut groups: BTreeMap<i64, Group> = BTreeMap::new();
        for (i, &label) in pairing.labels.iter().enumerate() {
            groups.entry(label).or_default().add(ids[i], pop[i], area[i]);
        }
        for group in groups.values_mut() {
            group.members.sort_unstable();
        }
        Ok(groups)
    }

    /// Aggregated population table, one row per label, readable as the next run's input.
    fn write_table(&self, groups: &BTreeMap<i64, Group>) -> Result<()> {
        let columns = &self.config.columns;
        let df = DataFrame::new(vec![
            Column::new(columns.csv_id.as_str().into(), groups.keys().copied().collect::<Vec<_>>()),
            Column::new(columns.pop_col.as_str().into(), groups.values().map(|g| g.pop).collect::<Vec<_>>()),
            Column::new("area".into(), groups.values().map(|g| g.area).collect::<Vec<_>>()),
            Column::new("density".into(), groups.values().map(Group::density).collect::<Vec<_>>()),
            Column::new("units".into(), groups.values().map(|g| g.members.len() as i64).collect::<Vec<_>>()),
            Column::new("members".into(), groups.values()
                .map(|g| g.members.iter().map(i64::to_string).collect::<Vec<_>>().join(";"))
                .collect::<Vec<_>>()),
        ])?;

        common::ensure_parent_exists(&self.out_table)?;
        common::write_to_csv_file(&self.out_table, &df)?;
        info!(path = %self.out_table.display(), rows = df.height(), "wrote aggregated table");
        Ok(())
    }

    /// Aggregated units as polygons of the relabelled grid, with their totals.
    fn write_shapefile(&self, aggregated: &Raster<i32>, groups: &BTreeMap<i64, Group>) -> Result<()> {
        let columns = &self.config.columns;
        let layer = raster_to_layer(aggregated, &columns.shp_id)?;

        let rows = layer.adm_ids()?.into_iter()
            .map(|id| groups.get(&id).with_context(|| format!("Aggregated raster has unknown label {}", id)))
            .collect::<Result<Vec<_>>>()?;

        let mut data = layer.data().clone();
        data.with_column(Column::new(columns.pop_col.as_str().into(), rows.iter().map(|g| g.pop).collect::<Vec<_>>()))?;
        data.with_column(Column::new("area".into(), rows.iter().map(|g| g.area).collect::<Vec<_>>()))?;
        data.with_column(Column::new("density".into(), rows.iter().map(|g| g.density()).collect::<Vec<_>>()))?;
        data.with_column(Column::new("units".into(), rows.iter().map(|g| g.members.len() as i64).collect::<Vec<_>>()))?;
        let layer = layer.with_data(data)?;

        common::ensure_parent_exists(&self.out_shp)?;
        layer.write_shapefile(&self.out_shp)?;
        info!(path = %self.out_shp.display(), units = layer.len(), "wrote aggregated units");
        Ok(())
    }
}

/// Unit ids are mastergrid pixel values.
fn grid_label(id: i64) -> Result<i32> {
    i32::try_from(id).with_context(|| format!("Unit id {} does not fit a 32-bit mastergrid value", id))
}
