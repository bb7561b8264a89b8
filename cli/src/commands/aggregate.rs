use anyhow::Result;
use aggreunit::{AggregateConfig, AggregateUnits};

pub fn run(_cli: &crate::cli::Cli, args: &crate::cli::AggregateArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => AggregateConfig::from_json_file(path)?,
        None => AggregateConfig::default(),
    };
    config.columns = args.columns.apply(config.columns);
    config.save_admin_shape |= args.save_admin_shape;

    let defaults = AggregateUnits::with_default_outputs(&args.mastergrid, &args.csv, &args.pixel_area, config.clone());
    let run = AggregateUnits::new(
        &args.mastergrid,
        &args.csv,
        &args.pixel_area,
        args.out_raster.clone().unwrap_or_else(|| defaults.out_raster().to_path_buf()),
        args.out_table.clone().unwrap_or_else(|| defaults.out_table().to_path_buf()),
        args.out_shp.clone().unwrap_or_else(|| defaults.out_shp().to_path_buf()),
        config,
    );

    let summary = run.aggregate()?;
    tracing::info!(
        units = summary.units,
        aggregates = summary.aggregates,
        raster = %run.out_raster().display(),
        table = %run.out_table().display(),
        shp = %run.out_shp().display(),
        "done"
    );
    Ok(())
}
