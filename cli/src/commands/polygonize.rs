use anyhow::Result;
use aggreunit::raster_to_polygon;

pub fn run(_cli: &crate::cli::Cli, args: &crate::cli::PolygonizeArgs) -> Result<()> {
    let layer = raster_to_polygon(&args.raster, args.output.as_deref())?;
    if args.output.is_none() {
        tracing::info!(units = layer.len(), "no output given, nothing written");
    }
    Ok(())
}
