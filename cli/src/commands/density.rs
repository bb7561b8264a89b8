use anyhow::Result;
use aggreunit::{get_pop_density, Columns};

pub fn run(_cli: &crate::cli::Cli, args: &crate::cli::DensityArgs) -> Result<()> {
    let columns = args.columns.apply(Columns::default());
    get_pop_density(&args.shp, &args.pixel_area, &args.output, &columns)?;
    Ok(())
}
