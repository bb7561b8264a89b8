use anyhow::Result;
use aggreunit::{join_population_to_shp, Columns};

pub fn run(_cli: &crate::cli::Cli, args: &crate::cli::JoinArgs) -> Result<()> {
    let columns = args.columns.apply(Columns::default());
    join_population_to_shp(&args.shp, &args.csv, &columns)?;
    Ok(())
}
