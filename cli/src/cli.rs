use std::path::PathBuf;

use aggreunit::Columns;

/// Population-weighted aggregation of administrative units
#[derive(clap::Parser, Debug)]
#[command(name = "aggreunit", version, about, propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Polygonise a mastergrid into one polygon per unit
    Polygonize(PolygonizeArgs),

    /// Join a population table onto a unit shapefile (in place)
    Join(JoinArgs),

    /// Compute per-unit area and population density
    Density(DensityArgs),

    /// Pair neighbouring units by density and write the merged outputs
    Aggregate(AggregateArgs),
}

/// Column names shared by the table-aware subcommands.
#[derive(clap::Args, Debug)]
pub struct ColumnArgs {
    /// Unit id column in the shapefile
    #[arg(long)]
    pub shp_id: Option<String>,

    /// Unit id column in the population table
    #[arg(long)]
    pub csv_id: Option<String>,

    /// Population column in the population table
    #[arg(long)]
    pub pop_col: Option<String>,
}

impl ColumnArgs {
    /// Override `base` with the flags that were given.
    pub fn apply(&self, base: Columns) -> Columns {
        Columns {
            shp_id: self.shp_id.clone().unwrap_or(base.shp_id),
            csv_id: self.csv_id.clone().unwrap_or(base.csv_id),
            pop_col: self.pop_col.clone().unwrap_or(base.pop_col),
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct PolygonizeArgs {
    /// Mastergrid GeoTIFF (pixel value = unit id)
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub raster: PathBuf,

    /// Output shapefile (must not exist)
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub output: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct JoinArgs {
    /// Unit shapefile, overwritten with the joined attributes
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub shp: PathBuf,

    /// Population table (CSV)
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub csv: PathBuf,

    #[command(flatten)]
    pub columns: ColumnArgs,
}

#[derive(clap::Args, Debug)]
pub struct DensityArgs {
    /// Unit shapefile with a population column
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub shp: PathBuf,

    /// Pixel-area GeoTIFF
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub pixel_area: PathBuf,

    /// Output shapefile
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub output: PathBuf,

    #[command(flatten)]
    pub columns: ColumnArgs,
}

#[derive(clap::Args, Debug)]
pub struct AggregateArgs {
    /// Mastergrid GeoTIFF (pixel value = unit id)
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub mastergrid: PathBuf,

    /// Population table (CSV)
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub csv: PathBuf,

    /// Pixel-area GeoTIFF
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub pixel_area: PathBuf,

    /// Aggregated raster, defaults to "<mastergrid>_A.tif"
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub out_raster: Option<PathBuf>,

    /// Aggregated table, defaults to "<csv>_A.csv"
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub out_table: Option<PathBuf>,

    /// Aggregated shapefile, defaults to "<mastergrid>_A.shp"
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub out_shp: Option<PathBuf>,

    /// Keep the per-unit shapefile next to the mastergrid
    #[arg(long)]
    pub save_admin_shape: bool,

    /// JSON config file (column names, save_admin_shape)
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub columns: ColumnArgs,
}
