#![doc = "aggreunit public API"]
mod aggregate;
mod common;
mod config;
mod geom;
mod graph;
mod raster;
mod units;

#[doc(inline)]
pub use aggregate::{AggregateSummary, AggregateUnits};

#[doc(inline)]
pub use config::{AggregateConfig, Columns};

#[doc(inline)]
pub use raster::{GeoTransform, Raster, Sample, raster_to_layer, raster_to_polygon};

#[doc(inline)]
pub use units::{LayerSource, UnitLayer, get_pop_density, join_population_to_shp, sort_by_density};
