mod polygonize;
mod raster;

pub use polygonize::{raster_to_layer, raster_to_polygon};
pub use raster::{GeoTransform, Raster, Sample};

pub(crate) use polygonize::polygonize_grid;
