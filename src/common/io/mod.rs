mod csv;
mod shp;
mod tiff;

pub(crate) use self::csv::*;
pub(crate) use self::shp::*;
pub(crate) use self::tiff::*;
