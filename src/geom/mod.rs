mod algorithm;
mod bbox;
mod geom;

use bbox::UnitBox;
pub(crate) use algorithm::trace_label_boundaries;
pub(crate) use geom::Geometries;
