mod density;
mod join;
mod layer;
mod rank;

pub use density::get_pop_density;
pub use join::join_population_to_shp;
pub use layer::{LayerSource, UnitLayer};
pub use rank::sort_by_density;

pub(crate) use density::pop_density;
