pub mod aggregate;
pub mod density;
pub mod join;
pub mod polygonize;
