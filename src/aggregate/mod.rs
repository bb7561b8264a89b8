mod aggregate;
mod pairing;

pub use aggregate::{AggregateSummary, AggregateUnits};
