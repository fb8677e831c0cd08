//! Export sinks for collected stats.

pub mod influx;
