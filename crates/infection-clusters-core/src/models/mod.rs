//! Domain models for infection cluster detection.

mod cluster;
mod stay;
mod summary;
mod test_record;

pub use cluster::*;
pub use stay::*;
pub use summary::*;
pub use test_record::*;
