//! Report export for detection results.

mod report;

pub use report::*;
