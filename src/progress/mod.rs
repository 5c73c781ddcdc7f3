//! Progress reporting module
//!
//! Renders the in-place bracketed transfer bar.

mod tracker;

pub use tracker::*;
