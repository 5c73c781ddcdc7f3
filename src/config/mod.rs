//! Configuration module for rawcopy
//!
//! Provides CLI argument definitions and the engine's runtime settings.

mod settings;

pub use settings::*;
