//! Schema module - Configuration types for the framereel tools.

mod config;

pub use config::*;
