//! Shared types, configuration and helpers for the Gravclaw workspace.

pub mod config;
pub mod types;
pub mod utils;
