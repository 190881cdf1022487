//! Tools the model can call: the trait, the registry, and the built-ins.

pub mod base;
pub mod registry;
pub mod time;
pub mod delegate;
pub mod workflow;

pub use base::{Tool, require_i64, require_string, optional_string};
pub use registry::ToolRegistry;
