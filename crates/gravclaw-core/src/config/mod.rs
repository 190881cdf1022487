//! Configuration system: schema, loading, env var overrides and credential
//! resolution.
//!
//! # Usage
//! ```no_run
//! use gravclaw_core::config;
//!
//! let cfg = config::load_config(None);
//! println!("Max iterations: {}", cfg.agent.max_iterations);
//! ```

pub mod loader;
pub mod schema;

pub use loader::{get_config_path, load_config, resolve_credentials, save_config, CredentialSource};
pub use schema::{Config, VectorIndexKind};
