//! Configuration Management
//!
//! Provider configuration with hierarchical resolution:
//! 1. Global config (~/.config/repowiki/config.toml)
//! 2. Project config (./repowiki.toml)
//! 3. Environment variables (highest priority)

mod loader;
mod types;

pub use loader::ConfigLoader;
pub use types::*;
