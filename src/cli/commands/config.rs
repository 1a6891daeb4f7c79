//! Config Command
//!
//! Usage:
//!   repowiki config show [--json]
//!   repowiki config path

use crate::config::ConfigLoader;
use crate::types::Result;

/// Show the merged effective configuration
pub fn show(as_json: bool) -> Result<()> {
    ConfigLoader::show_config(as_json)
}

/// Show configuration paths
pub fn path() -> Result<()> {
    ConfigLoader::show_path();
    Ok(())
}
