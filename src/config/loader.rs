//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Global config (~/.config/repowiki/config.toml)
//! 2. Project config (./repowiki.toml)
//! 3. Environment variables (exact key names, e.g. `CHAT_MODEL`)
//!
//! All sources use the same flat key names. Validation happens once, in
//! [`ProviderConfiguration::from_lookup`].

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Format, Serialized, Toml},
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use super::types::{ProviderConfiguration, keys};
use crate::constants::config as defaults;
use crate::types::{Result, WikiError};

/// A flat configuration value as it arrives from TOML or the environment.
///
/// TOML files may carry typed scalars (`MAX_FILE_LIMIT = 12`), so every scalar
/// shape is accepted and turned back into text before validation.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Flag(bool),
    Other(serde::de::IgnoredAny),
}

impl RawValue {
    fn into_text(self) -> Option<String> {
        match self {
            RawValue::Text(s) => Some(s),
            RawValue::Integer(n) => Some(n.to_string()),
            RawValue::Float(n) => Some(n.to_string()),
            RawValue::Flag(b) => Some(b.to_string()),
            RawValue::Other(_) => None,
        }
    }
}

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain: global → project → env
    pub fn load() -> Result<Arc<ProviderConfiguration>> {
        let mut figment = Figment::new();

        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(&global_path));
        }

        let project_path = Self::project_config_path();
        if project_path.exists() {
            debug!("Loading project config from: {}", project_path.display());
            figment = figment.merge(Toml::file(&project_path));
        }

        Self::load_from(figment.merge(Self::env_provider()))
    }

    /// Load configuration from a specific file, still honouring the environment
    pub fn load_from_file(path: &Path) -> Result<Arc<ProviderConfiguration>> {
        Self::load_from(
            Figment::new()
                .merge(Toml::file(path))
                .merge(Self::env_provider()),
        )
    }

    /// Validate a prepared figment into the process-wide configuration
    pub fn load_from(figment: Figment) -> Result<Arc<ProviderConfiguration>> {
        let raw: HashMap<String, RawValue> = figment
            .extract()
            .map_err(|e| WikiError::Config(format!("Configuration error: {}", e)))?;

        let values: HashMap<String, String> = raw
            .into_iter()
            .filter_map(|(key, value)| value.into_text().map(|v| (key, v)))
            .collect();

        let config = ProviderConfiguration::from_lookup(|key| values.get(key).cloned())?;

        info!(
            provider = %config.provider,
            model = %config.chat_model,
            "Provider configuration loaded"
        );

        Ok(Arc::new(config))
    }

    /// Environment variables restricted to the recognised keys, case preserved
    fn env_provider() -> Serialized<HashMap<String, String>> {
        Self::lookup_provider(|name| std::env::var(name).ok())
    }

    /// Recognised keys from `lookup`, kept as text
    ///
    /// Figment's `Env` sniffs value types (`"00731"` would become `731`), so the
    /// values are handed over as strings instead.
    fn lookup_provider<F>(lookup: F) -> Serialized<HashMap<String, String>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let values: HashMap<String, String> = keys::ALL
            .iter()
            .flat_map(|key| [key.name, key.fallback])
            .filter_map(|name| lookup(name).map(|value| (name.to_string(), value)))
            .collect();
        Serialized::defaults(values)
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Global config directory (~/.config/repowiki/ on Linux)
    pub fn global_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "repowiki").map(|dirs| dirs.config_dir().to_path_buf())
    }

    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("config.toml"))
    }

    pub fn project_config_path() -> PathBuf {
        PathBuf::from(defaults::PROJECT_CONFIG_FILE)
    }

    /// Print configuration file locations
    pub fn show_path() {
        println!("Configuration paths:");
        println!();

        if let Some(global) = Self::global_config_path() {
            let exists = if global.exists() { "✓" } else { "✗" };
            println!("  Global:  {} {}", exists, global.display());
        } else {
            println!("  Global:  (not available)");
        }

        let project = Self::project_config_path();
        let exists = if project.exists() { "✓" } else { "✗" };
        println!("  Project: {} {}", exists, project.display());
    }

    /// Print the effective configuration with secrets omitted
    pub fn show_config(as_json: bool) -> Result<()> {
        let config = Self::load()?;

        if as_json {
            println!("{}", serde_json::to_string_pretty(config.as_ref())?);
        } else {
            println!(
                "{}",
                toml::to_string_pretty(config.as_ref())
                    .map_err(|e| WikiError::Config(e.to_string()))?
            );
        }

        Ok(())
    }
}
