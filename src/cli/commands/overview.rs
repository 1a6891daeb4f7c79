//! Overview Command
//!
//! Generates the overview document for one repository.
//!
//! Usage:
//!   repowiki overview --catalog catalog.txt --readme README.md \
//!       --repo https://github.com/acme/widget.git --branch main --workdir ./widget

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::runtime::Runtime;
use tracing::info;

use crate::ai::prompt::{PromptTemplates, TemplateLibrary};
use crate::ai::provider::create_client;
use crate::config::ConfigLoader;
use crate::types::{ClassifyType, Result, WikiError};
use crate::wiki::OverviewGenerator;

/// Overview run options
#[derive(Debug, Clone, Default)]
pub struct OverviewOptions {
    /// File holding the repository catalogue
    pub catalog: PathBuf,
    /// README file
    pub readme: PathBuf,
    pub repository_url: String,
    pub branch: String,
    /// Checked-out repository the file tools are bound to
    pub working_dir: PathBuf,
    pub classification: Option<ClassifyType>,
    /// Chat model override
    pub model: Option<String>,
    /// Template directory overlaid on the built-in prompts
    pub templates: Option<PathBuf>,
    /// Write the document here instead of stdout
    pub output: Option<PathBuf>,
    pub no_code_analysis: bool,
    /// Configuration file instead of the global/project chain
    pub config_file: Option<PathBuf>,
}

pub fn run(options: OverviewOptions) -> Result<()> {
    let config = match &options.config_file {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };

    let catalog = read_input(&options.catalog, "catalog")?;
    let readme = read_input(&options.readme, "readme")?;
    if !options.working_dir.is_dir() {
        return Err(WikiError::Config(format!(
            "Working directory not found: {}",
            options.working_dir.display()
        )));
    }

    let templates: Arc<dyn PromptTemplates> = match &options.templates {
        Some(dir) => Arc::new(TemplateLibrary::from_dir(dir)?),
        None => Arc::new(TemplateLibrary::builtin()?),
    };

    let model = options
        .model
        .clone()
        .unwrap_or_else(|| config.chat_model.clone());

    let rt = Runtime::new()?;
    let document = rt.block_on(async {
        let client = create_client(
            config.clone(),
            &config.endpoint,
            config.api_key(),
            &options.working_dir,
            &model,
            !options.no_code_analysis,
        )?;

        OverviewGenerator::new(config.clone(), templates)
            .generate(
                &client,
                &catalog,
                &options.repository_url,
                &options.branch,
                &readme,
                options.classification,
            )
            .await
    })?;

    match &options.output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &document)?;
            info!("Overview written to {}", path.display());
            println!("✓ Overview written to {}", path.display());
        }
        None => println!("{}", document),
    }

    Ok(())
}

fn read_input(path: &Path, what: &str) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        WikiError::Config(format!("Cannot read {} file {}: {}", what, path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_catalog_is_config_error() {
        let dir = TempDir::new().unwrap();
        let err = read_input(&dir.path().join("catalog.txt"), "catalog").unwrap_err();
        assert!(matches!(err, WikiError::Config(ref m) if m.contains("catalog")));
    }

    #[test]
    fn test_invalid_config_file_fails_before_generation() {
        let dir = TempDir::new().unwrap();
        let config = dir.path().join("repowiki.toml");
        std::fs::write(&config, "MODEL_PROVIDER = \"Gemini\"\nCHAT_MODEL = \"x\"\n").unwrap();

        let err = run(OverviewOptions {
            config_file: Some(config),
            working_dir: dir.path().to_path_buf(),
            ..Default::default()
        })
        .unwrap_err();
        assert!(err.is_fatal());
    }
}
