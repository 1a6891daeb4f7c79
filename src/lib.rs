//! RepoWiki - Repository Overview Generator
//!
//! Turns a repository's catalogue, README and URL into an overview document by
//! streaming a chat completion from one of several LLM providers.
//!
//! ## Pipeline
//!
//! ```text
//! ProviderConfiguration ──► ClientFactory ──► ChatClient (+ tools)
//!                                                │
//! catalogue / readme / url ──► OverviewGenerator ┘──► extracted document
//!                                   │
//!                     ExecutionSettings ◄── ModelTokenTable
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use repowiki::{ConfigLoader, OverviewGenerator, TemplateLibrary, create_client};
//!
//! let config = ConfigLoader::load()?;
//! let client = create_client(
//!     config.clone(),
//!     &config.endpoint,
//!     config.api_key(),
//!     &repo_dir,
//!     &config.chat_model,
//!     true,
//! )?;
//! let generator = OverviewGenerator::new(config, Arc::new(TemplateLibrary::builtin()?));
//! let overview = generator
//!     .generate(&client, &catalogue, "https://github.com/acme/widget.git", "main", &readme, None)
//!     .await?;
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: token budgets, execution settings, prompt templates, providers
//! - [`analyzer`]: tree-sitter import extraction
//! - [`config`]: provider configuration and loading
//! - [`tools`]: callable tools offered to the model
//! - [`wiki`]: document generation

pub mod ai;
pub mod analyzer;
pub mod cli;
pub mod config;
pub mod constants;
pub mod tools;
pub mod types;
pub mod wiki;

// =============================================================================
// Core Re-exports
// =============================================================================

pub use config::{ConfigLoader, ProviderConfiguration, ProviderKind};
pub use types::{ClassifyType, ErrorCategory, Result, WikiError};

// =============================================================================
// Generation Re-exports
// =============================================================================

pub use ai::{
    ChatClient, ClientFactory, ExecutionSettings, ModelTokenTable, PromptTemplates,
    TemplateLibrary, ToolCallBehavior, create_client, max_output_tokens,
};
pub use wiki::{OverviewGenerator, extract_document};
