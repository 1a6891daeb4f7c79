//! Configuration Types
//!
//! Provider configuration is built once at startup and is read-only afterwards.
//! It is shared by `Arc` with the client factory and the settings builder.

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

use crate::constants::config as defaults;
use crate::types::{Result, WikiError};

/// Canonical names of every supported provider
pub const SUPPORTED_PROVIDERS: [&str; 4] = ["OpenAI", "AzureOpenAI", "Anthropic", "AmazonBedrock"];

// =============================================================================
// Provider Kind
// =============================================================================

/// Backend chat-completion service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ProviderKind {
    #[serde(rename = "OpenAI")]
    OpenAi,
    #[serde(rename = "AzureOpenAI")]
    AzureOpenAi,
    Anthropic,
    AmazonBedrock,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OpenAI",
            ProviderKind::AzureOpenAi => "AzureOpenAI",
            ProviderKind::Anthropic => "Anthropic",
            ProviderKind::AmazonBedrock => "AmazonBedrock",
        }
    }

    /// Bedrock authenticates through the AWS credential chain instead of a key
    pub fn uses_aws_credentials(&self) -> bool {
        matches!(self, ProviderKind::AmazonBedrock)
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = WikiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "azureopenai" => Ok(ProviderKind::AzureOpenAi),
            "anthropic" => Ok(ProviderKind::Anthropic),
            "amazonbedrock" => Ok(ProviderKind::AmazonBedrock),
            _ => Err(WikiError::UnsupportedProvider {
                name: s.to_string(),
            }),
        }
    }
}

// =============================================================================
// Provider Configuration
// =============================================================================

/// Process-wide provider configuration
///
/// Secrets are held as [`SecretString`] and are redacted in `Debug` and
/// serialized output.
#[derive(Serialize)]
pub struct ProviderConfiguration {
    pub chat_model: String,
    pub analysis_model: String,
    pub deep_research_model: String,
    pub embeddings_model: String,
    #[serde(skip_serializing)]
    pub api_key: SecretString,
    pub endpoint: String,
    pub provider: ProviderKind,
    pub aws_region: String,
    #[serde(skip_serializing)]
    pub aws_access_key_id: SecretString,
    #[serde(skip_serializing)]
    pub aws_secret_access_key: SecretString,
    /// Maximum files a single file-tool call may read
    pub max_file_limit: usize,
    pub enable_incremental_update: bool,
    /// Registers the dependency-analysis tool when set
    pub enable_code_dependency_analysis: bool,
    /// Override for the code-analysis prompt bundle location
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_analysis_plugin_dir: Option<PathBuf>,
}

impl std::fmt::Debug for ProviderConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfiguration")
            .field("chat_model", &self.chat_model)
            .field("analysis_model", &self.analysis_model)
            .field("deep_research_model", &self.deep_research_model)
            .field("embeddings_model", &self.embeddings_model)
            .field("api_key", &"[REDACTED]")
            .field("endpoint", &self.endpoint)
            .field("provider", &self.provider)
            .field("aws_region", &self.aws_region)
            .field("aws_access_key_id", &"[REDACTED]")
            .field("aws_secret_access_key", &"[REDACTED]")
            .field("max_file_limit", &self.max_file_limit)
            .field("enable_incremental_update", &self.enable_incremental_update)
            .field(
                "enable_code_dependency_analysis",
                &self.enable_code_dependency_analysis,
            )
            .field("code_analysis_plugin_dir", &self.code_analysis_plugin_dir)
            .finish()
    }
}

/// A configuration key with its camel-case fallback spelling
#[derive(Debug, Clone, Copy)]
pub struct ConfigKey {
    pub name: &'static str,
    pub fallback: &'static str,
}

macro_rules! config_keys {
    ($($ident:ident => ($name:literal, $fallback:literal)),* $(,)?) => {
        pub mod keys {
            use super::ConfigKey;
            $(pub const $ident: ConfigKey = ConfigKey { name: $name, fallback: $fallback };)*
            /// Every recognised key
            pub const ALL: &[ConfigKey] = &[$($ident),*];
        }
    };
}

config_keys! {
    CHAT_MODEL => ("CHAT_MODEL", "ChatModel"),
    ANALYSIS_MODEL => ("ANALYSIS_MODEL", "AnalysisModel"),
    CHAT_API_KEY => ("CHAT_API_KEY", "ChatApiKey"),
    ENDPOINT => ("ENDPOINT", "Endpoint"),
    MODEL_PROVIDER => ("MODEL_PROVIDER", "ModelProvider"),
    DEEP_RESEARCH_MODEL => ("DEEP_RESEARCH_MODEL", "DeepResearchModel"),
    MAX_FILE_LIMIT => ("MAX_FILE_LIMIT", "MaxFileLimit"),
    EMBEDDINGS_MODEL => ("EMBEDDINGS_MODEL", "EmbeddingsModel"),
    AWS_REGION => ("AWS_REGION", "AwsRegion"),
    AWS_ACCESS_KEY_ID => ("AWS_ACCESS_KEY_ID", "AwsAccessKeyId"),
    AWS_SECRET_ACCESS_KEY => ("AWS_SECRET_ACCESS_KEY", "AwsSecretAccessKey"),
    ENABLE_INCREMENTAL_UPDATE => ("ENABLE_INCREMENTAL_UPDATE", "EnableIncrementalUpdate"),
    ENABLE_CODE_DEPENDENCY_ANALYSIS => ("ENABLE_CODE_DEPENDENCY_ANALYSIS", "EnableCodeDependencyAnalysis"),
    CODE_ANALYSIS_PLUGIN_DIR => ("CODE_ANALYSIS_PLUGIN_DIR", "CodeAnalysisPluginDir"),
}

impl ProviderConfiguration {
    /// Build and validate configuration from a key lookup.
    ///
    /// The upper-snake name wins; the camel-case name is consulted only when the
    /// first is absent. Values are trimmed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: ConfigKey| -> String {
            lookup(key.name)
                .or_else(|| lookup(key.fallback))
                .map(|v| v.trim().to_string())
                .unwrap_or_default()
        };

        let provider_name = get(keys::MODEL_PROVIDER);
        let provider = if provider_name.is_empty() {
            ProviderKind::from_str(defaults::DEFAULT_PROVIDER)?
        } else {
            provider_name.parse::<ProviderKind>()?
        };

        let chat_model = get(keys::CHAT_MODEL);
        let api_key = get(keys::CHAT_API_KEY);
        let endpoint = get(keys::ENDPOINT);
        let aws_region = get(keys::AWS_REGION);
        let aws_access_key_id = get(keys::AWS_ACCESS_KEY_ID);
        let aws_secret_access_key = get(keys::AWS_SECRET_ACCESS_KEY);

        require(&chat_model, keys::CHAT_MODEL)?;

        if provider.uses_aws_credentials() {
            require(&aws_region, keys::AWS_REGION)?;
            require(&aws_access_key_id, keys::AWS_ACCESS_KEY_ID)?;
            require(&aws_secret_access_key, keys::AWS_SECRET_ACCESS_KEY)?;
        } else {
            require(&api_key, keys::CHAT_API_KEY)?;
            require(&endpoint, keys::ENDPOINT)?;
            Url::parse(&endpoint).map_err(|e| {
                WikiError::Config(format!("ENDPOINT is not a valid URL ({}): {}", endpoint, e))
            })?;
        }

        let max_file_limit = get(keys::MAX_FILE_LIMIT)
            .parse::<i64>()
            .ok()
            .filter(|limit| *limit > 0)
            .map(|limit| limit as usize)
            .unwrap_or(defaults::DEFAULT_MAX_FILE_LIMIT);

        // Copied once; later changes to the chat model do not propagate.
        let analysis_model = non_empty_or(get(keys::ANALYSIS_MODEL), &chat_model);
        let deep_research_model = non_empty_or(get(keys::DEEP_RESEARCH_MODEL), &chat_model);

        let plugin_dir = get(keys::CODE_ANALYSIS_PLUGIN_DIR);

        Ok(Self {
            analysis_model,
            deep_research_model,
            embeddings_model: get(keys::EMBEDDINGS_MODEL),
            api_key: SecretString::from(api_key),
            endpoint,
            provider,
            aws_region,
            aws_access_key_id: SecretString::from(aws_access_key_id),
            aws_secret_access_key: SecretString::from(aws_secret_access_key),
            max_file_limit,
            enable_incremental_update: parse_flag(&get(keys::ENABLE_INCREMENTAL_UPDATE)),
            enable_code_dependency_analysis: parse_flag(&get(
                keys::ENABLE_CODE_DEPENDENCY_ANALYSIS,
            )),
            code_analysis_plugin_dir: (!plugin_dir.is_empty()).then(|| PathBuf::from(plugin_dir)),
            chat_model,
        })
    }

    /// API key in clear text, for handing to a provider client
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    /// Resolved location of the code-analysis prompt bundle
    pub fn plugin_dir(&self) -> PathBuf {
        if let Some(dir) = &self.code_analysis_plugin_dir {
            return dir.clone();
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
            .unwrap_or_default()
            .join(defaults::CODE_ANALYSIS_PLUGIN_DIR)
    }
}

fn require(value: &str, key: ConfigKey) -> Result<()> {
    if value.is_empty() {
        let hint = match key.name {
            "AWS_REGION" | "AWS_ACCESS_KEY_ID" | "AWS_SECRET_ACCESS_KEY" => {
                " (required for Amazon Bedrock)"
            }
            _ => "",
        };
        return Err(WikiError::Config(format!(
            "{} is required{}; set {} or {}",
            key.name, hint, key.name, key.fallback
        )));
    }
    Ok(())
}

fn non_empty_or(value: String, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

/// Absent or unparsable flags are off
fn parse_flag(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

// =============================================================================
// Tests
// =============================================================================
