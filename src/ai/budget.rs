//! Model Output Token Budgets
//!
//! Maps a model identifier to its maximum output tokens. `None` means "no
//! explicit cap": the provider applies its own default.
//!
//! Resolution order:
//! 1. Prefix rules, in declaration order (model ids are not normalized, so
//!    case variants are listed separately)
//! 2. Exact match in the known model table
//! 3. No explicit cap
//!
//! The table is plain data. [`ModelTokenTable::builtin`] ships the known
//! models; [`ModelTokenTable::from_toml_str`] loads a replacement.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::types::{Result, WikiError};

/// Prefix rule: any model id starting with `prefix` gets `max_tokens`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PrefixRule {
    pub prefix: String,
    pub max_tokens: u32,
}

/// Exact-match entry; `None` marks a model that should not be capped
type TableEntry = Option<u32>;

/// Swappable model → max output tokens table
#[derive(Debug, Clone, Default)]
pub struct ModelTokenTable {
    prefixes: Vec<PrefixRule>,
    models: HashMap<String, TableEntry>,
}

/// On-disk TOML shape
///
/// ```toml
/// uncapped = ["Qwen/Qwen3-235B-A22B"]
///
/// [[prefix]]
/// prefix = "deepseek-r1"
/// max_tokens = 32768
///
/// [models]
/// "gpt-4.1" = 32768
/// ```
#[derive(Debug, Deserialize)]
struct TableFile {
    #[serde(default)]
    prefix: Vec<PrefixRule>,
    #[serde(default)]
    models: HashMap<String, u32>,
    #[serde(default)]
    uncapped: Vec<String>,
}

const BUILTIN_PREFIXES: &[(&str, u32)] = &[
    // Reasoning-distilled line, both spellings seen in the wild
    ("deepseek-r1", 32768),
    ("DeepSeek-R1", 32768),
    // Reasoning tier (o1, o3, o4-mini, ...)
    ("o", 65535),
];

const BUILTIN_MODELS: &[(&str, TableEntry)] = &[
    ("deepseek-chat", Some(8192)),
    ("DeepSeek-V3", Some(16384)),
    ("QwQ-32B", Some(8192)),
    ("gpt-4.1-mini", Some(32768)),
    ("gpt-4.1", Some(32768)),
    ("gpt-4o", Some(16384)),
    ("o4-mini", Some(32768)),
    ("doubao-1-5-pro-256k-250115", Some(12288)),
    ("o3-mini", Some(32768)),
    ("Qwen/Qwen3-235B-A22B", None),
    ("grok-3", Some(65536)),
    ("qwen2.5-coder-3b-instruct", Some(65535)),
    ("qwen3-235b-a22b", Some(65535)),
    ("claude-sonnet-4-20250514", Some(63999)),
    ("gemini-2.5-pro-preview-05-06", Some(32768)),
    ("gemini-2.5-flash-preview-04-17", Some(32768)),
    ("Qwen3-32B", Some(32768)),
    ("deepseek-r1", Some(32768)),
    ("deepseek-r1:32b-qwen-distill-fp16", Some(32768)),
    ("gpt-4o-mini", Some(16384)),
    ("gpt-4-turbo", Some(4096)),
    ("gpt-4", Some(4096)),
    ("gpt-3.5-turbo", Some(4096)),
    ("claude-3-5-sonnet-20240620", Some(8192)),
    ("claude-3-5-sonnet-20241022", Some(8192)),
    ("claude-3-opus-20240229", Some(4096)),
    ("claude-3-sonnet-20240229", Some(4096)),
    ("claude-3-haiku-20240307", Some(4096)),
    ("anthropic.claude-3-5-sonnet-20240620-v1:0", Some(8192)),
    ("anthropic.claude-3-5-sonnet-20241022-v2:0", Some(8192)),
    ("anthropic.claude-3-opus-20240229-v1:0", Some(4096)),
    ("anthropic.claude-3-sonnet-20240229-v1:0", Some(4096)),
    ("anthropic.claude-3-haiku-20240307-v1:0", Some(4096)),
];

static BUILTIN: LazyLock<ModelTokenTable> = LazyLock::new(ModelTokenTable::builtin);

impl ModelTokenTable {
    /// Table of known models shipped with the crate
    pub fn builtin() -> Self {
        Self {
            prefixes: BUILTIN_PREFIXES
                .iter()
                .map(|(prefix, max_tokens)| PrefixRule {
                    prefix: prefix.to_string(),
                    max_tokens: *max_tokens,
                })
                .collect(),
            models: BUILTIN_MODELS
                .iter()
                .map(|(model, entry)| (model.to_string(), *entry))
                .collect(),
        }
    }

    /// Load a replacement table from TOML
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let file: TableFile = toml::from_str(source)
            .map_err(|e| WikiError::Config(format!("Invalid model token table: {}", e)))?;

        let mut models: HashMap<String, TableEntry> = file
            .models
            .into_iter()
            .map(|(model, max)| (model, Some(max)))
            .collect();
        for model in file.uncapped {
            models.insert(model, None);
        }

        Ok(Self {
            prefixes: file.prefix,
            models,
        })
    }

    /// Maximum output tokens for `model_id`, or `None` for the provider default
    pub fn resolve(&self, model_id: &str) -> Option<u32> {
        if let Some(rule) = self
            .prefixes
            .iter()
            .find(|rule| model_id.starts_with(rule.prefix.as_str()))
        {
            return Some(rule.max_tokens);
        }

        self.models.get(model_id).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Resolve against the built-in table
pub fn max_output_tokens(model_id: &str) -> Option<u32> {
    BUILTIN.resolve(model_id)
}

// =============================================================================
// Tests
// =============================================================================
