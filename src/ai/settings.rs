//! Execution Settings
//!
//! Per-request parameters shaped for the target provider. Bedrock takes a
//! mandatory `max_tokens_to_sample`; every other provider takes an optional
//! `max_tokens` and a tool-call behavior.

use serde::Serialize;

use super::budget::{ModelTokenTable, max_output_tokens};
use crate::config::ProviderKind;
use crate::constants::generation;

/// Whether the client may run tool calls requested by the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ToolCallBehavior {
    #[default]
    None,
    /// Advertise registered tools and run every requested call
    AutoInvoke,
}

/// Provider-shaped execution settings, built fresh for each request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum ExecutionSettings {
    Bedrock {
        max_tokens_to_sample: u32,
        temperature: f32,
    },
    OpenAi {
        max_tokens: Option<u32>,
        temperature: f32,
        tool_call_behavior: ToolCallBehavior,
    },
}

impl ExecutionSettings {
    pub fn builder(provider: ProviderKind, model: impl Into<String>) -> ExecutionSettingsBuilder<'static> {
        ExecutionSettingsBuilder {
            provider,
            model: model.into(),
            max_tokens: None,
            temperature: generation::DEFAULT_TEMPERATURE,
            tool_calls: false,
            table: None,
        }
    }

    pub fn temperature(&self) -> f32 {
        match self {
            ExecutionSettings::Bedrock { temperature, .. }
            | ExecutionSettings::OpenAi { temperature, .. } => *temperature,
        }
    }

    /// Output cap to send, if any
    pub fn max_tokens(&self) -> Option<u32> {
        match self {
            ExecutionSettings::Bedrock {
                max_tokens_to_sample,
                ..
            } => Some(*max_tokens_to_sample),
            ExecutionSettings::OpenAi { max_tokens, .. } => *max_tokens,
        }
    }

    pub fn tool_call_behavior(&self) -> ToolCallBehavior {
        match self {
            ExecutionSettings::Bedrock { .. } => ToolCallBehavior::None,
            ExecutionSettings::OpenAi {
                tool_call_behavior, ..
            } => *tool_call_behavior,
        }
    }

    pub fn auto_invoke_tools(&self) -> bool {
        self.tool_call_behavior() == ToolCallBehavior::AutoInvoke
    }

    /// Same settings with tool calls switched off (used for nested completions)
    pub fn without_tools(&self) -> Self {
        match self {
            ExecutionSettings::OpenAi {
                max_tokens,
                temperature,
                ..
            } => ExecutionSettings::OpenAi {
                max_tokens: *max_tokens,
                temperature: *temperature,
                tool_call_behavior: ToolCallBehavior::None,
            },
            bedrock => bedrock.clone(),
        }
    }
}

/// Builder for [`ExecutionSettings`]; `build` never fails
#[derive(Debug, Clone)]
pub struct ExecutionSettingsBuilder<'a> {
    provider: ProviderKind,
    model: String,
    max_tokens: Option<u32>,
    temperature: f32,
    tool_calls: bool,
    table: Option<&'a ModelTokenTable>,
}

impl<'a> ExecutionSettingsBuilder<'a> {
    /// Explicit cap; overrides the model table when `Some`
    pub fn max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn tool_calls(mut self, enabled: bool) -> Self {
        self.tool_calls = enabled;
        self
    }

    /// Resolve caps against `table` instead of the built-in one
    pub fn token_table<'b>(self, table: &'b ModelTokenTable) -> ExecutionSettingsBuilder<'b> {
        ExecutionSettingsBuilder {
            provider: self.provider,
            model: self.model,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            tool_calls: self.tool_calls,
            table: Some(table),
        }
    }

    pub fn build(self) -> ExecutionSettings {
        let effective = self.max_tokens.or_else(|| match self.table {
            Some(table) => table.resolve(&self.model),
            None => max_output_tokens(&self.model),
        });

        match self.provider {
            ProviderKind::AmazonBedrock => ExecutionSettings::Bedrock {
                max_tokens_to_sample: effective.unwrap_or(generation::FALLBACK_MAX_TOKENS),
                temperature: self.temperature,
            },
            ProviderKind::OpenAi | ProviderKind::AzureOpenAi | ProviderKind::Anthropic => {
                ExecutionSettings::OpenAi {
                    max_tokens: effective,
                    temperature: self.temperature,
                    tool_call_behavior: if self.tool_calls {
                        ToolCallBehavior::AutoInvoke
                    } else {
                        ToolCallBehavior::None
                    },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_defaults() {
        let settings = ExecutionSettings::builder(ProviderKind::OpenAi, "gpt-4.1").build();
        assert_eq!(
            settings,
            ExecutionSettings::OpenAi {
                max_tokens: Some(32768),
                temperature: 0.5,
                tool_call_behavior: ToolCallBehavior::None,
            }
        );
        assert!(!settings.auto_invoke_tools());
    }

    #[test]
    fn test_tool_calls_enable_auto_invoke() {
        let settings = ExecutionSettings::builder(ProviderKind::Anthropic, "claude-sonnet-4-20250514")
            .tool_calls(true)
            .build();
        assert_eq!(settings.tool_call_behavior(), ToolCallBehavior::AutoInvoke);
        assert_eq!(settings.max_tokens(), Some(63999));
        assert_eq!(settings.without_tools().tool_call_behavior(), ToolCallBehavior::None);
    }

    #[test]
    fn test_unknown_model_leaves_cap_to_provider() {
        let settings = ExecutionSettings::builder(ProviderKind::AzureOpenAi, "my-deployment")
            .tool_calls(true)
            .build();
        assert_eq!(settings.max_tokens(), None);
    }

    #[test]
    fn test_explicit_max_tokens_wins() {
        let settings = ExecutionSettings::builder(ProviderKind::OpenAi, "gpt-4.1")
            .max_tokens(Some(1000))
            .temperature(0.1)
            .build();
        assert_eq!(settings.max_tokens(), Some(1000));
        assert_eq!(settings.temperature(), 0.1);
    }

    #[test]
    fn test_bedrock_falls_back_to_4096() {
        let settings = ExecutionSettings::builder(ProviderKind::AmazonBedrock, "unknown-model")
            .tool_calls(true)
            .build();
        assert_eq!(
            settings,
            ExecutionSettings::Bedrock {
                max_tokens_to_sample: 4096,
                temperature: 0.5,
            }
        );
        // Bedrock settings never carry tools
        assert!(!settings.auto_invoke_tools());
    }

    #[test]
    fn test_bedrock_uses_table() {
        let settings = ExecutionSettings::builder(
            ProviderKind::AmazonBedrock,
            "anthropic.claude-3-5-sonnet-20241022-v2:0",
        )
        .build();
        assert_eq!(settings.max_tokens(), Some(8192));
    }

    #[test]
    fn test_custom_token_table() {
        let table = ModelTokenTable::from_toml_str("[models]\n\"house-model\" = 777\n").unwrap();
        let settings = ExecutionSettings::builder(ProviderKind::OpenAi, "house-model")
            .token_table(&table)
            .build();
        assert_eq!(settings.max_tokens(), Some(777));

        // gpt-4.1 is not in the custom table
        let settings = ExecutionSettings::builder(ProviderKind::OpenAi, "gpt-4.1")
            .token_table(&table)
            .build();
        assert_eq!(settings.max_tokens(), None);
    }
}
