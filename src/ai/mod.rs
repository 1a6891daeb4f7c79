//! AI Integration Layer
//!
//! Output-token budgets, per-request execution settings, prompt templates and
//! provider-bound streaming chat clients.

pub mod budget;
pub mod prompt;
pub mod provider;
pub mod settings;

pub use budget::{ModelTokenTable, PrefixRule, max_output_tokens};
pub use prompt::{PromptTemplates, TemplateLibrary};
pub use provider::{
    ChatBackend, ChatClient, ChatMessage, ClientFactory, ErrorCategory, ErrorClassifier,
    FragmentStream, LlmError, StreamEvent, collect_fragments, create_client,
};
pub use settings::{ExecutionSettings, ExecutionSettingsBuilder, ToolCallBehavior};
