//! Callable Tools
//!
//! Functions the model may call during a completion. Each tool advertises a
//! JSON-schema parameter object and returns plain text; failures are reported
//! back to the model as text rather than aborting the completion.
//!
//! ## Tools
//!
//! - `file`: read repository files (always registered)
//! - `dependency`: import/dependency summary (behind the dependency-analysis flag)
//! - `prompt_bundle`: prompt-defined analysis functions loaded from a directory

mod dependency;
mod file;
mod prompt_bundle;

pub use dependency::DependencyTool;
pub use file::FileTool;
pub use prompt_bundle::{PromptFunctionTool, load_prompt_tools};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::types::Result;

/// A function the model can invoke
#[async_trait]
pub trait CallableTool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the argument object
    fn parameters(&self) -> Value;

    async fn invoke(&self, arguments: Value) -> Result<String>;
}

/// Tool description sent to the provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Ordered set of tools bound to one client
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn CallableTool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.tools.iter().map(|t| t.name().to_string()))
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool; a tool with the same name is replaced
    pub fn register(&mut self, tool: Arc<dyn CallableTool>) {
        if let Some(existing) = self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            warn!("Replacing previously registered tool '{}'", tool.name());
            *existing = tool;
        } else {
            self.tools.push(tool);
        }
    }

    pub fn extend(&mut self, tools: impl IntoIterator<Item = Arc<dyn CallableTool>>) {
        for tool in tools {
            self.register(tool);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|tool| ToolSpec {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect()
    }

    /// Run a tool call and render the outcome as text for the model
    pub async fn invoke(&self, name: &str, arguments: &str) -> String {
        let Some(tool) = self.tools.iter().find(|t| t.name() == name) else {
            warn!("Model requested unknown tool '{}'", name);
            return format!("Error: unknown tool '{}'", name);
        };

        let arguments = if arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            match serde_json::from_str::<Value>(arguments) {
                Ok(value) => value,
                Err(e) => {
                    warn!("Invalid arguments for tool '{}': {}", name, e);
                    return format!("Error: arguments for '{}' are not valid JSON: {}", name, e);
                }
            }
        };

        debug!("Invoking tool '{}'", name);
        match tool.invoke(arguments).await {
            Ok(output) => output,
            Err(e) => {
                warn!("Tool '{}' failed: {}", name, e);
                format!("Error: {}", e)
            }
        }
    }
}

/// Pull a required string argument out of a tool call
pub(crate) fn string_arg(arguments: &Value, key: &str) -> Result<String> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| crate::types::WikiError::Tool(format!("missing string argument '{}'", key)))
}
