//! Prompt-defined analysis functions
//!
//! A bundle directory holds one sub-directory per function:
//!
//! ```text
//! <bundle>/<FunctionName>/skprompt.txt   prompt template
//! <bundle>/<FunctionName>/config.json    optional description and input variables
//! ```
//!
//! Invoking a function renders its template with the call arguments and runs
//! a nested, tool-less completion on the same backend.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::CallableTool;
use crate::ai::prompt::{PromptTemplates, TemplateLibrary};
use crate::ai::provider::{ChatMessage, ChatTurn, SharedBackend, StreamEvent};
use crate::ai::settings::ExecutionSettings;
use crate::config::ProviderKind;
use crate::types::{Result, WikiError};

const PROMPT_FILE: &str = "skprompt.txt";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Default, Deserialize)]
struct FunctionConfig {
    #[serde(default)]
    description: String,
    #[serde(default)]
    input_variables: Vec<InputVariable>,
}

#[derive(Debug, Clone, Deserialize)]
struct InputVariable {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    default: Option<String>,
    #[serde(default = "default_required")]
    is_required: bool,
}

fn default_required() -> bool {
    true
}

/// One prompt function exposed as a tool
pub struct PromptFunctionTool {
    name: String,
    config: FunctionConfig,
    templates: TemplateLibrary,
    backend: SharedBackend,
    model: String,
    settings: ExecutionSettings,
}

impl std::fmt::Debug for PromptFunctionTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptFunctionTool")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("variables", &self.config.input_variables.len())
            .finish()
    }
}

impl PromptFunctionTool {
    fn load(
        dir: &Path,
        backend: SharedBackend,
        kind: ProviderKind,
        model: &str,
    ) -> Result<Option<Self>> {
        let prompt_path = dir.join(PROMPT_FILE);
        if !prompt_path.is_file() {
            return Ok(None);
        }
        let Some(name) = dir.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            return Ok(None);
        };

        let config_path = dir.join(CONFIG_FILE);
        let mut config: FunctionConfig = if config_path.is_file() {
            serde_json::from_str(&std::fs::read_to_string(&config_path)?).map_err(|e| {
                WikiError::Config(format!("Invalid {}: {}", config_path.display(), e))
            })?
        } else {
            FunctionConfig::default()
        };
        if config.input_variables.is_empty() {
            config.input_variables.push(InputVariable {
                name: "input".to_string(),
                description: "Text to analyze".to_string(),
                default: None,
                is_required: true,
            });
        }
        if config.description.is_empty() {
            config.description = format!("Run the {} analysis prompt", name);
        }

        let mut templates = TemplateLibrary::empty();
        templates.add_template(&name, &std::fs::read_to_string(&prompt_path)?)?;

        Ok(Some(Self {
            settings: ExecutionSettings::builder(kind, model).build(),
            model: model.to_string(),
            name,
            config,
            templates,
            backend,
        }))
    }

    fn variables(&self, arguments: &Value) -> Result<HashMap<String, String>> {
        let mut vars = HashMap::new();
        for variable in &self.config.input_variables {
            let value = match arguments.get(&variable.name) {
                Some(Value::String(text)) => Some(text.clone()),
                Some(Value::Null) | None => variable.default.clone(),
                Some(other) => Some(other.to_string()),
            };
            match value {
                Some(value) => {
                    vars.insert(variable.name.clone(), value);
                }
                None if variable.is_required => {
                    return Err(WikiError::Tool(format!(
                        "{} requires argument '{}'",
                        self.name, variable.name
                    )));
                }
                None => {
                    vars.insert(variable.name.clone(), String::new());
                }
            }
        }
        Ok(vars)
    }
}

#[async_trait]
impl CallableTool for PromptFunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.config.description
    }

    fn parameters(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for variable in &self.config.input_variables {
            properties.insert(
                variable.name.clone(),
                json!({"type": "string", "description": variable.description}),
            );
            if variable.is_required && variable.default.is_none() {
                required.push(Value::String(variable.name.clone()));
            }
        }
        json!({"type": "object", "properties": properties, "required": required})
    }

    async fn invoke(&self, arguments: Value) -> Result<String> {
        let vars = self.variables(&arguments)?;
        let prompt = self.templates.render(&self.name, &vars, &self.model)?;
        debug!("Running prompt function '{}'", self.name);

        let turn = ChatTurn {
            model: self.model.clone(),
            messages: vec![ChatMessage::User(prompt)],
            settings: self.settings.without_tools(),
            tools: Vec::new(),
        };
        let mut events = self.backend.stream_turn(turn).await?;

        let mut output = String::new();
        while let Some(event) = events.next().await {
            if let StreamEvent::Text(text) = event? {
                output.push_str(&text);
            }
        }
        Ok(output)
    }
}

/// Load every prompt function under `dir`, sorted by name.
///
/// A missing directory is not an error: the bundle is skipped with a warning.
pub fn load_prompt_tools(
    dir: &Path,
    backend: SharedBackend,
    kind: ProviderKind,
    model: &str,
) -> Result<Vec<Arc<dyn CallableTool>>> {
    if !dir.is_dir() {
        warn!(
            "Code-analysis prompt bundle not found at {}; continuing without it",
            dir.display()
        );
        return Ok(Vec::new());
    }

    let mut function_dirs: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    function_dirs.sort();

    let mut tools: Vec<Arc<dyn CallableTool>> = Vec::new();
    for function_dir in function_dirs {
        if let Some(tool) = PromptFunctionTool::load(&function_dir, backend.clone(), kind, model)? {
            tools.push(Arc::new(tool));
        }
    }

    info!("Loaded {} prompt function(s) from {}", tools.len(), dir.display());
    Ok(tools)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::testing::ScriptedBackend;
    use tempfile::TempDir;

    fn bundle() -> TempDir {
        let dir = TempDir::new().unwrap();
        let summarize = dir.path().join("SummarizeModule");
        std::fs::create_dir(&summarize).unwrap();
        std::fs::write(summarize.join(PROMPT_FILE), "Summarize:\n{{$input}}").unwrap();

        let compare = dir.path().join("CompareFiles");
        std::fs::create_dir(&compare).unwrap();
        std::fs::write(compare.join(PROMPT_FILE), "{{ left }} vs {{ right }}").unwrap();
        std::fs::write(
            compare.join(CONFIG_FILE),
            r#"{
                "schema": 1,
                "description": "Compare two files",
                "input_variables": [
                    {"name": "left", "description": "First file"},
                    {"name": "right", "description": "Second file", "default": "nothing"}
                ]
            }"#,
        )
        .unwrap();

        std::fs::create_dir(dir.path().join("Empty")).unwrap();
        dir
    }

    #[test]
    fn test_load_bundle() {
        let dir = bundle();
        let backend = ScriptedBackend::text(&[]);
        let tools = load_prompt_tools(dir.path(), backend, ProviderKind::OpenAi, "gpt-4.1").unwrap();

        let names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["CompareFiles", "SummarizeModule"]);
        assert_eq!(tools[0].description(), "Compare two files");
        assert_eq!(tools[0].parameters()["required"], json!(["left"]));
        assert_eq!(tools[1].parameters()["required"], json!(["input"]));
    }

    #[test]
    fn test_missing_bundle_is_empty() {
        let backend = ScriptedBackend::text(&[]);
        let tools = load_prompt_tools(
            Path::new("/nonexistent/CodeAnalysis"),
            backend,
            ProviderKind::OpenAi,
            "gpt-4.1",
        )
        .unwrap();
        assert!(tools.is_empty());
    }

    #[tokio::test]
    async fn test_invoke_runs_nested_completion() {
        let dir = bundle();
        let backend = ScriptedBackend::text(&["Two ", "files differ."]);
        let tools = load_prompt_tools(
            dir.path(),
            backend.clone(),
            ProviderKind::Anthropic,
            "claude-3-haiku-20240307",
        )
        .unwrap();

        let output = tools[0].invoke(json!({"left": "a.rs"})).await.unwrap();
        assert_eq!(output, "Two files differ.");

        let turns = backend.seen_turns();
        assert_eq!(turns.len(), 1);
        assert!(turns[0].tools.is_empty());
        assert!(!turns[0].settings.auto_invoke_tools());
        assert_eq!(turns[0].messages, vec![ChatMessage::User("a.rs vs nothing".to_string())]);
    }

    #[tokio::test]
    async fn test_missing_required_argument() {
        let dir = bundle();
        let backend = ScriptedBackend::text(&[]);
        let tools = load_prompt_tools(dir.path(), backend, ProviderKind::OpenAi, "gpt-4.1").unwrap();
        let err = tools[1].invoke(json!({})).await.unwrap_err();
        assert!(matches!(err, WikiError::Tool(_)));
    }
}
