//! Dependency-analysis tool

use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::PathBuf;
use tracing::debug;

use super::CallableTool;
use crate::analyzer::dependencies::analyze_path;
use crate::types::{Result, WikiError};

/// Summarises imports of a file or directory in the working tree
#[derive(Debug, Clone)]
pub struct DependencyTool {
    root: PathBuf,
}

impl DependencyTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl CallableTool for DependencyTool {
    fn name(&self) -> &str {
        "AnalyzeDependencies"
    }

    fn description(&self) -> &str {
        "Summarise the imports of a source file or every source file in a directory. \
         Returns JSON with per-file imports and the most imported modules."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Repository-relative file or directory; defaults to the root"
                }
            }
        })
    }

    async fn invoke(&self, arguments: Value) -> Result<String> {
        let relative = arguments
            .get("path")
            .and_then(Value::as_str)
            .unwrap_or(".")
            .trim()
            .trim_start_matches('/')
            .to_string();

        if relative.split(['/', '\\']).any(|part| part == "..") {
            return Err(WikiError::Tool(format!(
                "Access denied: '{}' is outside the repository",
                relative
            )));
        }

        let joined = if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(&relative)
        };

        // Symlinks may still point outside the root
        let root = tokio::fs::canonicalize(&self.root)
            .await
            .map_err(|e| WikiError::Tool(format!("Working directory unavailable: {}", e)))?;
        let target = tokio::fs::canonicalize(&joined)
            .await
            .map_err(|_| WikiError::Tool(format!("Path not found: {}", relative)))?;
        if !target.starts_with(&root) {
            return Err(WikiError::Tool(format!(
                "Access denied: '{}' is outside the repository",
                relative
            )));
        }
        debug!("Analyzing dependencies of {}", target.display());

        let summary = tokio::task::spawn_blocking(move || analyze_path(&root, &target))
            .await
            .map_err(|e| WikiError::Tool(format!("Dependency analysis aborted: {}", e)))??;

        Ok(serde_json::to_string_pretty(&summary)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_summary_json() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("main.py"), "import os\nimport sys\n").unwrap();

        let tool = DependencyTool::new(dir.path());
        let out = tool.invoke(json!({})).await.unwrap();
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["files_analyzed"], 1);
        assert_eq!(value["files"][0]["language"], "python");
        assert_eq!(value["files"][0]["imports"], json!(["os", "sys"]));
    }

    #[tokio::test]
    async fn test_parent_traversal_refused() {
        let dir = TempDir::new().unwrap();
        let tool = DependencyTool::new(dir.path());
        let err = tool.invoke(json!({"path": "../etc"})).await.unwrap_err();
        assert!(err.to_string().contains("Access denied"));
    }

    #[tokio::test]
    async fn test_missing_path() {
        let dir = TempDir::new().unwrap();
        let tool = DependencyTool::new(dir.path());
        let err = tool.invoke(json!({"path": "src/nope.rs"})).await.unwrap_err();
        assert!(err.to_string().contains("Path not found"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_outside_root_refused() {
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("leak.py"), "import secrets_module\n").unwrap();
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("main.py"), "import os\n").unwrap();
        std::os::unix::fs::symlink(outside.path().join("leak.py"), dir.path().join("leak.py"))
            .unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("vendor")).unwrap();

        let tool = DependencyTool::new(dir.path());
        for path in ["leak.py", "vendor"] {
            let err = tool.invoke(json!({"path": path})).await.unwrap_err();
            assert!(err.to_string().contains("Access denied"), "{path}");
        }

        // A walk of the root skips the symlinked file
        let out = tool.invoke(json!({})).await.unwrap();
        assert!(!out.contains("secrets_module"));
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["files_analyzed"], 1);
    }
}
