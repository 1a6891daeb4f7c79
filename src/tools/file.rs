//! Repository file access for the model

use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::debug;

use super::CallableTool;
use crate::constants::tools::MAX_FILE_BYTES;
use crate::types::{Result, WikiError};

/// Returned in place of content for paths that do not exist
pub const FILE_NOT_FOUND: &str = "File not found";

/// Reads files under a fixed working directory
#[derive(Debug, Clone)]
pub struct FileTool {
    root: PathBuf,
    max_files: usize,
}

impl FileTool {
    pub fn new(root: impl Into<PathBuf>, max_files: usize) -> Self {
        Self {
            root: root.into(),
            max_files: max_files.max(1),
        }
    }

    /// Resolve `relative` inside the root, or `None` if it would escape it
    fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let mut resolved = PathBuf::new();
        for component in Path::new(relative.trim()).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
                Component::ParentDir => {
                    if !resolved.pop() {
                        return None;
                    }
                }
            }
        }
        Some(self.root.join(resolved))
    }

    async fn read_one(&self, relative: &str) -> String {
        let Some(path) = self.resolve(relative) else {
            return format!("Access denied: '{}' is outside the repository", relative);
        };

        // Symlinks may still point outside the root
        let (Ok(canonical), Ok(root)) = (
            tokio::fs::canonicalize(&path).await,
            tokio::fs::canonicalize(&self.root).await,
        ) else {
            return FILE_NOT_FOUND.to_string();
        };
        if !canonical.starts_with(&root) {
            return format!("Access denied: '{}' is outside the repository", relative);
        }
        if !canonical.is_file() {
            return FILE_NOT_FOUND.to_string();
        }

        // One byte past the cap is enough to know the file was cut
        let mut bytes = Vec::new();
        let read = match tokio::fs::File::open(&canonical).await {
            Ok(file) => {
                file.take(MAX_FILE_BYTES as u64 + 1)
                    .read_to_end(&mut bytes)
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = read {
            return format!("Error reading file: {}", e);
        }

        let text = String::from_utf8_lossy(&bytes);
        let (content, cut) = truncate_to_boundary(&text, MAX_FILE_BYTES);
        if cut || bytes.len() > MAX_FILE_BYTES {
            format!("{}\n... [truncated at {} bytes]", content, MAX_FILE_BYTES)
        } else {
            content.to_string()
        }
    }
}

#[async_trait]
impl CallableTool for FileTool {
    fn name(&self) -> &str {
        "ReadFiles"
    }

    fn description(&self) -> &str {
        "Read one or more files from the repository. Paths are relative to the repository root."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "paths": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": format!(
                        "Repository-relative file paths, at most {} per call",
                        self.max_files
                    )
                }
            },
            "required": ["paths"]
        })
    }

    async fn invoke(&self, arguments: Value) -> Result<String> {
        let paths: Vec<String> = match arguments.get("paths") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(single)) => vec![single.clone()],
            _ => {
                return Err(WikiError::Tool(
                    "ReadFiles expects a 'paths' array".to_string(),
                ));
            }
        };

        if paths.len() > self.max_files {
            return Err(WikiError::Tool(format!(
                "Too many files requested ({}); read at most {} per call",
                paths.len(),
                self.max_files
            )));
        }

        debug!("Reading {} file(s) under {}", paths.len(), self.root.display());

        let mut output = String::new();
        for path in &paths {
            let content = self.read_one(path).await;
            output.push_str(&format!("<file path=\"{}\">\n{}\n</file>\n", path, content));
        }
        Ok(output)
    }
}

/// Cut `text` to at most `max` bytes without splitting a character
fn truncate_to_boundary(text: &str, max: usize) -> (&str, bool) {
    if text.len() <= max {
        return (text, false);
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    (&text[..end], true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {}\n").unwrap();
        std::fs::write(dir.path().join("README.md"), "# Demo\n").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_reads_requested_files() {
        let dir = repo();
        let tool = FileTool::new(dir.path(), 10);
        let out = tool
            .invoke(json!({"paths": ["src/main.rs", "./README.md"]}))
            .await
            .unwrap();
        assert!(out.contains("<file path=\"src/main.rs\">\nfn main() {}"));
        assert!(out.contains("# Demo"));
    }

    #[tokio::test]
    async fn test_missing_file_signal() {
        let dir = repo();
        let tool = FileTool::new(dir.path(), 10);
        let out = tool.invoke(json!({"paths": ["nope.rs"]})).await.unwrap();
        assert!(out.contains(FILE_NOT_FOUND));

        // Directories are not files
        let out = tool.invoke(json!({"paths": ["src"]})).await.unwrap();
        assert!(out.contains(FILE_NOT_FOUND));
    }

    #[tokio::test]
    async fn test_traversal_is_refused() {
        let dir = repo();
        let tool = FileTool::new(dir.path().join("src"), 10);
        let out = tool.invoke(json!({"paths": ["../README.md"]})).await.unwrap();
        assert!(out.contains("Access denied"));

        // Leading slash stays inside the root
        let out = tool.invoke(json!({"paths": ["/main.rs"]})).await.unwrap();
        assert!(out.contains("fn main()"));
    }

    #[tokio::test]
    async fn test_file_limit() {
        let dir = repo();
        let tool = FileTool::new(dir.path(), 1);
        let err = tool
            .invoke(json!({"paths": ["README.md", "src/main.rs"]}))
            .await
            .unwrap_err();
        assert!(matches!(err, WikiError::Tool(_)));
    }

    #[tokio::test]
    async fn test_bad_arguments() {
        let dir = repo();
        let tool = FileTool::new(dir.path(), 10);
        assert!(tool.invoke(json!({"files": []})).await.is_err());
    }

    #[tokio::test]
    async fn test_large_file_is_truncated() {
        let dir = repo();
        std::fs::write(dir.path().join("big.txt"), "a".repeat(MAX_FILE_BYTES + 100)).unwrap();
        std::fs::write(dir.path().join("exact.txt"), "b".repeat(MAX_FILE_BYTES)).unwrap();
        let tool = FileTool::new(dir.path(), 10);

        let out = tool.invoke(json!({"paths": ["big.txt"]})).await.unwrap();
        assert!(out.contains(&format!("[truncated at {} bytes]", MAX_FILE_BYTES)));
        assert!(out.contains(&"a".repeat(MAX_FILE_BYTES)));
        assert!(!out.contains(&"a".repeat(MAX_FILE_BYTES + 1)));

        let out = tool.invoke(json!({"paths": ["exact.txt"]})).await.unwrap();
        assert!(!out.contains("truncated"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_outside_root_is_refused() {
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "token").unwrap();
        let dir = repo();
        std::os::unix::fs::symlink(outside.path().join("secret.txt"), dir.path().join("link.txt"))
            .unwrap();

        let tool = FileTool::new(dir.path(), 10);
        let out = tool.invoke(json!({"paths": ["link.txt"]})).await.unwrap();
        assert!(out.contains("Access denied"));
        assert!(!out.contains("token"));
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        let text = "aé";
        assert_eq!(truncate_to_boundary(text, 2), ("a", true));
        assert_eq!(truncate_to_boundary(text, 3), ("aé", false));
    }
}
