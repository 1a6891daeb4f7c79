//! Import extraction with tree-sitter
//!
//! Produces a per-file list of imported modules plus a repository-wide count of
//! the most imported ones. Only import statements are read; no symbol
//! resolution is attempted.

use ignore::WalkBuilder;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tree_sitter::{Query, QueryCursor, StreamingIterator};

use crate::constants::tools::{MAX_DEPENDENCY_FILES, MAX_FILE_BYTES};
use crate::types::{Result, WikiError};

const TOP_IMPORTS: usize = 20;

/// Languages with an import query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceLanguage {
    Rust,
    Python,
    TypeScript,
    Tsx,
    Go,
    Java,
}

impl SourceLanguage {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "rs" => Some(Self::Rust),
            "py" | "pyi" => Some(Self::Python),
            "ts" | "mts" | "cts" | "js" | "mjs" | "cjs" => Some(Self::TypeScript),
            "tsx" | "jsx" => Some(Self::Tsx),
            "go" => Some(Self::Go),
            "java" => Some(Self::Java),
            _ => None,
        }
    }

    fn grammar(&self) -> tree_sitter::Language {
        match self {
            Self::Rust => tree_sitter_rust::LANGUAGE.into(),
            Self::Python => tree_sitter_python::LANGUAGE.into(),
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Self::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Self::Go => tree_sitter_go::LANGUAGE.into(),
            Self::Java => tree_sitter_java::LANGUAGE.into(),
        }
    }

    fn import_query(&self) -> &'static str {
        match self {
            Self::Rust => {
                r#"
                (use_declaration argument: (_) @import)
                "#
            }
            Self::Python => {
                r#"
                (import_statement name: (dotted_name) @import)
                (import_statement name: (aliased_import name: (dotted_name) @import))
                (import_from_statement module_name: (_) @import)
                "#
            }
            Self::TypeScript | Self::Tsx => {
                r#"
                (import_statement source: (string) @import)
                "#
            }
            Self::Go => {
                r#"
                (import_spec path: (interpreted_string_literal) @import)
                "#
            }
            Self::Java => {
                r#"
                (import_declaration (scoped_identifier) @import)
                "#
            }
        }
    }
}

/// Imports found in one file
#[derive(Debug, Clone, Serialize)]
pub struct FileDependencies {
    pub path: String,
    pub language: SourceLanguage,
    pub imports: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportCount {
    pub module: String,
    pub count: usize,
}

/// Summary returned to the model
#[derive(Debug, Clone, Serialize)]
pub struct DependencySummary {
    pub target: String,
    pub files_analyzed: usize,
    /// File cap reached before the walk finished
    pub truncated: bool,
    pub files: Vec<FileDependencies>,
    pub most_imported: Vec<ImportCount>,
}

/// Imports in `content`, deduplicated in source order
pub fn extract_imports(language: SourceLanguage, content: &str) -> Result<Vec<String>> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&language.grammar())
        .map_err(|e| WikiError::Tool(format!("Failed to set {:?} language: {}", language, e)))?;

    let tree = parser
        .parse(content, None)
        .ok_or_else(|| WikiError::Tool(format!("Failed to parse {:?} source", language)))?;

    let query = Query::new(&language.grammar(), language.import_query())
        .map_err(|e| WikiError::Tool(format!("Invalid {:?} import query: {}", language, e)))?;

    let mut imports: Vec<String> = Vec::new();
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&query, tree.root_node(), content.as_bytes());

    while let Some(m) = matches.next() {
        for cap in m.captures.iter() {
            let raw = cap.node.utf8_text(content.as_bytes()).unwrap_or_default();
            let module = raw.trim().trim_matches(|c| c == '"' || c == '\'' || c == '`');
            if !module.is_empty() && !imports.iter().any(|i| i == module) {
                imports.push(module.to_string());
            }
        }
    }

    Ok(imports)
}

/// Analyze a file or directory below `root`
pub fn analyze_path(root: &Path, target: &Path) -> Result<DependencySummary> {
    let mut files = Vec::new();
    let mut truncated = false;

    if target.is_file() {
        if let Some(deps) = analyze_file(root, target)? {
            files.push(deps);
        }
    } else if target.is_dir() {
        let walker = WalkBuilder::new(target)
            .hidden(true)
            .git_ignore(true)
            .git_exclude(true)
            .follow_links(false)
            .build();

        for entry in walker.filter_map(|e| e.ok()) {
            let path = entry.path();
            // file_type() does not follow symlinks
            let is_file = entry.file_type().is_some_and(|t| t.is_file());
            if !is_file || SourceLanguage::from_path(path).is_none() {
                continue;
            }
            if files.len() >= MAX_DEPENDENCY_FILES {
                truncated = true;
                break;
            }
            if let Some(deps) = analyze_file(root, path)? {
                files.push(deps);
            }
        }
    } else {
        return Err(WikiError::Tool(format!(
            "Path not found: {}",
            display_relative(root, target)
        )));
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for file in &files {
        for import in &file.imports {
            *counts.entry(import.as_str()).or_default() += 1;
        }
    }
    let mut most_imported: Vec<ImportCount> = counts
        .into_iter()
        .map(|(module, count)| ImportCount {
            module: module.to_string(),
            count,
        })
        .collect();
    most_imported.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.module.cmp(&b.module)));
    most_imported.truncate(TOP_IMPORTS);

    Ok(DependencySummary {
        target: display_relative(root, target),
        files_analyzed: files.len(),
        truncated,
        files,
        most_imported,
    })
}

fn analyze_file(root: &Path, path: &Path) -> Result<Option<FileDependencies>> {
    let Some(language) = SourceLanguage::from_path(path) else {
        return Ok(None);
    };
    if std::fs::metadata(path)?.len() > MAX_FILE_BYTES as u64 {
        return Ok(None);
    }
    let Ok(content) = std::fs::read_to_string(path) else {
        return Ok(None);
    };

    Ok(Some(FileDependencies {
        path: display_relative(root, path),
        language,
        imports: extract_imports(language, &content)?,
    }))
}

fn display_relative(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let text = relative.to_string_lossy().replace('\\', "/");
    if text.is_empty() { ".".to_string() } else { text }
}
