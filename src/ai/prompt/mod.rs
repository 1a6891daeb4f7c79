//! Prompt Template Library
//!
//! Named prompt templates rendered with string variables. Templates use Tera
//! syntax; the `{{$name}}` placeholder style found in prompt directories is
//! accepted and rewritten on load.
//!
//! ## Lookup
//!
//! `render(name, vars, model)` tries `"{model}/{name}"` first, so a prompt
//! directory can carry per-model variants next to the generic ones.

use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;
use tera::{Context, Tera};
use tracing::debug;

use crate::types::{ClassifyType, Result, WikiError};

/// Base name of the overview template family
pub const OVERVIEW: &str = "Overview";

const TEMPLATE_EXTENSIONS: &[&str] = &["md", "txt", "tera", "prompt"];

static DOLLAR_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*\$([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("valid placeholder regex")
});

/// Source of rendered prompts
pub trait PromptTemplates: Send + Sync {
    fn render(&self, name: &str, vars: &HashMap<String, String>, model: &str) -> Result<String>;
}

/// Tera-backed template set with built-in overview prompts
#[derive(Debug, Clone)]
pub struct TemplateLibrary {
    tera: Tera,
}

impl TemplateLibrary {
    pub fn empty() -> Self {
        Self {
            tera: Tera::default(),
        }
    }

    /// Library holding only the built-in overview templates
    pub fn builtin() -> Result<Self> {
        let mut library = Self::empty();
        library.add_template(OVERVIEW, &overview_template(None))?;
        for classify in ClassifyType::ALL {
            library.add_template(
                &format!("{}{}", OVERVIEW, classify),
                &overview_template(Some(classify)),
            )?;
        }
        Ok(library)
    }

    /// Built-ins overlaid with every template file under `dir`.
    ///
    /// A file's template name is its path relative to `dir` without the
    /// extension, with `/` separators (`gpt-4.1/Overview.md` →
    /// `gpt-4.1/Overview`).
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut library = Self::builtin()?;
        library.load_dir(dir)?;
        Ok(library)
    }

    pub fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        if !dir.is_dir() {
            return Err(WikiError::Config(format!(
                "Template directory not found: {}",
                dir.display()
            )));
        }

        let mut loaded = 0;
        let walker = ignore::WalkBuilder::new(dir)
            .hidden(true)
            .git_ignore(false)
            .follow_links(false)
            .build();

        for entry in walker.filter_map(|e| e.ok()) {
            let path = entry.path();
            if !path.is_file() || !has_template_extension(path) {
                continue;
            }
            let Some(name) = template_name(dir, path) else {
                continue;
            };
            let source = std::fs::read_to_string(path)?;
            self.add_template(&name, &source)?;
            debug!("Loaded prompt template '{}' from {}", name, path.display());
            loaded += 1;
        }

        Ok(loaded)
    }

    /// Register or replace a template
    pub fn add_template(&mut self, name: &str, source: &str) -> Result<()> {
        let source = normalize_placeholders(source);
        self.tera
            .add_raw_template(name, &source)
            .map_err(|e| WikiError::template(name, describe(&e)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }

    fn resolve_name(&self, name: &str, model: &str) -> Option<String> {
        let scoped = format!("{}/{}", model, name);
        if !model.is_empty() && self.contains(&scoped) {
            return Some(scoped);
        }
        self.contains(name).then(|| name.to_string())
    }
}

impl PromptTemplates for TemplateLibrary {
    fn render(&self, name: &str, vars: &HashMap<String, String>, model: &str) -> Result<String> {
        let resolved = self
            .resolve_name(name, model)
            .ok_or_else(|| WikiError::template(name, "template not found"))?;

        let mut context = Context::new();
        for (key, value) in vars {
            context.insert(key.as_str(), value);
        }

        self.tera
            .render(&resolved, &context)
            .map_err(|e| WikiError::template(&resolved, describe(&e)))
    }
}

/// Rewrite `{{$name}}` placeholders into Tera's `{{ name }}`
pub fn normalize_placeholders(source: &str) -> String {
    DOLLAR_PLACEHOLDER
        .replace_all(source, "{{ $1 }}")
        .into_owned()
}

fn has_template_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| TEMPLATE_EXTENSIONS.contains(&ext))
}

fn template_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?.with_extension("");
    let parts: Vec<&str> = relative
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

/// Tera hides the useful detail in the source chain
fn describe(err: &tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

fn overview_template(classify: Option<ClassifyType>) -> String {
    let focus = match classify {
        Some(c) => format!(
            "\nThe repository has been classified as {}. Shape the overview for {}.\n",
            c.as_str(),
            c.description()
        ),
        None => String::new(),
    };

    format!(
        r#"You are writing the overview page of a documentation site for a code repository.
{focus}
Repository: {{{{ git_repository }}}}
Branch: {{{{ branch }}}}

<catalogue>
{{{{ catalogue }}}}
</catalogue>

<readme>
{{{{ readme }}}}
</readme>

Use the available file tools to read source files whenever the catalogue and README
are not enough. Describe the project's purpose, architecture, main components and
how to get started. Reference files by their path in the repository.

Write the final document in Markdown and wrap it in <blog></blog> tags."#
    )
}
