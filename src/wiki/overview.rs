//! Repository Overview Generation
//!
//! Renders the overview prompt for a repository, streams the completion from a
//! [`ChatClient`] and extracts the final document from the accumulated text.
//!
//! ## Extraction
//!
//! ```text
//! <blog>...</blog>          first match wins
//! ```markdown ... ```       only when no <blog> block exists
//! raw buffer                otherwise
//! ```

use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};

use crate::ai::prompt::{OVERVIEW, PromptTemplates};
use crate::ai::provider::{ChatClient, ChatMessage, collect_fragments};
use crate::ai::settings::ExecutionSettings;
use crate::config::ProviderConfiguration;
use crate::types::{ClassifyType, Result};

static BLOG_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<blog>(.*?)</blog>").expect("valid blog regex"));

static MARKDOWN_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```markdown(.*?)```").expect("valid fence regex"));

/// Template variable names bound for every overview prompt
pub mod vars {
    pub const CATALOGUE: &str = "catalogue";
    pub const GIT_REPOSITORY: &str = "git_repository";
    pub const BRANCH: &str = "branch";
    pub const README: &str = "readme";
}

/// Inputs describing the repository being documented
#[derive(Debug, Clone, Copy)]
pub struct OverviewRequest<'a> {
    pub catalog: &'a str,
    pub repository_url: &'a str,
    pub branch: &'a str,
    pub readme: &'a str,
    pub classification: Option<ClassifyType>,
}

pub struct OverviewGenerator {
    config: Arc<ProviderConfiguration>,
    templates: Arc<dyn PromptTemplates>,
}

impl std::fmt::Debug for OverviewGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverviewGenerator")
            .field("provider", &self.config.provider)
            .field("chat_model", &self.config.chat_model)
            .finish()
    }
}

impl OverviewGenerator {
    pub fn new(config: Arc<ProviderConfiguration>, templates: Arc<dyn PromptTemplates>) -> Self {
        Self { config, templates }
    }

    /// Generate the overview document.
    ///
    /// There is no retry: template, transport and provider errors are returned
    /// as they occur and nothing partial is produced. Dropping the returned
    /// future stops the underlying stream.
    pub async fn generate(
        &self,
        client: &ChatClient,
        catalog: &str,
        repository_url: &str,
        branch: &str,
        readme: &str,
        classification: Option<ClassifyType>,
    ) -> Result<String> {
        self.generate_for(
            client,
            OverviewRequest {
                catalog,
                repository_url,
                branch,
                readme,
                classification,
            },
        )
        .await
    }

    pub async fn generate_for(
        &self,
        client: &ChatClient,
        request: OverviewRequest<'_>,
    ) -> Result<String> {
        let repository = normalize_repository_url(request.repository_url);
        let template = template_name(request.classification);

        let mut bindings = HashMap::new();
        bindings.insert(vars::CATALOGUE.to_string(), request.catalog.to_string());
        bindings.insert(vars::GIT_REPOSITORY.to_string(), repository.to_string());
        bindings.insert(vars::BRANCH.to_string(), request.branch.to_string());
        bindings.insert(vars::README.to_string(), request.readme.to_string());

        // The client may be bound to a model other than the configured chat model
        let model = client.model();
        if model != self.config.chat_model {
            debug!(
                "Client model {} overrides configured chat model {}",
                model, self.config.chat_model
            );
        }
        let prompt = self.templates.render(&template, &bindings, model)?;
        debug!("Rendered '{}' prompt ({} chars)", template, prompt.len());

        let settings = ExecutionSettings::builder(client.kind(), model)
            .tool_calls(true)
            .build();

        info!(
            model = %model,
            repository = %repository,
            branch = %request.branch,
            template = %template,
            "Generating repository overview"
        );

        let stream = client.stream_chat(vec![ChatMessage::User(prompt)], settings);
        let buffer = collect_fragments(stream).await?;

        let document = extract_document(&buffer);
        info!(
            "Overview generated ({} chars from {} streamed)",
            document.len(),
            buffer.len()
        );
        Ok(document)
    }
}

/// `Overview` or `Overview{Classification}`
pub fn template_name(classification: Option<ClassifyType>) -> String {
    match classification {
        Some(classify) => format!("{}{}", OVERVIEW, classify),
        None => OVERVIEW.to_string(),
    }
}

/// Strip one trailing `.git`
pub fn normalize_repository_url(url: &str) -> &str {
    url.strip_suffix(".git").unwrap_or(url)
}

/// Inner text of the first `<blog>` block
pub fn extract_blog(text: &str) -> Option<&str> {
    BLOG_BLOCK
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Inner text of the first ```` ```markdown ```` fence
pub fn extract_markdown_fence(text: &str) -> Option<&str> {
    MARKDOWN_FENCE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

pub fn extract_document(text: &str) -> String {
    extract_blog(text)
        .or_else(|| extract_markdown_fence(text))
        .unwrap_or(text)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::prompt::TemplateLibrary;
    use crate::ai::provider::testing::ScriptedBackend;
    use crate::ai::provider::{ChatBackend, ChatTurn, EventStream, StreamEvent};
    use crate::config::ProviderKind;
    use crate::tools::ToolRegistry;
    use crate::types::{ErrorCategory, LlmError, WikiError};
    use async_trait::async_trait;
    use std::time::Duration;

    fn config() -> Arc<ProviderConfiguration> {
        let pairs: HashMap<&str, &str> = [
            ("CHAT_MODEL", "gpt-4.1"),
            ("CHAT_API_KEY", "sk-test"),
            ("ENDPOINT", "https://api.openai.com/v1"),
            ("MODEL_PROVIDER", "OpenAI"),
        ]
        .into_iter()
        .collect();
        Arc::new(
            ProviderConfiguration::from_lookup(|k| pairs.get(k).map(|v| v.to_string())).unwrap(),
        )
    }

    fn generator(templates: TemplateLibrary) -> OverviewGenerator {
        OverviewGenerator::new(config(), Arc::new(templates))
    }

    fn client(backend: Arc<dyn ChatBackend>) -> ChatClient {
        ChatClient::new(ProviderKind::OpenAi, "gpt-4.1", backend, ToolRegistry::new())
    }

    fn echo_templates() -> TemplateLibrary {
        let mut templates = TemplateLibrary::empty();
        templates
            .add_template(
                OVERVIEW,
                "{{$git_repository}}|{{$branch}}|{{$readme}}|{{$catalogue}}",
            )
            .unwrap();
        templates
            .add_template("OverviewLibraries", "lib:{{ git_repository }}|{{ branch }}|{{ readme }}")
            .unwrap();
        templates
    }

    fn prompt_of(turn: &ChatTurn) -> &str {
        match &turn.messages[0] {
            ChatMessage::User(text) => text,
            other => panic!("expected user message, got {other:?}"),
        }
    }

    #[test]
    fn test_normalize_repository_url() {
        assert_eq!(
            normalize_repository_url("https://github.com/a/b.git"),
            "https://github.com/a/b"
        );
        assert_eq!(
            normalize_repository_url("https://github.com/a/b"),
            "https://github.com/a/b"
        );
        assert_eq!(normalize_repository_url("x.git.git"), "x.git");
    }

    #[test]
    fn test_template_name() {
        assert_eq!(template_name(None), "Overview");
        assert_eq!(
            template_name(Some(ClassifyType::Frameworks)),
            "OverviewFrameworks"
        );
        assert_eq!(template_name(Some(ClassifyType::CliTools)), "OverviewCLITools");
    }

    #[test]
    fn test_extract_blog_first_match() {
        let text = "intro <blog>\n# One\n</blog> and <blog>Two</blog>";
        assert_eq!(extract_document(text), "\n# One\n");
    }

    #[test]
    fn test_blog_wins_over_fence() {
        let text = "```markdown\nfenced\n```\n<blog>blog</blog>";
        assert_eq!(extract_document(text), "blog");
    }

    #[test]
    fn test_fence_without_blog() {
        let text = "Here you go:\n```markdown\n# Title\nBody\n```\nDone.";
        assert_eq!(extract_document(text), "\n# Title\nBody\n");
    }

    #[test]
    fn test_raw_when_nothing_matches() {
        assert_eq!(extract_document("plain answer"), "plain answer");
        assert_eq!(extract_document("<blog>unterminated"), "<blog>unterminated");
        assert_eq!(extract_document(""), "");
    }

    #[test]
    fn test_extraction_idempotent() {
        for text in [
            "<blog>\n# Doc\n</blog>",
            "```markdown\n# Doc\n```",
            "# Doc without wrappers",
        ] {
            let once = extract_document(text);
            assert_eq!(extract_document(&once), once);
        }
    }

    #[tokio::test]
    async fn test_generate_concatenates_fragments() {
        let backend = ScriptedBackend::text(&["<blog>", "Hello", "", " world", "</blog>"]);
        let output = generator(echo_templates())
            .generate(&client(backend), "cat", "https://x/y.git", "main", "rd", None)
            .await
            .unwrap();
        assert_eq!(output, "Hello world");
    }

    #[tokio::test]
    async fn test_generate_binds_variables() {
        let backend = ScriptedBackend::text(&["raw"]);
        let output = generator(echo_templates())
            .generate(
                &client(backend.clone()),
                "src/\n  lib.rs",
                "https://github.com/acme/widget.git",
                "dev",
                "# Widget",
                None,
            )
            .await
            .unwrap();
        assert_eq!(output, "raw");

        let turns = backend.seen_turns();
        assert_eq!(turns.len(), 1);
        assert_eq!(
            prompt_of(&turns[0]),
            "https://github.com/acme/widget|dev|# Widget|src/\n  lib.rs"
        );
        assert!(turns[0].settings.auto_invoke_tools());
        assert_eq!(turns[0].settings.max_tokens(), Some(32768));
        // No tools registered, so none advertised
        assert!(turns[0].tools.is_empty());
    }

    #[tokio::test]
    async fn test_settings_follow_client_model() {
        let backend = ScriptedBackend::text(&["ok"]);
        let client = ChatClient::new(
            ProviderKind::OpenAi,
            "gpt-3.5-turbo",
            backend.clone(),
            ToolRegistry::new(),
        );
        let mut templates = echo_templates();
        templates
            .add_template("gpt-3.5-turbo/Overview", "short {{ branch }}")
            .unwrap();

        generator(templates)
            .generate(&client, "c", "u", "main", "r", None)
            .await
            .unwrap();

        let turn = &backend.seen_turns()[0];
        assert_eq!(turn.model, "gpt-3.5-turbo");
        assert_eq!(turn.settings.max_tokens(), Some(4096));
        assert_eq!(prompt_of(turn), "short main");
    }

    #[tokio::test]
    async fn test_classified_template_binds_branch_and_readme() {
        let backend = ScriptedBackend::text(&["ok"]);
        generator(echo_templates())
            .generate(
                &client(backend.clone()),
                "cat",
                "https://x/y",
                "release",
                "README",
                Some(ClassifyType::Libraries),
            )
            .await
            .unwrap();
        assert_eq!(prompt_of(&backend.seen_turns()[0]), "lib:https://x/y|release|README");
    }

    #[tokio::test]
    async fn test_builtin_templates_render() {
        let backend = ScriptedBackend::text(&["<blog>doc</blog>"]);
        let output = generator(TemplateLibrary::builtin().unwrap())
            .generate(
                &client(backend.clone()),
                "src/main.rs",
                "https://github.com/acme/tool.git",
                "main",
                "Tool readme",
                Some(ClassifyType::CliTools),
            )
            .await
            .unwrap();
        assert_eq!(output, "doc");
        let prompt = prompt_of(&backend.seen_turns()[0]).to_string();
        assert!(prompt.contains("https://github.com/acme/tool"));
        assert!(!prompt.contains("tool.git"));
        assert!(prompt.contains("Tool readme"));
    }

    #[tokio::test]
    async fn test_missing_template_fails_before_streaming() {
        let backend = ScriptedBackend::text(&["never"]);
        let err = generator(TemplateLibrary::empty())
            .generate(&client(backend.clone()), "c", "u", "b", "r", None)
            .await
            .unwrap_err();
        assert!(matches!(err, WikiError::Template { .. }));
        assert!(backend.seen_turns().is_empty());
    }

    #[tokio::test]
    async fn test_stream_error_propagates() {
        let backend = ScriptedBackend::new(vec![vec![
            Ok(StreamEvent::Text("partial".to_string())),
            Err(WikiError::Llm(LlmError::with_provider(
                ErrorCategory::Network,
                "connection reset",
                "openai",
            ))),
        ]]);
        let err = generator(echo_templates())
            .generate(&client(backend), "c", "u", "b", "r", None)
            .await
            .unwrap_err();
        assert_eq!(err.category(), Some(ErrorCategory::Network));
    }

    /// Emits one fragment then never completes
    struct StalledBackend;

    #[async_trait]
    impl ChatBackend for StalledBackend {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn stream_turn(&self, _turn: ChatTurn) -> Result<EventStream> {
            let first = futures::stream::iter(vec![Ok(StreamEvent::Text("start".to_string()))]);
            Ok(Box::pin(futures::StreamExt::chain(
                first,
                futures::stream::pending(),
            )))
        }
    }

    #[tokio::test]
    async fn test_dropping_generate_cancels() {
        let generator = generator(echo_templates());
        let client = client(Arc::new(StalledBackend));
        let result = tokio::time::timeout(
            Duration::from_millis(50),
            generator.generate(&client, "c", "u", "b", "r", None),
        )
        .await;
        assert!(result.is_err());
    }
}
