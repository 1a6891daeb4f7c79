//! LLM Provider Abstraction
//!
//! A [`ChatClient`] couples one streaming backend with the tools registered for
//! it. Backends speak a single provider protocol and emit [`StreamEvent`]s;
//! the client runs the tool-calling loop on top and hands callers a plain
//! stream of text fragments.
//!
//! ## Modules
//!
//! - `transport`: shared HTTP policy (redirects, admission limit, timeout)
//! - `openai`: OpenAI and Azure OpenAI chat completions
//! - `anthropic`: Anthropic messages API
//! - `bedrock`: Amazon Bedrock converse stream

mod anthropic;
mod bedrock;
mod openai;
mod transport;

pub use anthropic::AnthropicBackend;
pub use bedrock::BedrockBackend;
pub use openai::{OpenAiBackend, OpenAiFlavor};
pub use transport::{AdmittedResponse, HttpTransport};

pub use crate::types::{ErrorCategory, ErrorClassifier, LlmError};

use async_stream::try_stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::settings::ExecutionSettings;
use crate::config::{ProviderConfiguration, ProviderKind};
use crate::constants::generation::MAX_TOOL_ROUNDS;
use crate::tools::{DependencyTool, FileTool, ToolRegistry, ToolSpec, load_prompt_tools};
use crate::types::Result;

// =============================================================================
// Conversation Types
// =============================================================================

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON argument object as sent by the model
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatMessage {
    User(String),
    Assistant {
        text: String,
        tool_calls: Vec<ToolCall>,
    },
    ToolResult {
        call_id: String,
        name: String,
        content: String,
    },
}

/// Event emitted by a backend while streaming one turn
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Text(String),
    ToolCall(ToolCall),
}

pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Ordered text fragments of one completion; consumed once
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Everything a backend needs for one streamed request
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub settings: ExecutionSettings,
    /// Empty when tools are not advertised
    pub tools: Vec<ToolSpec>,
}

// =============================================================================
// Backend Trait
// =============================================================================

/// One provider protocol
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &str;

    /// Start streaming a single turn. Errors before the first event are returned
    /// directly; later ones arrive through the stream.
    async fn stream_turn(&self, turn: ChatTurn) -> Result<EventStream>;
}

pub type SharedBackend = Arc<dyn ChatBackend>;

// =============================================================================
// Chat Client
// =============================================================================

/// Provider-bound chat client with its registered tools
#[derive(Clone)]
pub struct ChatClient {
    kind: ProviderKind,
    model: String,
    backend: SharedBackend,
    tools: Arc<ToolRegistry>,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("backend", &self.backend.name())
            .field("tools", &self.tools)
            .finish()
    }
}

impl ChatClient {
    pub fn new(
        kind: ProviderKind,
        model: impl Into<String>,
        backend: SharedBackend,
        tools: ToolRegistry,
    ) -> Self {
        Self {
            kind,
            model: model.into(),
            backend,
            tools: Arc::new(tools),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Stream a completion for `messages`.
    ///
    /// With [`ToolCallBehavior::AutoInvoke`](super::settings::ToolCallBehavior)
    /// and at least one registered tool, requested tool calls are executed and
    /// the conversation is re-streamed until the model answers without calls.
    /// Text from every round is yielded in arrival order.
    pub fn stream_chat(
        &self,
        messages: Vec<ChatMessage>,
        settings: ExecutionSettings,
    ) -> FragmentStream {
        Box::pin(tool_loop(
            self.backend.clone(),
            self.tools.clone(),
            self.model.clone(),
            messages,
            settings,
        ))
    }
}

fn tool_loop(
    backend: SharedBackend,
    tools: Arc<ToolRegistry>,
    model: String,
    mut messages: Vec<ChatMessage>,
    settings: ExecutionSettings,
) -> impl Stream<Item = Result<String>> + Send {
    try_stream! {
        let advertise = settings.auto_invoke_tools() && !tools.is_empty();
        let specs = if advertise { tools.specs() } else { Vec::new() };
        let mut round = 0usize;

        loop {
            let turn = ChatTurn {
                model: model.clone(),
                messages: messages.clone(),
                settings: settings.clone(),
                tools: specs.clone(),
            };
            let mut events = backend.stream_turn(turn).await?;

            let mut text = String::new();
            let mut calls = Vec::new();
            while let Some(event) = events.next().await {
                match event? {
                    StreamEvent::Text(fragment) => {
                        text.push_str(&fragment);
                        yield fragment;
                    }
                    StreamEvent::ToolCall(call) => calls.push(call),
                }
            }
            // Release the response and its admission permit before tools run
            drop(events);

            if calls.is_empty() || !advertise {
                break;
            }

            round += 1;
            if round > MAX_TOOL_ROUNDS {
                warn!(
                    "Stopping after {} tool rounds with {} call(s) still pending",
                    MAX_TOOL_ROUNDS,
                    calls.len()
                );
                break;
            }

            debug!("Tool round {}: {} call(s)", round, calls.len());
            messages.push(ChatMessage::Assistant {
                text,
                tool_calls: calls.clone(),
            });
            for call in calls {
                let content = tools.invoke(&call.name, &call.arguments).await;
                messages.push(ChatMessage::ToolResult {
                    call_id: call.id,
                    name: call.name,
                    content,
                });
            }
        }
    }
}

/// Drain a fragment stream into one string, skipping empty fragments
pub async fn collect_fragments(mut stream: FragmentStream) -> Result<String> {
    let mut buffer = String::new();
    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;
        if !fragment.is_empty() {
            buffer.push_str(&fragment);
        }
    }
    Ok(buffer)
}

// =============================================================================
// Client Factory
// =============================================================================

/// Builds provider-bound clients from the process configuration
#[derive(Debug, Clone)]
pub struct ClientFactory {
    config: Arc<ProviderConfiguration>,
}

impl ClientFactory {
    pub fn new(config: Arc<ProviderConfiguration>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProviderConfiguration {
        &self.config
    }

    /// Create a client for the configured provider.
    ///
    /// Tools registered, in order: the prompt code-analysis bundle (when
    /// `enable_code_analysis`), file access (always), dependency analysis
    /// (when enabled in configuration).
    pub fn create(
        &self,
        endpoint: &str,
        api_key: &str,
        working_dir: &Path,
        model: &str,
        enable_code_analysis: bool,
    ) -> Result<ChatClient> {
        let kind = self.config.provider;
        let backend = self.backend(kind, endpoint, api_key)?;

        let mut tools = ToolRegistry::new();
        if enable_code_analysis {
            tools.extend(load_prompt_tools(
                &self.config.plugin_dir(),
                backend.clone(),
                kind,
                model,
            )?);
        }
        tools.register(Arc::new(FileTool::new(
            working_dir,
            self.config.max_file_limit,
        )));
        if self.config.enable_code_dependency_analysis {
            tools.register(Arc::new(DependencyTool::new(working_dir)));
        }

        info!(
            provider = %kind,
            model = %model,
            tools = tools.len(),
            "Chat client created"
        );

        Ok(ChatClient::new(kind, model, backend, tools))
    }

    fn backend(&self, kind: ProviderKind, endpoint: &str, api_key: &str) -> Result<SharedBackend> {
        Ok(match kind {
            ProviderKind::OpenAi => Arc::new(OpenAiBackend::new(
                OpenAiFlavor::OpenAi,
                endpoint,
                api_key,
                HttpTransport::new()?,
            )?),
            ProviderKind::AzureOpenAi => Arc::new(OpenAiBackend::new(
                OpenAiFlavor::Azure,
                endpoint,
                api_key,
                HttpTransport::new()?,
            )?),
            ProviderKind::Anthropic => Arc::new(AnthropicBackend::new(
                endpoint,
                api_key,
                HttpTransport::new()?,
            )?),
            ProviderKind::AmazonBedrock => {
                Arc::new(BedrockBackend::new(self.config.aws_region.clone()))
            }
        })
    }
}

/// Create a client for `config.provider`; see [`ClientFactory::create`]
pub fn create_client(
    config: Arc<ProviderConfiguration>,
    endpoint: &str,
    api_key: &str,
    working_dir: &Path,
    model: &str,
    enable_code_analysis: bool,
) -> Result<ChatClient> {
    ClientFactory::new(config).create(endpoint, api_key, working_dir, model, enable_code_analysis)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory backend shared by client and orchestrator tests

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays one scripted list of events per turn and records every turn
    pub struct ScriptedBackend {
        turns: Mutex<VecDeque<Vec<Result<StreamEvent>>>>,
        pub seen: Mutex<Vec<ChatTurn>>,
    }

    impl ScriptedBackend {
        pub fn new(turns: Vec<Vec<Result<StreamEvent>>>) -> Arc<Self> {
            Arc::new(Self {
                turns: Mutex::new(turns.into()),
                seen: Mutex::new(Vec::new()),
            })
        }

        pub fn text(fragments: &[&str]) -> Arc<Self> {
            Self::new(vec![
                fragments
                    .iter()
                    .map(|f| Ok(StreamEvent::Text(f.to_string())))
                    .collect(),
            ])
        }

        pub fn seen_turns(&self) -> Vec<ChatTurn> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn stream_turn(&self, turn: ChatTurn) -> Result<EventStream> {
            self.seen.lock().unwrap().push(turn);
            let events = self.turns.lock().unwrap().pop_front().unwrap_or_default();
            Ok(Box::pin(futures::stream::iter(events)))
        }
    }

    pub fn tool_call(id: &str, name: &str, arguments: &str) -> Result<StreamEvent> {
        Ok(StreamEvent::ToolCall(ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }))
    }
}
