//! OpenAI / Azure OpenAI Chat Completions
//!
//! Streams `chat/completions` over server-sent events. Tool calls arrive as
//! indexed deltas spread over many chunks and are assembled before being
//! emitted at the end of the turn.

use async_stream::try_stream;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, info};
use url::Url;

use super::{
    AdmittedResponse, ChatBackend, ChatMessage, ChatTurn, EventStream, HttpTransport, StreamEvent,
    ToolCall,
};
use crate::constants::api::AZURE_API_VERSION;
use crate::tools::ToolSpec;
use crate::types::{ErrorCategory, ErrorClassifier, LlmError, Result, WikiError};

/// Which dialect of the chat completions API to speak
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAiFlavor {
    /// `{endpoint}/chat/completions`, bearer auth
    OpenAi,
    /// `{endpoint}/openai/deployments/{model}/chat/completions`, `api-key` header
    Azure,
}

impl OpenAiFlavor {
    fn name(&self) -> &'static str {
        match self {
            OpenAiFlavor::OpenAi => "openai",
            OpenAiFlavor::Azure => "azure-openai",
        }
    }
}

pub struct OpenAiBackend {
    flavor: OpenAiFlavor,
    endpoint: String,
    api_key: SecretString,
    transport: HttpTransport,
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("flavor", &self.flavor)
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl OpenAiBackend {
    pub fn new(
        flavor: OpenAiFlavor,
        endpoint: &str,
        api_key: &str,
        transport: HttpTransport,
    ) -> Result<Self> {
        Url::parse(endpoint).map_err(|e| {
            WikiError::Config(format!("Invalid endpoint '{}': {}", endpoint, e))
        })?;

        Ok(Self {
            flavor,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: SecretString::from(api_key.to_string()),
            transport,
        })
    }

    fn url(&self, model: &str) -> String {
        match self.flavor {
            OpenAiFlavor::OpenAi => format!("{}/chat/completions", self.endpoint),
            OpenAiFlavor::Azure => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                self.endpoint, model, AZURE_API_VERSION
            ),
        }
    }

    fn request(&self, turn: &ChatTurn) -> reqwest::RequestBuilder {
        let builder = self
            .transport
            .client()
            .post(self.url(&turn.model))
            .json(&build_request(turn));

        match self.flavor {
            OpenAiFlavor::OpenAi => builder.bearer_auth(self.api_key.expose_secret()),
            OpenAiFlavor::Azure => builder.header("api-key", self.api_key.expose_secret()),
        }
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    fn name(&self) -> &str {
        self.flavor.name()
    }

    async fn stream_turn(&self, turn: ChatTurn) -> Result<EventStream> {
        info!(
            "Streaming with {} (model: {}, tools: {})",
            self.flavor.name(),
            turn.model,
            turn.tools.len()
        );

        let AdmittedResponse { response, permit } = self
            .transport
            .send(self.request(&turn), self.flavor.name())
            .await?;

        Ok(Box::pin(sse_events(response, permit, self.flavor.name())))
    }
}

fn sse_events(
    response: reqwest::Response,
    permit: OwnedSemaphorePermit,
    provider: &'static str,
) -> impl Stream<Item = Result<StreamEvent>> + Send {
    try_stream! {
        let _permit = permit;
        let mut events = Box::pin(response.bytes_stream().eventsource());
        let mut calls = ToolCallAccumulator::default();

        while let Some(event) = events.next().await {
            let event = event.map_err(|e| {
                WikiError::Llm(ErrorClassifier::classify(&format!("stream error: {}", e), provider))
            })?;
            let data = event.data.trim();
            if data == "[DONE]" {
                break;
            }
            if data.is_empty() {
                continue;
            }
            for item in parse_chunk(data, &mut calls, provider)? {
                yield item;
            }
        }

        for call in calls.finish() {
            debug!("{} requested tool '{}'", provider, call.name);
            yield StreamEvent::ToolCall(call);
        }
    }
}

// =============================================================================
// Request Types
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: Value,
}

fn build_request(turn: &ChatTurn) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: turn.model.clone(),
        messages: turn.messages.iter().map(wire_message).collect(),
        stream: true,
        temperature: turn.settings.temperature(),
        max_tokens: turn.settings.max_tokens(),
        tools: turn.tools.iter().map(wire_tool).collect(),
    }
}

fn wire_message(message: &ChatMessage) -> WireMessage {
    match message {
        ChatMessage::User(text) => WireMessage {
            role: "user",
            content: Some(text.clone()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        },
        ChatMessage::Assistant { text, tool_calls } => WireMessage {
            role: "assistant",
            content: (!text.is_empty() || tool_calls.is_empty()).then(|| text.clone()),
            tool_calls: tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: call.id.clone(),
                    kind: "function",
                    function: WireFunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                })
                .collect(),
            tool_call_id: None,
        },
        ChatMessage::ToolResult {
            call_id, content, ..
        } => WireMessage {
            role: "tool",
            content: Some(content.clone()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.clone()),
        },
    }
}

fn wire_tool(spec: &ToolSpec) -> WireTool {
    WireTool {
        kind: "function",
        function: WireFunction {
            name: spec.name.clone(),
            description: spec.description.clone(),
            parameters: spec.parameters.clone(),
        },
    }
}

// =============================================================================
// Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct ChunkResponse {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
    // Some compatible servers send an explicit null
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

/// Assembles streamed tool-call fragments keyed by their index
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    calls: BTreeMap<usize, ToolCall>,
}

impl ToolCallAccumulator {
    fn apply(&mut self, delta: ToolCallDelta) {
        let call = self.calls.entry(delta.index).or_insert_with(|| ToolCall {
            id: String::new(),
            name: String::new(),
            arguments: String::new(),
        });
        if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
            call.id = id;
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name {
                call.name.push_str(&name);
            }
            if let Some(arguments) = function.arguments {
                call.arguments.push_str(&arguments);
            }
        }
    }

    fn finish(self) -> Vec<ToolCall> {
        self.calls
            .into_iter()
            .filter(|(_, call)| !call.name.is_empty())
            .map(|(index, mut call)| {
                if call.id.is_empty() {
                    call.id = format!("call_{}", index);
                }
                call
            })
            .collect()
    }
}

/// Text events of one SSE chunk; tool-call deltas go into `calls`
fn parse_chunk(
    data: &str,
    calls: &mut ToolCallAccumulator,
    provider: &str,
) -> Result<Vec<StreamEvent>> {
    let chunk: ChunkResponse = serde_json::from_str(data).map_err(|e| {
        WikiError::Llm(LlmError::with_provider(
            ErrorCategory::ParseError,
            format!("Failed to parse stream chunk: {}", e),
            provider,
        ))
    })?;

    if let Some(error) = chunk.error {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(WikiError::LlmApi(format!("Stream error: {}", message)));
    }

    let mut events = Vec::new();
    for choice in chunk.choices {
        let Some(delta) = choice.delta else {
            continue;
        };
        if let Some(text) = delta.content.filter(|t| !t.is_empty()) {
            events.push(StreamEvent::Text(text));
        }
        for tool_delta in delta.tool_calls.unwrap_or_default() {
            calls.apply(tool_delta);
        }
    }
    Ok(events)
}
