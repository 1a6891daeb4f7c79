//! Anthropic Messages API
//!
//! The messages API requires `max_tokens`, so models without a known cap get
//! the fallback. Tool calls arrive as `tool_use` content blocks whose input is
//! streamed as partial JSON.

use async_stream::try_stream;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, info};
use url::Url;

use super::{
    AdmittedResponse, ChatBackend, ChatMessage, ChatTurn, EventStream, HttpTransport, StreamEvent,
    ToolCall,
};
use crate::constants::{api::ANTHROPIC_VERSION, generation::FALLBACK_MAX_TOKENS};
use crate::types::{ErrorCategory, ErrorClassifier, LlmError, Result, WikiError};

const PROVIDER: &str = "anthropic";

pub struct AnthropicBackend {
    endpoint: String,
    api_key: SecretString,
    transport: HttpTransport,
}

impl std::fmt::Debug for AnthropicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicBackend")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl AnthropicBackend {
    pub fn new(endpoint: &str, api_key: &str, transport: HttpTransport) -> Result<Self> {
        Url::parse(endpoint).map_err(|e| {
            WikiError::Config(format!("Invalid endpoint '{}': {}", endpoint, e))
        })?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: SecretString::from(api_key.to_string()),
            transport,
        })
    }

    fn url(&self) -> String {
        if self.endpoint.ends_with("/v1") {
            format!("{}/messages", self.endpoint)
        } else {
            format!("{}/v1/messages", self.endpoint)
        }
    }
}

#[async_trait]
impl ChatBackend for AnthropicBackend {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn stream_turn(&self, turn: ChatTurn) -> Result<EventStream> {
        info!(
            "Streaming with Anthropic (model: {}, tools: {})",
            turn.model,
            turn.tools.len()
        );

        let request = self
            .transport
            .client()
            .post(self.url())
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&build_request(&turn));

        let AdmittedResponse { response, permit } = self.transport.send(request, PROVIDER).await?;
        Ok(Box::pin(sse_events(response, permit)))
    }
}

fn sse_events(
    response: reqwest::Response,
    permit: OwnedSemaphorePermit,
) -> impl Stream<Item = Result<StreamEvent>> + Send {
    try_stream! {
        let _permit = permit;
        let mut events = Box::pin(response.bytes_stream().eventsource());
        let mut state = StreamState::default();

        while let Some(event) = events.next().await {
            let event = event.map_err(|e| {
                WikiError::Llm(ErrorClassifier::classify(&format!("stream error: {}", e), PROVIDER))
            })?;
            if event.data.trim().is_empty() {
                continue;
            }
            for item in state.apply(&event.data)? {
                yield item;
            }
            if state.finished {
                break;
            }
        }
    }
}

// =============================================================================
// Request Types
// =============================================================================

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Value,
}

#[derive(Debug, Serialize)]
struct WireTool {
    name: String,
    description: String,
    input_schema: Value,
}

fn build_request(turn: &ChatTurn) -> MessagesRequest {
    MessagesRequest {
        model: turn.model.clone(),
        max_tokens: turn.settings.max_tokens().unwrap_or(FALLBACK_MAX_TOKENS),
        temperature: turn.settings.temperature(),
        stream: true,
        messages: wire_messages(&turn.messages),
        tools: turn
            .tools
            .iter()
            .map(|spec| WireTool {
                name: spec.name.clone(),
                description: spec.description.clone(),
                input_schema: spec.parameters.clone(),
            })
            .collect(),
    }
}

/// Consecutive tool results share one user message
fn wire_messages(messages: &[ChatMessage]) -> Vec<WireMessage> {
    let mut wire: Vec<WireMessage> = Vec::new();
    let mut pending_results: Vec<Value> = Vec::new();

    let flush = |wire: &mut Vec<WireMessage>, pending: &mut Vec<Value>| {
        if !pending.is_empty() {
            wire.push(WireMessage {
                role: "user",
                content: Value::Array(std::mem::take(pending)),
            });
        }
    };

    for message in messages {
        match message {
            ChatMessage::ToolResult {
                call_id, content, ..
            } => pending_results.push(json!({
                "type": "tool_result",
                "tool_use_id": call_id,
                "content": content,
            })),
            ChatMessage::User(text) => {
                flush(&mut wire, &mut pending_results);
                wire.push(WireMessage {
                    role: "user",
                    content: Value::String(text.clone()),
                });
            }
            ChatMessage::Assistant { text, tool_calls } => {
                flush(&mut wire, &mut pending_results);
                let mut blocks = Vec::new();
                if !text.is_empty() {
                    blocks.push(json!({"type": "text", "text": text}));
                }
                for call in tool_calls {
                    let input: Value = serde_json::from_str(&call.arguments)
                        .unwrap_or_else(|_| Value::Object(Default::default()));
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": input,
                    }));
                }
                wire.push(WireMessage {
                    role: "assistant",
                    content: Value::Array(blocks),
                });
            }
        }
    }
    flush(&mut wire, &mut pending_results);
    wire
}

// =============================================================================
// Stream Events
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicEvent {
    ContentBlockStart {
        index: usize,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageStop,
    Error {
        error: ApiError,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "type", default)]
    kind: String,
    message: String,
}

/// Open `tool_use` blocks by content index
#[derive(Debug, Default)]
struct StreamState {
    tool_blocks: HashMap<usize, ToolCall>,
    finished: bool,
}

impl StreamState {
    fn apply(&mut self, data: &str) -> Result<Vec<StreamEvent>> {
        let event: AnthropicEvent = serde_json::from_str(data)
            .map_err(|e| {
                WikiError::Llm(LlmError::with_provider(
                    ErrorCategory::ParseError,
                    format!("Failed to parse stream event: {}", e),
                    PROVIDER,
                ))
            })?;

        let mut out = Vec::new();
        match event {
            AnthropicEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                ContentBlock::Text { text } if !text.is_empty() => out.push(StreamEvent::Text(text)),
                ContentBlock::ToolUse { id, name } => {
                    self.tool_blocks.insert(
                        index,
                        ToolCall {
                            id,
                            name,
                            arguments: String::new(),
                        },
                    );
                }
                _ => {}
            },
            AnthropicEvent::ContentBlockDelta { index, delta } => match delta {
                BlockDelta::TextDelta { text } if !text.is_empty() => {
                    out.push(StreamEvent::Text(text))
                }
                BlockDelta::InputJsonDelta { partial_json } => {
                    if let Some(call) = self.tool_blocks.get_mut(&index) {
                        call.arguments.push_str(&partial_json);
                    }
                }
                _ => {}
            },
            AnthropicEvent::ContentBlockStop { index } => {
                if let Some(mut call) = self.tool_blocks.remove(&index) {
                    if call.arguments.trim().is_empty() {
                        call.arguments = "{}".to_string();
                    }
                    debug!("Anthropic requested tool '{}'", call.name);
                    out.push(StreamEvent::ToolCall(call));
                }
            }
            AnthropicEvent::MessageStop => self.finished = true,
            AnthropicEvent::Error { error } => {
                return Err(WikiError::Llm(ErrorClassifier::classify(
                    &format!("{}: {}", error.kind, error.message),
                    PROVIDER,
                )));
            }
            AnthropicEvent::Other => {}
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::settings::ExecutionSettings;
    use crate::config::ProviderKind;
    use crate::tools::ToolSpec;
    use crate::types::ErrorCategory;

    fn turn(model: &str) -> ChatTurn {
        ChatTurn {
            model: model.to_string(),
            messages: vec![
                ChatMessage::User("hi".to_string()),
                ChatMessage::Assistant {
                    text: "Checking.".to_string(),
                    tool_calls: vec![
                        ToolCall {
                            id: "toolu_1".to_string(),
                            name: "ReadFiles".to_string(),
                            arguments: r#"{"paths":["a"]}"#.to_string(),
                        },
                        ToolCall {
                            id: "toolu_2".to_string(),
                            name: "ReadFiles".to_string(),
                            arguments: r#"{"paths":["b"]}"#.to_string(),
                        },
                    ],
                },
                ChatMessage::ToolResult {
                    call_id: "toolu_1".to_string(),
                    name: "ReadFiles".to_string(),
                    content: "A".to_string(),
                },
                ChatMessage::ToolResult {
                    call_id: "toolu_2".to_string(),
                    name: "ReadFiles".to_string(),
                    content: "B".to_string(),
                },
            ],
            settings: ExecutionSettings::builder(ProviderKind::Anthropic, model)
                .tool_calls(true)
                .build(),
            tools: vec![ToolSpec {
                name: "ReadFiles".to_string(),
                description: "Read files".to_string(),
                parameters: json!({"type": "object"}),
            }],
        }
    }

    #[tokio::test]
    async fn test_url_uses_endpoint() {
        let backend =
            AnthropicBackend::new("https://api.anthropic.example", "k", HttpTransport::new().unwrap())
                .unwrap();
        assert_eq!(backend.url(), "https://api.anthropic.example/v1/messages");

        let backend = AnthropicBackend::new(
            "https://proxy.example/anthropic/v1/",
            "k",
            HttpTransport::new().unwrap(),
        )
        .unwrap();
        assert_eq!(backend.url(), "https://proxy.example/anthropic/v1/messages");
    }

    #[test]
    fn test_request_body() {
        let body = serde_json::to_value(build_request(&turn("claude-3-haiku-20240307"))).unwrap();
        assert_eq!(body["max_tokens"], 4096);
        assert_eq!(body["stream"], true);
        assert_eq!(body["tools"][0]["input_schema"]["type"], "object");

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["content"][0]["type"], "text");
        assert_eq!(messages[1]["content"][1]["input"]["paths"][0], "a");
        // Both tool results merged into one user message
        assert_eq!(messages[2]["role"], "user");
        assert_eq!(messages[2]["content"].as_array().unwrap().len(), 2);
        assert_eq!(messages[2]["content"][1]["tool_use_id"], "toolu_2");
    }

    #[test]
    fn test_unknown_model_gets_fallback_cap() {
        let body = serde_json::to_value(build_request(&turn("claude-next"))).unwrap();
        assert_eq!(body["max_tokens"], 4096);

        let body = serde_json::to_value(build_request(&turn("claude-sonnet-4-20250514"))).unwrap();
        assert_eq!(body["max_tokens"], 63999);
    }

    #[test]
    fn test_stream_text_and_tool_use() {
        let mut state = StreamState::default();
        let mut events = Vec::new();
        for data in [
            r#"{"type":"message_start","message":{"id":"msg_1"}}"#,
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Let me read."}}"#,
            r#"{"type":"content_block_stop","index":0}"#,
            r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_9","name":"ReadFiles","input":{}}}"#,
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"paths\":"}}"#,
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"[\"a\"]}"}}"#,
            r#"{"type":"content_block_stop","index":1}"#,
            r#"{"type":"ping"}"#,
            r#"{"type":"message_stop"}"#,
        ] {
            events.extend(state.apply(data).unwrap());
        }

        assert_eq!(
            events,
            vec![
                StreamEvent::Text("Let me read.".to_string()),
                StreamEvent::ToolCall(ToolCall {
                    id: "toolu_9".to_string(),
                    name: "ReadFiles".to_string(),
                    arguments: r#"{"paths":["a"]}"#.to_string(),
                }),
            ]
        );
        assert!(state.finished);
    }

    #[test]
    fn test_tool_use_without_input() {
        let mut state = StreamState::default();
        state
            .apply(r#"{"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"t","name":"AnalyzeDependencies"}}"#)
            .unwrap();
        let events = state.apply(r#"{"type":"content_block_stop","index":0}"#).unwrap();
        match &events[0] {
            StreamEvent::ToolCall(call) => assert_eq!(call.arguments, "{}"),
            other => panic!("expected tool call, got {other:?}"),
        }
    }

    #[test]
    fn test_error_event() {
        let mut state = StreamState::default();
        let err = state
            .apply(r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#)
            .unwrap_err();
        assert_eq!(err.category(), Some(ErrorCategory::Transient));
    }

    #[test]
    fn test_malformed_event_is_parse_error() {
        let mut state = StreamState::default();
        let err = state.apply("{\"type\":").unwrap_err();
        assert_eq!(err.category(), Some(ErrorCategory::ParseError));
        assert!(err.to_string().contains("anthropic"));
    }
}
