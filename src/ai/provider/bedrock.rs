//! Amazon Bedrock Converse Stream
//!
//! The runtime client is bound to the configured region and authenticates
//! through the ambient AWS credential chain. It is built on first use.
//! Requests carry no tool configuration.

use async_stream::try_stream;
use async_trait::async_trait;
use aws_sdk_bedrockruntime::Client;
use aws_sdk_bedrockruntime::config::Region;
use aws_sdk_bedrockruntime::error::DisplayErrorContext;
use aws_sdk_bedrockruntime::operation::converse_stream::ConverseStreamOutput as ConverseStreamResponse;
use aws_sdk_bedrockruntime::types::{
    ContentBlock, ContentBlockDelta, ConversationRole, ConverseStreamOutput,
    InferenceConfiguration, Message,
};
use futures::Stream;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{ChatBackend, ChatMessage, ChatTurn, EventStream, StreamEvent};
use crate::types::{ErrorClassifier, Result, WikiError};

const PROVIDER: &str = "bedrock";

pub struct BedrockBackend {
    region: String,
    client: OnceCell<Client>,
}

impl std::fmt::Debug for BedrockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BedrockBackend")
            .field("region", &self.region)
            .field("initialized", &self.client.initialized())
            .finish()
    }
}

impl BedrockBackend {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            client: OnceCell::new(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    async fn client(&self) -> &Client {
        self.client
            .get_or_init(|| async {
                debug!("Initializing Bedrock runtime client for {}", self.region);
                let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
                    .region(Region::new(self.region.clone()))
                    .load()
                    .await;
                Client::new(&sdk_config)
            })
            .await
    }
}

#[async_trait]
impl ChatBackend for BedrockBackend {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn stream_turn(&self, turn: ChatTurn) -> Result<EventStream> {
        info!(
            "Streaming with Bedrock (model: {}, region: {})",
            turn.model, self.region
        );

        let messages = to_messages(&turn.messages)?;
        let output = self
            .client()
            .await
            .converse_stream()
            .model_id(turn.model.clone())
            .set_messages(Some(messages))
            .inference_config(inference_config(&turn))
            .send()
            .await
            .map_err(|e| {
                WikiError::Llm(ErrorClassifier::classify(
                    &format!("Bedrock request failed: {}", DisplayErrorContext(&e)),
                    PROVIDER,
                ))
            })?;

        Ok(Box::pin(text_events(output)))
    }
}

fn text_events(output: ConverseStreamResponse) -> impl Stream<Item = Result<StreamEvent>> + Send {
    try_stream! {
        let mut receiver = output.stream;
        while let Some(event) = receiver.recv().await.map_err(|e| {
            WikiError::Llm(ErrorClassifier::classify(
                &format!("Bedrock stream error: {}", DisplayErrorContext(&e)),
                PROVIDER,
            ))
        })? {
            if let Some(text) = text_delta(event) {
                yield StreamEvent::Text(text);
            }
        }
    }
}

fn inference_config(turn: &ChatTurn) -> InferenceConfiguration {
    InferenceConfiguration::builder()
        .set_max_tokens(
            turn.settings
                .max_tokens()
                .map(|t| i32::try_from(t).unwrap_or(i32::MAX)),
        )
        .temperature(turn.settings.temperature())
        .build()
}

/// Text of a content delta; every other event is ignored
fn text_delta(event: ConverseStreamOutput) -> Option<String> {
    match event {
        ConverseStreamOutput::ContentBlockDelta(delta) => match delta.delta {
            Some(ContentBlockDelta::Text(text)) if !text.is_empty() => Some(text),
            _ => None,
        },
        _ => None,
    }
}

fn to_messages(messages: &[ChatMessage]) -> Result<Vec<Message>> {
    messages
        .iter()
        .map(|message| {
            let (role, text) = match message {
                ChatMessage::User(text) => (ConversationRole::User, text.clone()),
                ChatMessage::Assistant { text, .. } => (ConversationRole::Assistant, text.clone()),
                ChatMessage::ToolResult { name, content, .. } => (
                    ConversationRole::User,
                    format!("Result of {}:\n{}", name, content),
                ),
            };
            Message::builder()
                .role(role)
                .content(ContentBlock::Text(text))
                .build()
                .map_err(|e| WikiError::LlmApi(format!("Failed to build Bedrock message: {}", e)))
        })
        .collect()
}
