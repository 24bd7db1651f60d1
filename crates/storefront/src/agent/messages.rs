//! Conversation history as supplied by the chat widget.
//!
//! The caller sends the whole conversation on every request. This module
//! parses it, enforces the history limits, and converts it into Claude's
//! message format.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use stephans_core::ChatRole;

use crate::claude::{ContentBlock, Message, MessageContent, Role};
use crate::config::AgentConfig;
use crate::error::DispatchError;

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequestBody {
    pub messages: Vec<ConversationMessage>,
}

impl ChatRequestBody {
    /// Parse a raw request body.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::InvalidRequest` if the body is not valid JSON
    /// of the expected shape.
    pub fn parse(body: &[u8]) -> Result<Self, DispatchError> {
        serde_json::from_slice(body)
            .map_err(|e| DispatchError::InvalidRequest(format!("malformed body: {e}")))
    }
}

/// One message of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: ChatRole,
    /// Accepts `parts` as well, the field name newer chat clients use.
    #[serde(alias = "parts")]
    pub content: ConversationContent,
}

impl ConversationMessage {
    /// A plain-text message.
    #[must_use]
    pub fn text(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            role,
            content: ConversationContent::Text(text.into()),
        }
    }
}

/// Message content: a bare string or a list of parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConversationContent {
    Text(String),
    Parts(Vec<ConversationPart>),
}

/// A structured piece of message content.
///
/// Besides explicit `tool-call` and `tool-result` parts, the AI SDK's
/// `UIMessage` tool parts are understood: `tool-<toolName>` and
/// `dynamic-tool` carry a call and, once it finished, its outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationPart {
    Text {
        text: String,
    },
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        input: Value,
    },
    ToolResult {
        tool_call_id: String,
        output: Value,
        is_error: bool,
    },
    Tool {
        tool_call_id: String,
        tool_name: String,
        state: ToolPartState,
        input: Value,
        output: Value,
        error_text: Option<String>,
    },
    /// Client-only parts (step markers, reasoning, files) are ignored.
    Other,
}

/// Progress of a `UIMessage` tool part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolPartState {
    InputStreaming,
    InputAvailable,
    OutputAvailable,
    OutputError,
    /// Approval and other states without an outcome.
    #[serde(other)]
    Pending,
}

const TOOL_PART_PREFIX: &str = "tool-";

/// Wire shape shared by every part type.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    state: Option<ToolPartState>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    input: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_text: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    is_error: bool,
}

impl RawPart {
    fn empty(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            text: None,
            tool_call_id: None,
            tool_name: None,
            state: None,
            input: Value::Null,
            output: Value::Null,
            error_text: None,
            is_error: false,
        }
    }

    fn require(field: Option<String>, kind: &str, name: &str) -> Result<String, String> {
        field.ok_or_else(|| format!("{kind} part is missing `{name}`"))
    }
}

impl TryFrom<RawPart> for ConversationPart {
    type Error = String;

    fn try_from(raw: RawPart) -> Result<Self, Self::Error> {
        let kind = raw.kind.as_str();
        match kind {
            "text" => Ok(Self::Text {
                text: RawPart::require(raw.text, kind, "text")?,
            }),
            "tool-call" => Ok(Self::ToolCall {
                tool_call_id: RawPart::require(raw.tool_call_id, kind, "toolCallId")?,
                tool_name: RawPart::require(raw.tool_name, kind, "toolName")?,
                input: raw.input,
            }),
            "tool-result" => Ok(Self::ToolResult {
                tool_call_id: RawPart::require(raw.tool_call_id, kind, "toolCallId")?,
                output: raw.output,
                is_error: raw.is_error,
            }),
            _ => {
                let tool_name = match kind.strip_prefix(TOOL_PART_PREFIX) {
                    Some(name) if !name.is_empty() => name.to_string(),
                    _ if kind == "dynamic-tool" => {
                        RawPart::require(raw.tool_name, kind, "toolName")?
                    }
                    _ => return Ok(Self::Other),
                };
                Ok(Self::Tool {
                    tool_call_id: RawPart::require(raw.tool_call_id, kind, "toolCallId")?,
                    tool_name,
                    state: raw.state.unwrap_or(ToolPartState::Pending),
                    input: raw.input,
                    output: raw.output,
                    error_text: raw.error_text,
                })
            }
        }
    }
}

impl From<ConversationPart> for RawPart {
    fn from(part: ConversationPart) -> Self {
        match part {
            ConversationPart::Text { text } => Self {
                text: Some(text),
                ..Self::empty("text")
            },
            ConversationPart::ToolCall {
                tool_call_id,
                tool_name,
                input,
            } => Self {
                tool_call_id: Some(tool_call_id),
                tool_name: Some(tool_name),
                input,
                ..Self::empty("tool-call")
            },
            ConversationPart::ToolResult {
                tool_call_id,
                output,
                is_error,
            } => Self {
                tool_call_id: Some(tool_call_id),
                output,
                is_error,
                ..Self::empty("tool-result")
            },
            ConversationPart::Tool {
                tool_call_id,
                tool_name,
                state,
                input,
                output,
                error_text,
            } => Self {
                tool_call_id: Some(tool_call_id),
                state: Some(state),
                input,
                output,
                error_text,
                ..Self::empty(format!("{TOOL_PART_PREFIX}{tool_name}"))
            },
            ConversationPart::Other => Self::empty("other"),
        }
    }
}

impl Serialize for ConversationPart {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        RawPart::from(self.clone()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ConversationPart {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawPart::deserialize(deserializer)?;
        Self::try_from(raw).map_err(serde::de::Error::custom)
    }
}

impl ConversationContent {
    /// Text segments of the content, in order.
    fn texts(&self) -> Vec<&str> {
        match self {
            Self::Text(text) => vec![text.as_str()],
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ConversationPart::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }
}

/// Enforce the history limits.
///
/// # Errors
///
/// Returns `DispatchError::InvalidRequest` if the history is empty, too long,
/// contains an oversize text part, has text under the `tool` role, or does not
/// end with a non-blank user message.
pub fn validate(messages: &[ConversationMessage], limits: &AgentConfig) -> Result<(), DispatchError> {
    let Some(last) = messages.last() else {
        return Err(DispatchError::InvalidRequest("conversation is empty".to_string()));
    };

    if messages.len() > limits.max_history {
        return Err(DispatchError::InvalidRequest(format!(
            "conversation has {} messages, limit is {}",
            messages.len(),
            limits.max_history
        )));
    }

    for (position, message) in messages.iter().enumerate() {
        let texts = message.content.texts();

        if message.role == ChatRole::Tool && texts.iter().any(|t| !t.trim().is_empty()) {
            return Err(DispatchError::InvalidRequest(format!(
                "message {position}: tool messages may only carry tool results"
            )));
        }

        if let Some(len) = texts
            .iter()
            .map(|t| t.chars().count())
            .find(|&len| len > limits.max_message_chars)
        {
            return Err(DispatchError::InvalidRequest(format!(
                "message {position}: text of {len} characters exceeds limit of {}",
                limits.max_message_chars
            )));
        }
    }

    if last.role != ChatRole::User {
        return Err(DispatchError::InvalidRequest(
            "last message must come from the user".to_string(),
        ));
    }

    if last.content.texts().iter().all(|t| t.trim().is_empty()) {
        return Err(DispatchError::InvalidRequest(
            "last message has no text".to_string(),
        ));
    }

    Ok(())
}

/// Accumulates Claude messages, grouping assistant blocks and tool results.
struct MessageBuilder {
    result: Vec<Message>,
    assistant_blocks: Vec<ContentBlock>,
    tool_results: Vec<ContentBlock>,
}

impl MessageBuilder {
    const fn new() -> Self {
        Self {
            result: Vec::new(),
            assistant_blocks: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    fn flush_assistant_blocks(&mut self) {
        if !self.assistant_blocks.is_empty() {
            self.result.push(Message {
                role: Role::Assistant,
                content: MessageContent::Blocks(std::mem::take(&mut self.assistant_blocks)),
            });
        }
    }

    fn flush_tool_results(&mut self) {
        if !self.tool_results.is_empty() {
            self.result.push(Message {
                role: Role::User,
                content: MessageContent::Blocks(std::mem::take(&mut self.tool_results)),
            });
        }
    }

    fn add_user_text(&mut self, texts: &[&str]) {
        self.flush_assistant_blocks();
        self.flush_tool_results();

        let text = texts.join("\n");
        if !text.trim().is_empty() {
            self.result.push(Message::user_text(text));
        }
    }

    fn add_assistant_text(&mut self, text: &str) {
        self.flush_tool_results();

        if !text.trim().is_empty() {
            self.assistant_blocks.push(ContentBlock::Text {
                text: text.to_string(),
            });
        }
    }

    fn add_tool_call(&mut self, id: &str, name: &str, input: &Value) {
        self.flush_tool_results();

        let input = if input.is_object() {
            input.clone()
        } else {
            Value::Object(serde_json::Map::new())
        };
        self.assistant_blocks.push(ContentBlock::ToolUse {
            id: id.to_string(),
            name: name.to_string(),
            input,
        });
    }

    fn add_tool_result(&mut self, id: &str, output: &Value, is_error: bool) {
        self.flush_assistant_blocks();

        self.tool_results.push(ContentBlock::ToolResult {
            tool_use_id: id.to_string(),
            content: output.to_string(),
            is_error: Some(is_error),
        });
    }

    fn finish(mut self) -> Vec<Message> {
        self.flush_assistant_blocks();
        self.flush_tool_results();
        prune_unpaired_tools(self.result)
    }
}

/// Drop tool calls without a result and results without a call.
///
/// Claude rejects a history where the two do not pair up, and a client that
/// was disconnected mid-turn can send exactly that.
fn prune_unpaired_tools(messages: Vec<Message>) -> Vec<Message> {
    let mut calls = HashSet::new();
    let mut results = HashSet::new();
    for message in &messages {
        if let MessageContent::Blocks(blocks) = &message.content {
            for block in blocks {
                match block {
                    ContentBlock::ToolUse { id, .. } => {
                        calls.insert(id.clone());
                    }
                    ContentBlock::ToolResult { tool_use_id, .. } => {
                        results.insert(tool_use_id.clone());
                    }
                    ContentBlock::Text { .. } => {}
                }
            }
        }
    }

    messages
        .into_iter()
        .filter_map(|message| match message.content {
            MessageContent::Blocks(blocks) => {
                let kept: Vec<ContentBlock> = blocks
                    .into_iter()
                    .filter(|block| match block {
                        ContentBlock::ToolUse { id, .. } => results.contains(id),
                        ContentBlock::ToolResult { tool_use_id, .. } => calls.contains(tool_use_id),
                        ContentBlock::Text { .. } => true,
                    })
                    .collect();
                (!kept.is_empty()).then(|| Message {
                    role: message.role,
                    content: MessageContent::Blocks(kept),
                })
            }
            MessageContent::Text(_) => Some(message),
        })
        .collect()
}

/// Convert conversation history into Claude messages.
#[must_use]
pub fn to_model_messages(messages: &[ConversationMessage]) -> Vec<Message> {
    let mut builder = MessageBuilder::new();

    for message in messages {
        match (&message.role, &message.content) {
            (ChatRole::User, content) => {
                builder.add_user_text(&content.texts());
                if let ConversationContent::Parts(parts) = content {
                    add_tool_parts(&mut builder, parts);
                }
            }
            (_, ConversationContent::Text(text)) => builder.add_assistant_text(text),
            (_, ConversationContent::Parts(parts)) => {
                for part in parts {
                    match part {
                        ConversationPart::Text { text } => builder.add_assistant_text(text),
                        _ => add_tool_parts(&mut builder, std::slice::from_ref(part)),
                    }
                }
            }
        }
    }

    builder.finish()
}

fn add_tool_parts(builder: &mut MessageBuilder, parts: &[ConversationPart]) {
    for part in parts {
        match part {
            ConversationPart::ToolCall {
                tool_call_id,
                tool_name,
                input,
            } => builder.add_tool_call(tool_call_id, tool_name, input),
            ConversationPart::ToolResult {
                tool_call_id,
                output,
                is_error,
            } => builder.add_tool_result(tool_call_id, output, *is_error),
            ConversationPart::Tool {
                tool_call_id,
                tool_name,
                state,
                input,
                output,
                error_text,
            } => {
                builder.add_tool_call(tool_call_id, tool_name, input);
                match state {
                    ToolPartState::OutputAvailable => {
                        builder.add_tool_result(tool_call_id, output, false);
                    }
                    ToolPartState::OutputError => {
                        let error = error_text.as_deref().unwrap_or("tool failed");
                        builder.add_tool_result(tool_call_id, &json!({ "error": error }), true);
                    }
                    // No outcome yet; the call is pruned as unpaired.
                    ToolPartState::InputStreaming
                    | ToolPartState::InputAvailable
                    | ToolPartState::Pending => {}
                }
            }
            ConversationPart::Text { .. } | ConversationPart::Other => {}
        }
    }
}
