//! Per-request tool loop.
//!
//! The first model call happens before [`Dispatcher::dispatch`] returns, so
//! an unreachable model becomes an HTTP error instead of a broken stream.
//! Everything after that runs in a spawned producer that writes
//! [`StreamFragment`]s to a bounded channel and stops as soon as the
//! receiver is dropped.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::StreamExt;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{Instrument, Span, debug, error, info, instrument, warn};
use uuid::Uuid;

use super::capabilities::{CapabilitySet, Collaborators, build_capabilities};
use super::identity::AgentIdentity;
use super::instructions::compose_instructions;
use super::messages::{self, ConversationMessage};
use super::stream::StreamFragment;
use crate::claude::{
    ClaudeError, ContentBlock, ContentBlockDelta, ContentBlockStart, EventStream, LanguageModel,
    Message, MessageContent, ModelRequest, Role, StopReason, StreamEvent,
};
use crate::config::AgentConfig;

pub use crate::error::DispatchError;

/// Error text when the step limit is hit.
pub const TOO_MANY_STEPS: &str = "too many tool steps";

/// Error text when the model fails mid-response.
pub const MODEL_FAILURE: &str = "The assistant is unavailable right now. Please try again.";

/// The receiving side hung up.
#[derive(Debug)]
struct ConsumerGone;

enum TurnError {
    Gone,
    Model(ClaudeError),
}

impl From<ConsumerGone> for TurnError {
    fn from(_: ConsumerGone) -> Self {
        Self::Gone
    }
}

/// A tool call as the model requested it.
struct ToolCall {
    id: String,
    name: String,
    input: Value,
}

/// One finished model call.
struct Turn {
    /// Assistant content to append to the conversation.
    blocks: Vec<ContentBlock>,
    tool_calls: Vec<ToolCall>,
    stop_reason: Option<StopReason>,
}

/// A content block still being streamed.
enum PendingBlock {
    Text {
        id: String,
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        initial: Value,
        json: String,
    },
}

/// Runs one chat request against the model.
pub struct Dispatcher {
    model: Arc<dyn LanguageModel>,
    instructions: String,
    capabilities: CapabilitySet,
    limits: AgentConfig,
}

impl Dispatcher {
    /// Build a dispatcher for `identity`.
    ///
    /// Instructions and capabilities are fixed here and never change for the
    /// rest of the request.
    #[must_use]
    pub fn new(
        identity: &AgentIdentity,
        model: Arc<dyn LanguageModel>,
        collaborators: &Collaborators,
        limits: AgentConfig,
    ) -> Self {
        Self {
            model,
            instructions: compose_instructions(identity),
            capabilities: build_capabilities(identity, collaborators),
            limits,
        }
    }

    #[must_use]
    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    #[must_use]
    pub const fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Validate the history, open the first model call and start streaming.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::InvalidRequest` for a history that breaks the
    /// limits, and `DispatchError::AgentUnavailable` if the first model call
    /// cannot be opened.
    #[instrument(
        skip_all,
        fields(tools = ?self.capabilities.names(), messages = history.len())
    )]
    pub async fn dispatch(
        self,
        history: Vec<ConversationMessage>,
    ) -> Result<mpsc::Receiver<StreamFragment>, DispatchError> {
        messages::validate(&history, &self.limits)?;
        let conversation = messages::to_model_messages(&history);

        let first = self.model.stream(self.request(conversation.clone())).await?;

        let (tx, rx) = mpsc::channel(self.limits.stream_buffer.max(1));
        tokio::spawn(self.run(conversation, first, tx).instrument(Span::current()));

        Ok(rx)
    }

    fn request(&self, messages: Vec<Message>) -> ModelRequest {
        ModelRequest {
            system: self.instructions.clone(),
            messages,
            tools: self.capabilities.definitions(),
        }
    }

    async fn run(
        self,
        mut conversation: Vec<Message>,
        first: EventStream,
        tx: mpsc::Sender<StreamFragment>,
    ) {
        match self.drive(&mut conversation, first, &tx).await {
            Ok(()) => debug!("Chat response complete"),
            Err(ConsumerGone) => info!("Client disconnected, chat response abandoned"),
        }
    }

    async fn drive(
        &self,
        conversation: &mut Vec<Message>,
        first: EventStream,
        tx: &mpsc::Sender<StreamFragment>,
    ) -> Result<(), ConsumerGone> {
        let message_id = format!("msg_{}", Uuid::new_v4().simple());
        emit(tx, StreamFragment::Start { message_id }).await?;

        let mut events = first;
        let mut step = 1;

        loop {
            emit(tx, StreamFragment::StartStep).await?;

            let turn = match consume_turn(events, tx, step).await {
                Ok(turn) => turn,
                Err(TurnError::Gone) => return Err(ConsumerGone),
                Err(TurnError::Model(e)) => {
                    error!(error = %e, step, "Model stream failed");
                    return fail(tx, MODEL_FAILURE).await;
                }
            };

            emit(tx, StreamFragment::FinishStep).await?;

            if turn.stop_reason != Some(StopReason::ToolUse) || turn.tool_calls.is_empty() {
                info!(steps = step, stop_reason = ?turn.stop_reason, "Chat response finished");
                return emit(tx, StreamFragment::Finish).await;
            }

            conversation.push(Message {
                role: Role::Assistant,
                content: MessageContent::Blocks(turn.blocks),
            });
            let results = self.run_tools(&turn.tool_calls, tx).await?;
            conversation.push(Message {
                role: Role::User,
                content: MessageContent::Blocks(results),
            });

            if step >= self.limits.max_steps {
                warn!(steps = step, "Tool step limit reached");
                return fail(tx, TOO_MANY_STEPS).await;
            }
            step += 1;

            let opened = tokio::select! {
                () = tx.closed() => return Err(ConsumerGone),
                opened = self.model.stream(self.request(conversation.clone())) => opened,
            };
            events = match opened {
                Ok(events) => events,
                Err(e) => {
                    error!(error = %e, step, "Model call failed");
                    return fail(tx, MODEL_FAILURE).await;
                }
            };
        }
    }

    /// Execute the requested tools in order, streaming their outcomes.
    async fn run_tools(
        &self,
        calls: &[ToolCall],
        tx: &mpsc::Sender<StreamFragment>,
    ) -> Result<Vec<ContentBlock>, ConsumerGone> {
        let mut results = Vec::with_capacity(calls.len());

        for call in calls {
            emit(
                tx,
                StreamFragment::ToolInputAvailable {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    input: call.input.clone(),
                },
            )
            .await?;

            let outcome = tokio::select! {
                () = tx.closed() => return Err(ConsumerGone),
                outcome = self.capabilities.invoke(&call.name, &call.input) => outcome,
            };

            let (content, is_error) = match outcome {
                Ok(output) => {
                    let content = output.to_string();
                    emit(
                        tx,
                        StreamFragment::ToolOutputAvailable {
                            tool_call_id: call.id.clone(),
                            output,
                        },
                    )
                    .await?;
                    (content, false)
                }
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "Tool call failed");
                    emit(
                        tx,
                        StreamFragment::ToolOutputError {
                            tool_call_id: call.id.clone(),
                            error_text: e.public_message(),
                        },
                    )
                    .await?;
                    (e.payload().to_string(), true)
                }
            };

            results.push(ContentBlock::ToolResult {
                tool_use_id: call.id.clone(),
                content,
                is_error: Some(is_error),
            });
        }

        Ok(results)
    }
}

async fn emit(
    tx: &mpsc::Sender<StreamFragment>,
    fragment: StreamFragment,
) -> Result<(), ConsumerGone> {
    tx.send(fragment).await.map_err(|_| ConsumerGone)
}

async fn fail(tx: &mpsc::Sender<StreamFragment>, text: &str) -> Result<(), ConsumerGone> {
    emit(
        tx,
        StreamFragment::Error {
            error_text: text.to_string(),
        },
    )
    .await
}

/// Read one model call to `message_stop`, forwarding text as it arrives.
async fn consume_turn(
    mut events: EventStream,
    tx: &mpsc::Sender<StreamFragment>,
    step: usize,
) -> Result<Turn, TurnError> {
    let mut blocks: BTreeMap<usize, PendingBlock> = BTreeMap::new();
    let mut stop_reason = None;

    loop {
        let next = tokio::select! {
            () = tx.closed() => return Err(TurnError::Gone),
            next = events.next() => next,
        };

        let event = match next {
            Some(Ok(event)) => event,
            Some(Err(e)) => return Err(TurnError::Model(e)),
            None => {
                return Err(TurnError::Model(ClaudeError::Stream(
                    "stream ended before message_stop".to_string(),
                )));
            }
        };

        match event {
            StreamEvent::MessageStart { message } => {
                debug!(id = %message.id, model = %message.model, step, "Model call started");
            }
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                ContentBlockStart::Text { text } => {
                    let id = format!("text-{step}-{index}");
                    emit(tx, StreamFragment::TextStart { id: id.clone() }).await?;
                    if !text.is_empty() {
                        emit(
                            tx,
                            StreamFragment::TextDelta {
                                id: id.clone(),
                                delta: text.clone(),
                            },
                        )
                        .await?;
                    }
                    blocks.insert(index, PendingBlock::Text { id, text });
                }
                ContentBlockStart::ToolUse { id, name, input } => {
                    blocks.insert(
                        index,
                        PendingBlock::ToolUse {
                            id,
                            name,
                            initial: input,
                            json: String::new(),
                        },
                    );
                }
            },
            StreamEvent::ContentBlockDelta { index, delta } => {
                match (blocks.get_mut(&index), delta) {
                    (Some(PendingBlock::Text { id, text }), ContentBlockDelta::TextDelta { text: delta }) => {
                        text.push_str(&delta);
                        emit(
                            tx,
                            StreamFragment::TextDelta {
                                id: id.clone(),
                                delta,
                            },
                        )
                        .await?;
                    }
                    (
                        Some(PendingBlock::ToolUse { json, .. }),
                        ContentBlockDelta::InputJsonDelta { partial_json },
                    ) => json.push_str(&partial_json),
                    _ => debug!(index, "Ignoring delta for unknown block"),
                }
            }
            StreamEvent::ContentBlockStop { index } => {
                if let Some(PendingBlock::Text { id, .. }) = blocks.get(&index) {
                    emit(tx, StreamFragment::TextEnd { id: id.clone() }).await?;
                }
            }
            StreamEvent::MessageDelta { delta, usage } => {
                debug!(output_tokens = usage.output_tokens, "Model usage");
                stop_reason = delta.stop_reason.or(stop_reason);
            }
            StreamEvent::MessageStop => break,
            StreamEvent::Ping => {}
            StreamEvent::Error { error } => {
                return Err(TurnError::Model(ClaudeError::Api {
                    error_type: error.error_type,
                    message: error.message,
                }));
            }
        }
    }

    Ok(Turn::from_blocks(blocks, stop_reason))
}

impl Turn {
    fn from_blocks(blocks: BTreeMap<usize, PendingBlock>, stop_reason: Option<StopReason>) -> Self {
        let mut content = Vec::new();
        let mut tool_calls = Vec::new();

        for block in blocks.into_values() {
            match block {
                PendingBlock::Text { text, .. } => {
                    if !text.trim().is_empty() {
                        content.push(ContentBlock::Text { text });
                    }
                }
                PendingBlock::ToolUse {
                    id,
                    name,
                    initial,
                    json,
                } => {
                    let (recorded, input) = tool_input(initial, json);
                    content.push(ContentBlock::ToolUse {
                        id: id.clone(),
                        name: name.clone(),
                        input: recorded,
                    });
                    tool_calls.push(ToolCall { id, name, input });
                }
            }
        }

        Self {
            blocks: content,
            tool_calls,
            stop_reason,
        }
    }
}

/// Resolve streamed tool arguments.
///
/// Returns the input recorded in the conversation (always an object, as the
/// API requires) and the input handed to the tool. Unparsable JSON reaches
/// the tool as a raw string so it fails validation there.
fn tool_input(initial: Value, json: String) -> (Value, Value) {
    let parsed = if json.trim().is_empty() {
        Ok(initial)
    } else {
        serde_json::from_str::<Value>(&json)
    };

    match parsed {
        Ok(value) if value.is_object() => (value.clone(), value),
        Ok(value) => (json!({}), value),
        Err(_) => (json!({}), Value::String(json)),
    }
}
