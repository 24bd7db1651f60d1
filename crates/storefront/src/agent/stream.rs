//! Fragments of a streamed assistant response.
//!
//! Serialized as the UI message stream protocol (v1): one JSON object per SSE
//! `data:` line, tagged by `type`, followed by a `[DONE]` sentinel.

use serde::Serialize;
use serde_json::Value;

/// Value of the `x-vercel-ai-ui-message-stream` response header.
pub const PROTOCOL_VERSION: &str = "v1";

/// Final SSE payload after the last fragment.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One element of the response stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum StreamFragment {
    /// First fragment of every response.
    Start { message_id: String },
    /// A model call begins.
    StartStep,
    TextStart { id: String },
    TextDelta { id: String, delta: String },
    TextEnd { id: String },
    /// The model requested a tool with these arguments.
    ToolInputAvailable {
        tool_call_id: String,
        tool_name: String,
        input: Value,
    },
    ToolOutputAvailable { tool_call_id: String, output: Value },
    ToolOutputError {
        tool_call_id: String,
        error_text: String,
    },
    /// A model call ended.
    FinishStep,
    /// The turn could not complete.
    Error { error_text: String },
    /// Last fragment of a completed response.
    Finish,
}

impl StreamFragment {
    /// Whether this fragment ends the response.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Finish | Self::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_fragment_wire_format() {
        let cases = [
            (
                StreamFragment::Start {
                    message_id: "msg_1".to_string(),
                },
                json!({"type": "start", "messageId": "msg_1"}),
            ),
            (StreamFragment::StartStep, json!({"type": "start-step"})),
            (
                StreamFragment::TextDelta {
                    id: "text-1-0".to_string(),
                    delta: "Woof".to_string(),
                },
                json!({"type": "text-delta", "id": "text-1-0", "delta": "Woof"}),
            ),
            (
                StreamFragment::ToolInputAvailable {
                    tool_call_id: "toolu_1".to_string(),
                    tool_name: "searchProducts".to_string(),
                    input: json!({"query": "bed"}),
                },
                json!({
                    "type": "tool-input-available",
                    "toolCallId": "toolu_1",
                    "toolName": "searchProducts",
                    "input": {"query": "bed"}
                }),
            ),
            (
                StreamFragment::ToolOutputError {
                    tool_call_id: "toolu_1".to_string(),
                    error_text: "catalog search failed".to_string(),
                },
                json!({
                    "type": "tool-output-error",
                    "toolCallId": "toolu_1",
                    "errorText": "catalog search failed"
                }),
            ),
            (StreamFragment::Finish, json!({"type": "finish"})),
        ];

        for (fragment, expected) in cases {
            assert_eq!(serde_json::to_value(&fragment).expect("serialize"), expected);
        }
    }

    #[test]
    fn test_terminal_fragments() {
        assert!(StreamFragment::Finish.is_terminal());
        assert!(StreamFragment::Error { error_text: String::new() }.is_terminal());
        assert!(!StreamFragment::FinishStep.is_terminal());
    }
}
