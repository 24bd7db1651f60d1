//! Claude API client for streaming chat turns.

use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use tracing::instrument;

use crate::config::ClaudeConfig;

use super::error::{ApiErrorResponse, ClaudeError};
use super::types::{ChatRequest, StreamEvent};
use super::{EventStream, LanguageModel, ModelRequest};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Claude API client.
///
/// Cheap to clone; the HTTP connection pool is shared.
#[derive(Clone)]
pub struct ClaudeClient {
    inner: Arc<ClaudeClientInner>,
}

struct ClaudeClientInner {
    client: reqwest::Client,
    model: String,
}

impl ClaudeClient {
    /// Create a new Claude client.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key contains invalid header characters or
    /// the HTTP client cannot be built.
    pub fn new(config: &ClaudeConfig) -> Result<Self, ClaudeError> {
        let mut api_key = HeaderValue::from_str(config.api_key.expose_secret())
            .map_err(|e| ClaudeError::InvalidApiKey(e.to_string()))?;
        api_key.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("x-api-key", api_key);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            inner: Arc::new(ClaudeClientInner {
                client,
                model: config.model.clone(),
            }),
        })
    }

    /// The model ID requests are sent to.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.inner.model
    }

    /// Handle an error status code.
    async fn handle_error_status(
        &self,
        status: reqwest::StatusCode,
        response: reqwest::Response,
    ) -> ClaudeError {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            return ClaudeError::RateLimited(retry_after);
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return ClaudeError::Unauthorized("Invalid API key".to_string());
        }

        match response.text().await {
            Ok(body) => match serde_json::from_str::<ApiErrorResponse>(&body) {
                Ok(api_error) => ClaudeError::Api {
                    error_type: api_error.error.error_type,
                    message: api_error.error.message,
                },
                Err(_) => ClaudeError::Api {
                    error_type: "unknown".to_string(),
                    message: body,
                },
            },
            Err(e) => ClaudeError::Http(e),
        }
    }
}

#[async_trait]
impl LanguageModel for ClaudeClient {
    #[instrument(skip(self, request), fields(model = %self.inner.model, messages = request.messages.len()))]
    async fn stream(&self, request: ModelRequest) -> Result<EventStream, ClaudeError> {
        let body = ChatRequest {
            model: self.inner.model.clone(),
            max_tokens: DEFAULT_MAX_TOKENS,
            messages: request.messages,
            system: Some(request.system),
            tools: (!request.tools.is_empty()).then_some(request.tools),
            stream: Some(true),
        };

        let response = self
            .inner
            .client
            .post(ANTHROPIC_API_URL)
            .json(&body)
            .send()
            .await?;

        // Check for error responses before streaming
        let status = response.status();
        if !status.is_success() {
            return Err(self.handle_error_status(status, response).await);
        }

        // Buffer raw bytes: a chunk boundary may split a multi-byte character.
        let events = stream! {
            let mut buffer: Vec<u8> = Vec::new();
            let mut byte_stream = std::pin::pin!(response.bytes_stream());

            while let Some(chunk_result) = byte_stream.next().await {
                match chunk_result {
                    Ok(chunk) => {
                        buffer.extend_from_slice(&chunk);

                        while let Some(event) = extract_sse_event(&mut buffer) {
                            match std::str::from_utf8(&event) {
                                Ok(text) => {
                                    if let Some(parsed) = parse_sse_event(text) {
                                        yield parsed;
                                    }
                                }
                                Err(e) => {
                                    yield Err(ClaudeError::Parse(format!("Invalid UTF-8: {e}")));
                                }
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(ClaudeError::Stream(e.to_string()));
                        break;
                    }
                }
            }
        };

        Ok(events.boxed())
    }
}

/// Extract a complete SSE event from the buffer.
///
/// Returns `Some(event)` if a complete event was found (and removes it from buffer),
/// or `None` if no complete event is available yet.
fn extract_sse_event(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    // SSE events are separated by double newlines
    let idx = buffer.windows(2).position(|w| w == b"\n\n")?;
    let mut event: Vec<u8> = buffer.drain(..idx + 2).collect();
    event.truncate(idx);
    Some(event)
}

/// Parse an SSE event string into a `StreamEvent`.
fn parse_sse_event(event: &str) -> Option<Result<StreamEvent, ClaudeError>> {
    if event.trim().is_empty() {
        return None;
    }

    // SSE format: "event: <type>\ndata: <json>"
    let data = event
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix("data: "))?;

    if data == "[DONE]" {
        return None;
    }

    Some(
        serde_json::from_str::<StreamEvent>(data)
            .map_err(|e| ClaudeError::Parse(format!("Failed to parse stream event: {e}"))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claude::{ContentBlockDelta, StopReason};
    use secrecy::SecretString;

    #[test]
    fn test_extract_sse_event() {
        let mut buffer = b"event: message_start\ndata: {}\n\nevent: ping\ndata: {}\n\n".to_vec();

        let event1 = extract_sse_event(&mut buffer).expect("first event");
        assert!(String::from_utf8(event1).expect("utf8").contains("message_start"));

        let event2 = extract_sse_event(&mut buffer).expect("second event");
        assert!(String::from_utf8(event2).expect("utf8").contains("ping"));

        assert!(extract_sse_event(&mut buffer).is_none());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_extract_sse_event_incomplete() {
        let mut buffer = b"event: message_start\ndata: {\"partial".to_vec();
        assert!(extract_sse_event(&mut buffer).is_none());
        assert_eq!(buffer, b"event: message_start\ndata: {\"partial");
    }

    #[test]
    fn test_extract_sse_event_split_multibyte() {
        let full = "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"🐶\"}}\n\n";
        let bytes = full.as_bytes();
        let split = full.find('🐶').expect("emoji") + 2;

        let mut buffer = bytes[..split].to_vec();
        assert!(extract_sse_event(&mut buffer).is_none());
        buffer.extend_from_slice(&bytes[split..]);

        let event = extract_sse_event(&mut buffer).expect("event");
        let text = std::str::from_utf8(&event).expect("utf8");
        let parsed = parse_sse_event(text).expect("some").expect("parse");
        match parsed {
            StreamEvent::ContentBlockDelta {
                delta: ContentBlockDelta::TextDelta { text },
                ..
            } => assert_eq!(text, "🐶"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_parse_sse_event_ping() {
        let event = "event: ping\ndata: {\"type\":\"ping\"}";
        let stream_event = parse_sse_event(event).expect("no result").expect("parse error");
        assert!(matches!(stream_event, StreamEvent::Ping));
    }

    #[test]
    fn test_parse_sse_event_message_delta() {
        let event = "event: message_delta\ndata: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"tool_use\"},\"usage\":{\"output_tokens\":42}}";
        let stream_event = parse_sse_event(event).expect("no result").expect("parse error");
        assert!(matches!(
            stream_event,
            StreamEvent::MessageDelta { delta, .. } if delta.stop_reason == Some(StopReason::ToolUse)
        ));
    }

    #[test]
    fn test_parse_sse_event_empty() {
        assert!(parse_sse_event("").is_none());
    }

    #[test]
    fn test_parse_sse_event_invalid_json() {
        let result = parse_sse_event("data: {not json").expect("some");
        assert!(matches!(result, Err(ClaudeError::Parse(_))));
    }

    #[test]
    fn test_new_rejects_header_unsafe_key() {
        let config = ClaudeConfig {
            api_key: SecretString::from("sk-ant\nbroken"),
            model: "claude-sonnet-4-5".to_string(),
        };
        assert!(matches!(
            ClaudeClient::new(&config),
            Err(ClaudeError::InvalidApiKey(_))
        ));
    }

    #[test]
    fn test_new_keeps_model() {
        let config = ClaudeConfig {
            api_key: SecretString::from("sk-ant-REDACTED"),
            model: "claude-sonnet-4-5".to_string(),
        };
        let client = ClaudeClient::new(&config).expect("client");
        assert_eq!(client.model(), "claude-sonnet-4-5");
    }

    #[test]
    fn test_claude_client_is_send_sync() {
        fn assert_send_sync<T: Send + Sync + Clone>() {}
        assert_send_sync::<ClaudeClient>();
    }
}
