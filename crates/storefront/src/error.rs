//! Request-level error handling with Sentry integration.
//!
//! Chat failures that happen before streaming starts become a single opaque
//! JSON 500. Details are logged and captured to Sentry, never sent to the
//! client.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::claude::ClaudeError;

/// Body text of every failed chat request.
pub const CHAT_FAILURE_MESSAGE: &str = "Failed to process chat request";

/// Errors that stop a chat request before any fragment is streamed.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Malformed body, empty or oversize history, or a bad final message.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The model could not be reached for the first turn.
    #[error("agent unavailable: {0}")]
    AgentUnavailable(#[from] ClaudeError),
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        match &self {
            Self::AgentUnavailable(_) => {
                let event_id = sentry::capture_error(&self);
                tracing::error!(
                    error = %self,
                    sentry_event_id = %event_id,
                    "Chat request failed"
                );
            }
            Self::InvalidRequest(_) => {
                tracing::warn!(error = %self, "Rejected chat request");
            }
        }

        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": CHAT_FAILURE_MESSAGE })),
        )
            .into_response()
    }
}

/// Set the Sentry user context from a user ID.
///
/// Called once the session identifies a customer so errors are attributed.
pub fn set_sentry_user(user_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        serde_json::from_slice(&bytes).expect("json")
    }

    #[test]
    fn test_dispatch_error_display() {
        let err = DispatchError::InvalidRequest("conversation is empty".to_string());
        assert_eq!(err.to_string(), "invalid request: conversation is empty");

        let err = DispatchError::from(ClaudeError::RateLimited(10));
        assert_eq!(
            err.to_string(),
            "agent unavailable: rate limited, retry after 10 seconds"
        );
    }

    #[tokio::test]
    async fn test_invalid_request_is_opaque_500() {
        let response =
            DispatchError::InvalidRequest("malformed body: EOF".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            json!({"error": "Failed to process chat request"})
        );
    }

    #[tokio::test]
    async fn test_agent_unavailable_hides_details() {
        let response = DispatchError::AgentUnavailable(ClaudeError::Unauthorized(
            "Invalid API key".to_string(),
        ))
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["error"], CHAT_FAILURE_MESSAGE);
        assert!(!body.to_string().contains("API key"));
    }
}
