//! Shopping assistant chat endpoint.
//!
//! `POST /api/chat` takes the full conversation and answers with a UI message
//! stream: server-sent events carrying one JSON fragment each, then `[DONE]`.

use std::convert::Infallible;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderName, HeaderValue},
    response::{
        IntoResponse, Response, Sse,
        sse::{Event, KeepAlive},
    },
};
use futures::{Stream, StreamExt, stream};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::instrument;

use crate::agent::stream::{DONE_SENTINEL, PROTOCOL_VERSION};
use crate::agent::{ChatRequestBody, StreamFragment};
use crate::error::DispatchError;
use crate::middleware::OptionalAuth;
use crate::state::AppState;

/// Response header announcing the stream protocol.
pub static PROTOCOL_HEADER: HeaderName = HeaderName::from_static("x-vercel-ai-ui-message-stream");

/// Run one chat request.
///
/// POST /api/chat
///
/// Failures before the first fragment (bad body, unreachable model) return
/// an opaque 500. Once streaming starts, failures arrive as an `error`
/// fragment instead.
#[instrument(skip_all, fields(authenticated = auth.0.is_some()))]
pub async fn chat(
    State(state): State<AppState>,
    auth: OptionalAuth,
    body: Bytes,
) -> Result<Response, DispatchError> {
    let request = ChatRequestBody::parse(&body)?;
    let fragments = state
        .dispatcher(&auth.identity())
        .dispatch(request.messages)
        .await?;

    Ok(stream_response(fragments))
}

fn stream_response(fragments: mpsc::Receiver<StreamFragment>) -> Response {
    (
        [(
            PROTOCOL_HEADER.clone(),
            HeaderValue::from_static(PROTOCOL_VERSION),
        )],
        Sse::new(sse_events(fragments)).keep_alive(KeepAlive::default()),
    )
        .into_response()
}

/// Map fragments to SSE events, ending with the `[DONE]` sentinel.
fn sse_events(
    fragments: mpsc::Receiver<StreamFragment>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    ReceiverStream::new(fragments)
        .map(|fragment| {
            let json = serde_json::to_string(&fragment).unwrap_or_else(|_| {
                r#"{"type":"error","errorText":"Failed to serialize fragment"}"#.to_string()
            });
            Ok(Event::default().data(json))
        })
        .chain(stream::once(async {
            Ok(Event::default().data(DONE_SENTINEL))
        }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_end_with_done() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(StreamFragment::StartStep).await.expect("send");
        tx.send(StreamFragment::Finish).await.expect("send");
        drop(tx);

        let events: Vec<_> = sse_events(rx).collect().await;
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn test_response_carries_protocol_header() {
        let (tx, rx) = mpsc::channel(1);
        drop(tx);

        let response = stream_response(rx);
        assert_eq!(response.headers()[&PROTOCOL_HEADER], PROTOCOL_VERSION);
        assert_eq!(
            response.headers()[axum::http::header::CONTENT_TYPE],
            "text/event-stream"
        );
    }
}
