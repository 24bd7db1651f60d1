//! `POST /api/chat` through the full router, with an in-memory session store.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
    routing::post,
};
use serde_json::{Value, json};
use tower::ServiceExt;
use tower_sessions::{MemoryStore, Session};

use stephans_core::UserId;
use stephans_integration_tests::{
    FailingCatalog, InMemoryOrders, ScriptedModel, collaborators, sse_payloads, test_state,
    text_turn, tool_turn,
};
use stephans_storefront::agent::Collaborators;
use stephans_storefront::app;
use stephans_storefront::claude::ClaudeError;
use stephans_storefront::middleware::{self, session};
use stephans_storefront::models::CurrentCustomer;
use stephans_storefront::routes::chat::PROTOCOL_HEADER;

/// Stand-in for the site's sign-in flow, which owns the session in production.
async fn sign_in(session: Session) -> StatusCode {
    let customer = CurrentCustomer {
        user_id: UserId::new("user_123"),
    };
    match middleware::set_current_customer(&session, &customer).await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn router(model: Arc<ScriptedModel>, collaborators: Collaborators) -> Router {
    Router::new()
        .route("/test/sign-in", post(sign_in))
        .merge(app(test_state(model, collaborators)))
        .layer(session::configure(MemoryStore::default(), false))
}

fn chat_request(body: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).expect("request")
}

fn chat_body(text: &str) -> String {
    json!({"messages": [{"role": "user", "content": text}]}).to_string()
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf-8")
}

fn types(payloads: &[Value]) -> Vec<&str> {
    payloads
        .iter()
        .map(|p| p["type"].as_str().or_else(|| p.as_str()).unwrap_or_default())
        .collect()
}

#[tokio::test]
async fn test_health() {
    let app = router(ScriptedModel::new(Vec::new()), collaborators("user_123"));
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok");
}

#[tokio::test]
async fn test_readiness_without_database() {
    let app = router(ScriptedModel::new(Vec::new()), collaborators("user_123"));
    let response = app
        .oneshot(Request::get("/health/ready").body(Body::empty()).expect("request"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_anonymous_chat_streams_protocol() {
    let model = ScriptedModel::new(vec![text_turn("Woof! 🐾 What can I find for you?")]);
    let app = router(model.clone(), collaborators("user_123"));

    let response = app
        .oneshot(chat_request(&chat_body("hi"), None))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
    assert_eq!(response.headers()[&PROTOCOL_HEADER], "v1");
    assert!(response.headers().contains_key("x-request-id"));

    let payloads = sse_payloads(&body_text(response).await);
    assert_eq!(
        types(&payloads),
        vec![
            "start",
            "start-step",
            "text-start",
            "text-delta",
            "text-end",
            "finish-step",
            "finish",
            "[DONE]"
        ]
    );
    assert_eq!(payloads[3]["delta"], "Woof! 🐾 What can I find for you?");
    assert_eq!(model.first_tool_names(), vec!["searchProducts"]);
}

#[tokio::test]
async fn test_signed_in_session_unlocks_orders() {
    let model = ScriptedModel::new(vec![
        tool_turn("toolu_01", "getMyOrders", &json!({"status": ""})),
        text_turn("You have two orders."),
    ]);
    let app = router(model.clone(), collaborators("user_123"));

    let signed_in = app
        .clone()
        .oneshot(
            Request::post("/test/sign-in")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    let cookie = signed_in.headers()[header::SET_COOKIE]
        .to_str()
        .expect("ascii")
        .split(';')
        .next()
        .expect("cookie pair")
        .to_string();
    assert!(cookie.starts_with("stephans_session="));

    let response = app
        .oneshot(chat_request(&chat_body("what did I order?"), Some(&cookie)))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let payloads = sse_payloads(&body_text(response).await);
    let output = payloads
        .iter()
        .find(|p| p["type"] == "tool-output-available")
        .expect("tool output");
    assert_eq!(output["output"]["totalOrders"], 2);
    assert_eq!(output["output"]["orders"][0]["statusDisplay"], "📦 Shipped");
    assert_eq!(model.first_tool_names(), vec!["getMyOrders", "searchProducts"]);
}

#[tokio::test]
async fn test_catalog_failure_is_narrated_not_500() {
    let model = ScriptedModel::new(vec![
        tool_turn("toolu_01", "searchProducts", &json!({"query": "bed", "category": ""})),
        text_turn("Sorry, I couldn't search the catalog just now. Please try again shortly."),
    ]);
    let collaborators = Collaborators {
        catalog: Arc::new(FailingCatalog),
        orders: Arc::new(InMemoryOrders::default()),
    };
    let app = router(model.clone(), collaborators);

    let response = app
        .oneshot(chat_request(&chat_body("do you have beds?"), None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let payloads = sse_payloads(&body_text(response).await);
    let error = payloads
        .iter()
        .find(|p| p["type"] == "tool-output-error")
        .expect("tool error");
    assert!(error["errorText"].as_str().expect("text").contains("temporarily unavailable"));
    assert!(!error.to_string().contains("connection refused"));
    assert_eq!(types(&payloads).last(), Some(&"[DONE]"));
    assert!(types(&payloads).contains(&"finish"));

    let second = &model.requests()[1];
    let tool_result = serde_json::to_value(&second.messages[2]).expect("serialize");
    assert_eq!(tool_result["content"][0]["type"], "tool_result");
    assert_eq!(tool_result["content"][0]["is_error"], true);
}

#[tokio::test]
async fn test_malformed_json_is_opaque_500() {
    let model = ScriptedModel::new(vec![text_turn("unused")]);
    let app = router(model.clone(), collaborators("user_123"));

    let response = app
        .oneshot(chat_request("{\"messages\": [", None))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    let body: Value = serde_json::from_str(&body_text(response).await).expect("json");
    assert_eq!(body, json!({"error": "Failed to process chat request"}));
    assert!(model.requests().is_empty());
}

#[tokio::test]
async fn test_history_limits_are_enforced() {
    let model = ScriptedModel::new(vec![text_turn("unused")]);
    let app = router(model.clone(), collaborators("user_123"));

    let messages: Vec<Value> = (0..51)
        .map(|i| json!({"role": if i % 2 == 0 { "user" } else { "assistant" }, "content": "hi"}))
        .collect();
    let response = app
        .clone()
        .oneshot(chat_request(&json!({"messages": messages}).to_string(), None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let response = app
        .oneshot(chat_request(&chat_body(&"a".repeat(8_001)), None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(model.requests().is_empty());
}

#[tokio::test]
async fn test_model_unreachable_is_opaque_500() {
    let model = ScriptedModel::new(vec![Err(ClaudeError::RateLimited(30))]);
    let app = router(model, collaborators("user_123"));

    let response = app
        .oneshot(chat_request(&chat_body("hi"), None))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = serde_json::from_str(&body_text(response).await).expect("json");
    assert_eq!(body["error"], "Failed to process chat request");
}

#[tokio::test]
async fn test_parts_history_round_trips_tool_turns() {
    let model = ScriptedModel::new(vec![text_turn("Glad you liked it!")]);
    let app = router(model.clone(), collaborators("user_123"));

    let body = json!({"messages": [
        {"role": "user", "parts": [{"type": "text", "text": "dog food?"}]},
        {"role": "assistant", "parts": [
            {"type": "step-start"},
            {"type": "text", "text": "Let me check."},
            {"type": "tool-call", "toolCallId": "t1", "toolName": "searchProducts", "input": {"query": "dog food"}}
        ]},
        {"role": "tool", "parts": [
            {"type": "tool-result", "toolCallId": "t1", "output": {"totalResults": 2}}
        ]},
        {"role": "user", "content": "thanks!"}
    ]});

    let response = app
        .oneshot(chat_request(&body.to_string(), None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    body_text(response).await;

    let messages = serde_json::to_value(&model.requests()[0].messages).expect("serialize");
    assert_eq!(messages.as_array().map(Vec::len), Some(4));
    assert_eq!(messages[1]["content"][1]["type"], "tool_use");
    assert_eq!(messages[2]["content"][0]["tool_use_id"], "t1");
}
