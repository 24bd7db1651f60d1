//! The producer stops when the client goes away.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use stephans_core::ChatRole;
use stephans_integration_tests::{InMemoryOrders, ScriptedModel, text_turn, tool_turn};
use stephans_storefront::agent::{
    AgentIdentity, Collaborators, ConversationMessage, Dispatcher, StreamFragment,
};
use stephans_storefront::config::AgentConfig;
use stephans_storefront::services::{CatalogError, ProductCatalog, ProductQuery, ProductResult};

/// Sets its flag when dropped.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// A catalog whose searches never finish.
struct HangingCatalog {
    started: Arc<AtomicBool>,
    dropped: Arc<AtomicBool>,
}

#[async_trait]
impl ProductCatalog for HangingCatalog {
    async fn search(&self, _query: &ProductQuery) -> Result<Vec<ProductResult>, CatalogError> {
        let _guard = DropFlag(Arc::clone(&self.dropped));
        self.started.store(true, Ordering::SeqCst);
        std::future::pending::<()>().await;
        Ok(Vec::new())
    }
}

async fn wait_for(flag: &AtomicBool) -> bool {
    for _ in 0..100 {
        if flag.load(Ordering::SeqCst) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_disconnect_cancels_in_flight_tool() {
    let started = Arc::new(AtomicBool::new(false));
    let dropped = Arc::new(AtomicBool::new(false));
    let collaborators = Collaborators {
        catalog: Arc::new(HangingCatalog {
            started: Arc::clone(&started),
            dropped: Arc::clone(&dropped),
        }),
        orders: Arc::new(InMemoryOrders::default()),
    };
    let model = ScriptedModel::new(vec![
        tool_turn("toolu_01", "searchProducts", &json!({"query": "bed"})),
        text_turn("never sent"),
    ]);

    let mut rx = Dispatcher::new(
        &AgentIdentity::anonymous(),
        model.clone(),
        &collaborators,
        AgentConfig::default(),
    )
    .dispatch(vec![ConversationMessage::text(ChatRole::User, "beds?")])
    .await
    .expect("dispatch");

    while let Some(fragment) = rx.recv().await {
        if matches!(fragment, StreamFragment::ToolInputAvailable { .. }) {
            break;
        }
    }
    assert!(wait_for(&started).await, "tool never started");

    drop(rx);

    assert!(wait_for(&dropped).await, "tool future was not dropped");
    assert_eq!(model.requests().len(), 1);
}

#[tokio::test]
async fn test_disconnect_before_first_fragment() {
    let model = ScriptedModel::new(vec![text_turn("Hello there!")]);
    let rx = Dispatcher::new(
        &AgentIdentity::anonymous(),
        model.clone(),
        &stephans_integration_tests::collaborators("user_123"),
        AgentConfig::default(),
    )
    .dispatch(vec![ConversationMessage::text(ChatRole::User, "hi")])
    .await
    .expect("dispatch");

    drop(rx);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(model.requests().len(), 1);
}
