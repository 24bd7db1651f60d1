//! Integration tests for the Stephan's Pet Store shopping assistant.
//!
//! Everything runs in-process: the model is scripted, the catalog and order
//! history are in memory, and the router is driven with
//! `tower::ServiceExt::oneshot`. No network or database is needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p stephans-integration-tests
//! ```

use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::{StreamExt, stream};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::{Value, json};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use stephans_core::{OrderStatus, Price, ProductSlug, UserId};
use stephans_storefront::agent::Collaborators;
use stephans_storefront::claude::{ClaudeError, EventStream, LanguageModel, ModelRequest, StreamEvent};
use stephans_storefront::config::{AgentConfig, ClaudeConfig, StorefrontConfig};
use stephans_storefront::services::{
    CatalogError, OrderHistory, OrderLookupError, OrderResult, ProductCatalog, ProductQuery,
    ProductResult,
};
use stephans_storefront::state::AppState;

// =============================================================================
// Scripted model
// =============================================================================

/// Events of one model call, or the error opening it.
pub type ScriptedTurn = Result<Vec<Result<StreamEvent, ClaudeError>>, ClaudeError>;

/// A [`LanguageModel`] that replays prepared turns and records every request.
#[derive(Default)]
pub struct ScriptedModel {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    #[must_use]
    pub fn new(turns: Vec<ScriptedTurn>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into()),
            requests: Mutex::default(),
        })
    }

    /// Every request received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    /// Tool names offered in the first request.
    #[must_use]
    pub fn first_tool_names(&self) -> Vec<String> {
        self.requests()
            .first()
            .map(|r| r.tools.iter().map(|t| t.name.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn stream(&self, request: ModelRequest) -> Result<EventStream, ClaudeError> {
        self.requests.lock().expect("requests lock").push(request);
        let turn = self
            .turns
            .lock()
            .expect("turns lock")
            .pop_front()
            .unwrap_or_else(|| Err(ClaudeError::Stream("script exhausted".to_string())))?;
        Ok(stream::iter(turn).boxed())
    }
}

fn event(value: Value) -> Result<StreamEvent, ClaudeError> {
    Ok(serde_json::from_value(value).expect("valid stream event"))
}

/// A turn that answers with plain text and ends.
#[must_use]
pub fn text_turn(text: &str) -> ScriptedTurn {
    Ok(vec![
        event(json!({"type": "message_start", "message": {"id": "msg_text", "model": "scripted"}})),
        event(json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}})),
        event(json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": text}})),
        event(json!({"type": "content_block_stop", "index": 0})),
        event(json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 12}})),
        event(json!({"type": "message_stop"})),
    ])
}

/// A turn that calls one tool, streaming its input in two chunks.
#[must_use]
pub fn tool_turn(id: &str, name: &str, input: &Value) -> ScriptedTurn {
    let json = input.to_string();
    let (head, tail) = json.split_at(json.len() / 2);
    Ok(vec![
        event(json!({"type": "message_start", "message": {"id": "msg_tool", "model": "scripted"}})),
        event(json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}})),
        event(json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Let me check."}})),
        event(json!({"type": "content_block_stop", "index": 0})),
        event(json!({"type": "content_block_start", "index": 1, "content_block": {"type": "tool_use", "id": id, "name": name, "input": {}}})),
        event(json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": head}})),
        event(json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": tail}})),
        event(json!({"type": "content_block_stop", "index": 1})),
        event(json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}})),
        event(json!({"type": "message_stop"})),
    ])
}

// =============================================================================
// In-memory collaborators
// =============================================================================

/// Catalog over a fixed product list, matching terms against name and category.
#[derive(Default)]
pub struct InMemoryCatalog {
    products: Vec<(ProductResult, Decimal)>,
    searches: AtomicUsize,
}

impl InMemoryCatalog {
    /// A small pet-store catalog.
    #[must_use]
    pub fn stocked() -> Self {
        let product = |name: &str, slug: &str, price: i64, category: &str, stock: i32| {
            let price = Decimal::from(price);
            (
                ProductResult::new(
                    name,
                    &ProductSlug::new(slug),
                    Price::tzs(price),
                    category,
                    format!("{name} from Stephan's Pet Store"),
                    stock,
                ),
                price,
            )
        };

        Self {
            products: vec![
                product("Premium Dog Food 5kg", "premium-dog-food-5kg", 45_000, "Food", 24),
                product("Puppy Dog Food 2kg", "puppy-dog-food-2kg", 24_700, "Food", 3),
                product("Orthopedic Dog Bed", "orthopedic-dog-bed", 120_000, "Dogs", 0),
                product("Cat Scratching Post", "cat-scratching-post", 38_500, "Cats", 12),
            ],
            searches: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProductCatalog for InMemoryCatalog {
    async fn search(&self, query: &ProductQuery) -> Result<Vec<ProductResult>, CatalogError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        let terms = query.terms();

        Ok(self
            .products
            .iter()
            .filter(|(p, _)| {
                let haystack = format!("{} {}", p.name, p.category).to_lowercase();
                terms.iter().all(|t| haystack.contains(t.as_str()))
            })
            .filter(|(p, _)| {
                query
                    .category
                    .as_deref()
                    .is_none_or(|c| p.category.to_lowercase().contains(c))
            })
            .filter(|(_, price)| query.min_price.is_none_or(|min| *price >= min))
            .filter(|(_, price)| query.max_price.is_none_or(|max| *price <= max))
            .map(|(p, _)| p.clone())
            .collect())
    }
}

/// Catalog whose every search fails.
pub struct FailingCatalog;

#[async_trait]
impl ProductCatalog for FailingCatalog {
    async fn search(&self, _query: &ProductQuery) -> Result<Vec<ProductResult>, CatalogError> {
        Err(CatalogError::Unavailable("connection refused".to_string()))
    }
}

/// Order history keyed by user ID.
#[derive(Default)]
pub struct InMemoryOrders {
    orders: HashMap<UserId, Vec<OrderResult>>,
}

impl InMemoryOrders {
    /// One delivered and one shipped order for `user_id`.
    #[must_use]
    pub fn for_user(user_id: &str) -> Self {
        let placed = |day: u32| {
            Utc.with_ymd_and_hms(2026, 9, day, 10, 0, 0)
                .single()
                .expect("valid date")
        };

        let orders = vec![
            OrderResult::new(
                Uuid::from_u128(2),
                "ORD-1002",
                OrderStatus::Shipped,
                Price::tzs(Decimal::from(45_000)),
                vec!["Premium Dog Food 5kg".to_string()],
                placed(14),
            ),
            OrderResult::new(
                Uuid::from_u128(1),
                "ORD-1001",
                OrderStatus::Delivered,
                Price::tzs(Decimal::from(63_200)),
                vec![
                    "Puppy Dog Food 2kg".to_string(),
                    "Cat Scratching Post".to_string(),
                ],
                placed(2),
            ),
        ];

        Self {
            orders: HashMap::from([(UserId::new(user_id), orders)]),
        }
    }
}

#[async_trait]
impl OrderHistory for InMemoryOrders {
    async fn list_orders(
        &self,
        user_id: &UserId,
        status: Option<OrderStatus>,
    ) -> Result<Vec<OrderResult>, OrderLookupError> {
        Ok(self
            .orders
            .get(user_id)
            .map(|orders| {
                orders
                    .iter()
                    .filter(|o| status.is_none_or(|s| o.status == s))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Collaborators over the stocked catalog and one customer's orders.
#[must_use]
pub fn collaborators(user_id: &str) -> Collaborators {
    Collaborators {
        catalog: Arc::new(InMemoryCatalog::stocked()),
        orders: Arc::new(InMemoryOrders::for_user(user_id)),
    }
}

// =============================================================================
// Application state
// =============================================================================

/// Configuration that never touches the environment.
#[must_use]
pub fn test_config() -> StorefrontConfig {
    StorefrontConfig {
        database_url: SecretString::from("postgres://stephans@127.0.0.1:1/stephans_test"),
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 3000,
        base_url: "http://localhost:3000".to_string(),
        claude: ClaudeConfig {
            api_key: SecretString::from("sk-ant-REDACTED"),
            model: "claude-sonnet-4-5".to_string(),
        },
        agent: AgentConfig::default(),
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 0.0,
    }
}

/// State over a lazy pool pointing at a closed port.
///
/// Nothing on the chat path touches the pool; readiness fails fast.
#[must_use]
pub fn test_state(model: Arc<dyn LanguageModel>, collaborators: Collaborators) -> AppState {
    let pool = PgPoolOptions::new()
        .acquire_timeout(Duration::from_millis(250))
        .connect_lazy("postgres://stephans@127.0.0.1:1/stephans_test")
        .expect("lazy pool");

    AppState::new(test_config(), pool, model, collaborators)
}

/// JSON fragments of an SSE body, with `[DONE]` as a JSON string.
#[must_use]
pub fn sse_payloads(body: &str) -> Vec<Value> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap_or_else(|_| Value::String(data.to_string())))
        .collect()
}
