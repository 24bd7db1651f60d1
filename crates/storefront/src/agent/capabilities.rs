//! Capability set: the tools one request's assistant may call.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use super::identity::AgentIdentity;
use super::tools::{GetMyOrdersTool, SearchProductsTool, ToolError, get_my_orders, search_products};
use crate::claude::Tool;
use crate::services::{OrderHistory, ProductCatalog};

/// Read-only collaborators the tools query.
#[derive(Clone)]
pub struct Collaborators {
    pub catalog: Arc<dyn ProductCatalog>,
    pub orders: Arc<dyn OrderHistory>,
}

/// One invocable tool.
#[derive(Clone)]
pub enum Capability {
    SearchProducts(SearchProductsTool),
    GetMyOrders(GetMyOrdersTool),
}

impl Capability {
    /// Tool name as the model sees it.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SearchProducts(_) => search_products::NAME,
            Self::GetMyOrders(_) => get_my_orders::NAME,
        }
    }

    /// Definition sent to the model.
    #[must_use]
    pub fn definition(&self) -> Tool {
        match self {
            Self::SearchProducts(_) => SearchProductsTool::definition(),
            Self::GetMyOrders(_) => GetMyOrdersTool::definition(),
        }
    }

    /// Run the tool.
    ///
    /// # Errors
    ///
    /// Returns the tool's error; callers turn it into an error payload.
    pub async fn invoke(&self, input: &Value) -> Result<Value, ToolError> {
        match self {
            Self::SearchProducts(tool) => tool.invoke(input).await,
            Self::GetMyOrders(tool) => tool.invoke(input).await,
        }
    }
}

/// Tools available to one request, keyed by name.
#[derive(Clone, Default)]
pub struct CapabilitySet {
    tools: BTreeMap<&'static str, Capability>,
}

impl CapabilitySet {
    fn insert(&mut self, capability: Capability) {
        self.tools.insert(capability.name(), capability);
    }

    /// Tool names, in stable order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.tools.keys().copied().collect()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.tools.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions for every tool, in stable order.
    #[must_use]
    pub fn definitions(&self) -> Vec<Tool> {
        self.tools.values().map(Capability::definition).collect()
    }

    /// Invoke a tool by name.
    ///
    /// # Errors
    ///
    /// Returns `ToolError::NotAvailable` for a name outside this set, or the
    /// tool's own error.
    pub async fn invoke(&self, name: &str, input: &Value) -> Result<Value, ToolError> {
        match self.get(name) {
            Some(capability) => capability.invoke(input).await,
            None => Err(ToolError::NotAvailable(name.to_string())),
        }
    }
}

/// Build the capability set for an identity.
///
/// `searchProducts` is always present; `getMyOrders` only for a signed-in
/// customer. The result depends on nothing but the identity.
#[must_use]
pub fn build_capabilities(identity: &AgentIdentity, collaborators: &Collaborators) -> CapabilitySet {
    let mut set = CapabilitySet::default();
    set.insert(Capability::SearchProducts(SearchProductsTool::new(
        Arc::clone(&collaborators.catalog),
    )));

    if let Some(tool) = GetMyOrdersTool::for_identity(identity, Arc::clone(&collaborators.orders)) {
        set.insert(Capability::GetMyOrders(tool));
    }

    set
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;
    use stephans_core::{OrderStatus, UserId};

    use super::*;
    use crate::services::{CatalogError, OrderLookupError, OrderResult, ProductQuery, ProductResult};

    struct EmptyCatalog;

    #[async_trait]
    impl ProductCatalog for EmptyCatalog {
        async fn search(&self, _query: &ProductQuery) -> Result<Vec<ProductResult>, CatalogError> {
            Ok(Vec::new())
        }
    }

    struct EmptyOrders;

    #[async_trait]
    impl OrderHistory for EmptyOrders {
        async fn list_orders(
            &self,
            _user_id: &UserId,
            _status: Option<OrderStatus>,
        ) -> Result<Vec<OrderResult>, OrderLookupError> {
            Ok(Vec::new())
        }
    }

    fn collaborators() -> Collaborators {
        Collaborators {
            catalog: Arc::new(EmptyCatalog),
            orders: Arc::new(EmptyOrders),
        }
    }

    #[test]
    fn test_anonymous_gets_search_only() {
        let set = build_capabilities(&AgentIdentity::anonymous(), &collaborators());
        assert_eq!(set.names(), vec!["searchProducts"]);
        assert!(!set.contains("getMyOrders"));
    }

    #[test]
    fn test_authenticated_gets_both() {
        let identity = AgentIdentity::authenticated(UserId::new("user_123"));
        let set = build_capabilities(&identity, &collaborators());
        assert_eq!(set.names(), vec!["getMyOrders", "searchProducts"]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_definitions_match_names() {
        let identity = AgentIdentity::authenticated(UserId::new("user_123"));
        let set = build_capabilities(&identity, &collaborators());
        let names: Vec<String> = set.definitions().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["getMyOrders", "searchProducts"]);
    }

    #[test]
    fn test_build_is_deterministic() {
        let identity = AgentIdentity::authenticated(UserId::new("user_123"));
        let a = build_capabilities(&identity, &collaborators());
        let b = build_capabilities(&identity, &collaborators());
        assert_eq!(a.names(), b.names());
        assert_eq!(a.definitions(), b.definitions());
    }

    #[tokio::test]
    async fn test_invoke_unknown_tool_is_not_available() {
        let set = build_capabilities(&AgentIdentity::anonymous(), &collaborators());
        let err = set
            .invoke("getMyOrders", &json!({}))
            .await
            .expect_err("not available");
        assert!(matches!(err, ToolError::NotAvailable(name) if name == "getMyOrders"));
    }
}
