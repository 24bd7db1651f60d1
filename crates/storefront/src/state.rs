//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::agent::{AgentIdentity, Collaborators, Dispatcher};
use crate::claude::{ClaudeClient, ClaudeError, LanguageModel};
use crate::config::StorefrontConfig;
use crate::db::{PostgresCatalog, PostgresOrderHistory};
use crate::services::CachedCatalog;

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`. Holds only long-lived, request-independent
/// resources; per-request assistant state lives in [`Dispatcher`].
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    model: Arc<dyn LanguageModel>,
    collaborators: Collaborators,
}

impl AppState {
    /// Assemble state from explicit parts.
    #[must_use]
    pub fn new(
        config: StorefrontConfig,
        pool: PgPool,
        model: Arc<dyn LanguageModel>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                model,
                collaborators,
            }),
        }
    }

    /// Wire the production model, catalog and order history.
    ///
    /// # Errors
    ///
    /// Returns an error if the Claude client cannot be built.
    pub fn from_config(config: StorefrontConfig, pool: PgPool) -> Result<Self, ClaudeError> {
        let model = Arc::new(ClaudeClient::new(&config.claude)?);
        let collaborators = Collaborators {
            catalog: Arc::new(CachedCatalog::new(PostgresCatalog::new(pool.clone()))),
            orders: Arc::new(PostgresOrderHistory::new(pool.clone())),
        };

        Ok(Self::new(config, pool, model, collaborators))
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Build the dispatcher for one chat request.
    #[must_use]
    pub fn dispatcher(&self, identity: &AgentIdentity) -> Dispatcher {
        Dispatcher::new(
            identity,
            Arc::clone(&self.inner.model),
            &self.inner.collaborators,
            self.inner.config.agent,
        )
    }
}
