//! Session-based customer identity.
//!
//! The chat endpoint never rejects anonymous callers. It only needs to know
//! whether a customer is signed in, which decides the assistant's
//! capabilities.

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use crate::agent::AgentIdentity;
use crate::error::set_sentry_user;
use crate::models::{CurrentCustomer, session_keys};

/// Extractor that optionally gets the current customer.
///
/// Yields `None` without a session layer, for an empty or unreadable session,
/// and when the stored user ID is blank.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(OptionalAuth(customer): OptionalAuth) -> impl IntoResponse {
///     match customer {
///         Some(c) => format!("Hello, {}!", c.user_id),
///         None => "Hello, guest!".to_string(),
///     }
/// }
/// ```
pub struct OptionalAuth(pub Option<CurrentCustomer>);

impl OptionalAuth {
    /// Identity the assistant runs as.
    #[must_use]
    pub fn identity(&self) -> AgentIdentity {
        AgentIdentity::from(
            self.0
                .as_ref()
                .filter(|c| is_signed_in(c))
                .map(|c| c.user_id.clone()),
        )
    }
}

/// A stored customer with a blank user ID counts as signed out.
fn is_signed_in(customer: &CurrentCustomer) -> bool {
    !customer.user_id.as_str().trim().is_empty()
}

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(session) = parts.extensions.get::<Session>() else {
            return Ok(Self(None));
        };

        let customer = match session
            .get::<CurrentCustomer>(session_keys::CURRENT_CUSTOMER)
            .await
        {
            Ok(customer) => customer.filter(is_signed_in),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read session, treating caller as anonymous");
                None
            }
        };

        if let Some(customer) = &customer {
            set_sentry_user(&customer.user_id);
            tracing::Span::current().record("user_id", customer.user_id.as_str());
        }

        Ok(Self(customer))
    }
}

/// Store the signed-in customer in the session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_customer(
    session: &Session,
    customer: &CurrentCustomer,
) -> Result<(), tower_sessions::session::Error> {
    session
        .insert(session_keys::CURRENT_CUSTOMER, customer)
        .await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use stephans_core::UserId;
    use tower_sessions::MemoryStore;

    use super::*;

    #[test]
    fn test_identity_from_customer() {
        let auth = OptionalAuth(Some(CurrentCustomer {
            user_id: UserId::new("user_123"),
        }));
        assert_eq!(auth.identity().user_id(), Some(&UserId::new("user_123")));
        assert!(!OptionalAuth(None).identity().is_authenticated());
    }

    #[test]
    fn test_blank_user_id_is_anonymous() {
        for blank in ["", "   "] {
            let auth = OptionalAuth(Some(CurrentCustomer {
                user_id: UserId::new(blank),
            }));
            assert!(!auth.identity().is_authenticated());
        }
    }

    #[tokio::test]
    async fn test_session_with_blank_user_id_is_anonymous() {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);
        set_current_customer(
            &session,
            &CurrentCustomer {
                user_id: UserId::new(""),
            },
        )
        .await
        .expect("insert");

        let request = axum::http::Request::builder()
            .uri("/api/chat")
            .body(())
            .expect("request");
        let (mut parts, ()) = request.into_parts();
        parts.extensions.insert(session);

        let OptionalAuth(customer) = OptionalAuth::from_request_parts(&mut parts, &())
            .await
            .unwrap_or_else(|never| match never {});
        assert!(customer.is_none());
    }

    #[tokio::test]
    async fn test_no_session_layer_is_anonymous() {
        let request = axum::http::Request::builder()
            .uri("/api/chat")
            .body(())
            .expect("request");
        let (mut parts, ()) = request.into_parts();

        let OptionalAuth(customer) = OptionalAuth::from_request_parts(&mut parts, &())
            .await
            .unwrap_or_else(|never| match never {});
        assert!(customer.is_none());
    }
}
