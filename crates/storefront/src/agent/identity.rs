//! Caller identity as seen by the shopping assistant.

use stephans_core::UserId;

/// Optional signed-in customer behind a chat request.
///
/// Nothing beyond the opaque user ID is read; presence alone decides which
/// capabilities the assistant gets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AgentIdentity(Option<UserId>);

impl AgentIdentity {
    /// No signed-in customer.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self(None)
    }

    /// A signed-in customer.
    #[must_use]
    pub const fn authenticated(user_id: UserId) -> Self {
        Self(Some(user_id))
    }

    /// The customer's ID, if signed in.
    #[must_use]
    pub const fn user_id(&self) -> Option<&UserId> {
        self.0.as_ref()
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.0.is_some()
    }
}

impl From<Option<UserId>> for AgentIdentity {
    fn from(user_id: Option<UserId>) -> Self {
        Self(user_id)
    }
}
