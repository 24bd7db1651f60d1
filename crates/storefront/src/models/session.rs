//! Types stored in the session for authentication state.
//!
//! Sign-in happens elsewhere on the site; this service only reads the
//! customer it wrote into the shared session store.

use serde::{Deserialize, Serialize};

use stephans_core::UserId;

/// Session-stored customer identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentCustomer {
    /// Customer ID, matching `order.user_id`.
    pub user_id: UserId,
}

/// Session keys for authentication data.
pub mod session_keys {
    /// Key for the signed-in customer.
    pub const CURRENT_CUSTOMER: &str = "current_customer";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_customer_serde() {
        let customer = CurrentCustomer {
            user_id: UserId::new("user_123"),
        };
        let json = serde_json::to_string(&customer).expect("serialize");
        assert_eq!(json, r#"{"user_id":"user_123"}"#);
        let back: CurrentCustomer = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, customer);
    }
}
