//! Shopping assistant ("Sky") for Stephan's Pet Store.
//!
//! One [`Dispatcher`] is built per chat request. It composes instructions and
//! a capability set from the caller's [`AgentIdentity`], then runs the Claude
//! tool loop and streams [`StreamFragment`]s back to the HTTP layer.
//!
//! # Capability gating
//!
//! `searchProducts` is always available. `getMyOrders` exists only when the
//! session carries a signed-in customer; for anonymous callers the capability
//! is never constructed, and the instructions tell the model to send the user
//! to sign in instead.

pub mod capabilities;
pub mod dispatcher;
pub mod identity;
pub mod instructions;
pub mod messages;
pub mod stream;
pub mod tools;

pub use capabilities::{Capability, CapabilitySet, Collaborators, build_capabilities};
pub use dispatcher::{DispatchError, Dispatcher};
pub use identity::AgentIdentity;
pub use instructions::compose_instructions;
pub use messages::{
    ChatRequestBody, ConversationContent, ConversationMessage, ConversationPart, ToolPartState,
};
pub use stream::StreamFragment;
pub use tools::ToolError;
