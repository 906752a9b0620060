//! Infrastructure adapters for external systems.

pub mod identity;
pub mod sqlite;
pub mod webhook;

pub use identity::StaticIdentityResolver;
pub use webhook::HttpChatWebhook;
