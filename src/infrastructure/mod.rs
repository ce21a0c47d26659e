//! Infrastructure layer.
//!
//! - `store`: the remote document store contract
//! - `in_memory`: an in-memory store with fail injection
//! - `identity`: the identity provider contract

pub mod fail_injection;
pub mod identity;
pub mod in_memory;
pub mod store;

pub use fail_injection::{FailInjectionConfig, RngProvider, ScopedRng, apply_injection};
pub use identity::{IdentityProvider, SessionIdentity};
pub use in_memory::{InMemoryDocumentStore, WriteHold};
pub use store::{
    CollectionName, CollectionSubscription, Document, DocumentId, DocumentStore, StoreError,
    StoredDocument, SubscriptionEvent, is_server_timestamp, server_timestamp,
};
