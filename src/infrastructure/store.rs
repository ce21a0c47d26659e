//! Remote document store contract.
//!
//! The board treats its backend as a schemaless document store addressed by
//! collection name and document id. Every method returns a boxed future so
//! implementations can sit behind an `Arc<dyn DocumentStore>` and be swapped
//! for the in-memory store in tests.

use futures::future::BoxFuture;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tokio::sync::mpsc;

// =============================================================================
// Documents
// =============================================================================

/// A schemaless document body.
pub type Document = Map<String, Value>;

/// Field value replaced by the store with its own clock at write time.
///
/// Stores encode the resulting time as a store-native timestamp object
/// (`{"seconds": i64, "nanoseconds": u32}`).
#[must_use]
pub fn server_timestamp() -> Value {
    json!({ ".sv": "timestamp" })
}

/// Returns `true` if the value is the server timestamp sentinel.
#[must_use]
pub fn is_server_timestamp(value: &Value) -> bool {
    value
        .as_object()
        .and_then(|object| object.get(".sv"))
        .and_then(Value::as_str)
        == Some("timestamp")
}

/// Name of a collection (e.g. `"tasks"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CollectionName(String);

impl CollectionName {
    /// Creates a collection name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CollectionName {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<&str> for CollectionName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Id of a document within a collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentId(String);

impl DocumentId {
    /// Creates a document id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A document together with its id, as delivered by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// Document id.
    pub id: DocumentId,
    /// Document body.
    pub data: Document,
}

impl StoredDocument {
    /// Creates a stored document.
    #[must_use]
    pub const fn new(id: DocumentId, data: Document) -> Self {
        Self { id, data }
    }
}

// =============================================================================
// Store Error
// =============================================================================

/// Errors reported by a document store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The addressed document does not exist.
    #[error("Document not found: {collection}/{id}")]
    NotFound {
        /// Collection name.
        collection: String,
        /// Document id.
        id: String,
    },

    /// The caller is not allowed to perform the operation.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The operation did not complete in time.
    #[error("Timeout after {0}ms")]
    Timeout(u64),

    /// Failure injected for testing purposes.
    #[error("Injected failure: {0}")]
    InjectedFailure(String),

    /// A document could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The subscription channel was closed by the store.
    #[error("Subscription closed")]
    Closed,
}

// =============================================================================
// Subscriptions
// =============================================================================

/// A message pushed by a collection subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    /// The complete current contents of the collection.
    Snapshot(Vec<StoredDocument>),
    /// The channel failed; no further events follow.
    Failed(StoreError),
}

/// A long-lived channel streaming the full contents of one collection.
///
/// The first event is delivered on open; later events follow every remote
/// change, in the order the store emitted them.
#[derive(Debug)]
pub struct CollectionSubscription {
    receiver: mpsc::UnboundedReceiver<SubscriptionEvent>,
}

impl CollectionSubscription {
    /// Wraps a receiver fed by a store implementation.
    #[must_use]
    pub const fn new(receiver: mpsc::UnboundedReceiver<SubscriptionEvent>) -> Self {
        Self { receiver }
    }

    /// Waits for the next event.
    ///
    /// A channel closed by the store is reported as
    /// `SubscriptionEvent::Failed(StoreError::Closed)`.
    pub async fn next(&mut self) -> SubscriptionEvent {
        self.receiver
            .recv()
            .await
            .unwrap_or(SubscriptionEvent::Failed(StoreError::Closed))
    }
}

// =============================================================================
// Document Store
// =============================================================================

/// A remote, schemaless document store.
pub trait DocumentStore: Send + Sync {
    /// Fetches every document in a collection.
    fn get_all(
        &self,
        collection: &CollectionName,
    ) -> BoxFuture<'static, Result<Vec<StoredDocument>, StoreError>>;

    /// Opens a live subscription to a collection.
    fn subscribe(
        &self,
        collection: &CollectionName,
    ) -> BoxFuture<'static, Result<CollectionSubscription, StoreError>>;

    /// Writes a document, replacing any existing body.
    fn set(
        &self,
        collection: &CollectionName,
        id: &DocumentId,
        document: Document,
    ) -> BoxFuture<'static, Result<(), StoreError>>;

    /// Merges fields into an existing document.
    ///
    /// Fails with [`StoreError::NotFound`] if the document does not exist.
    fn update(
        &self,
        collection: &CollectionName,
        id: &DocumentId,
        fields: Document,
    ) -> BoxFuture<'static, Result<(), StoreError>>;

    /// Deletes a document. Deleting a missing document succeeds.
    fn delete(
        &self,
        collection: &CollectionName,
        id: &DocumentId,
    ) -> BoxFuture<'static, Result<(), StoreError>>;
}

// =============================================================================
// Tests
// =============================================================================
