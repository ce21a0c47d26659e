//! In-memory document store.
//!
//! A process-local [`DocumentStore`] used by tests and by embedders that do
//! not have a backend. It behaves like the remote store the board expects:
//!
//! - Every successful write pushes the complete collection to all of that
//!   collection's subscribers, in write order
//! - `SERVER_TIMESTAMP` sentinels are materialised with the store's clock
//! - Writes can be delayed, failed or held back for testing

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use chrono::Utc;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::{OwnedRwLockWriteGuard, RwLock, mpsc};

use super::fail_injection::{FailInjectionConfig, RngProvider, apply_injection};
use super::store::{
    CollectionName, CollectionSubscription, Document, DocumentId, DocumentStore, StoreError,
    StoredDocument, SubscriptionEvent, is_server_timestamp,
};

type Collections = HashMap<CollectionName, BTreeMap<DocumentId, Document>>;
type Subscribers = HashMap<CollectionName, Vec<mpsc::UnboundedSender<SubscriptionEvent>>>;

// =============================================================================
// Write Hold
// =============================================================================

/// Blocks every write on the store until dropped.
///
/// Writes issued while the hold is alive wait for it; reads and
/// subscriptions are unaffected.
#[derive(Debug)]
pub struct WriteHold {
    _guard: OwnedRwLockWriteGuard<()>,
}

// =============================================================================
// In-Memory Document Store
// =============================================================================

/// In-memory implementation of [`DocumentStore`].
///
/// Cloning is cheap; clones share the same data and subscribers.
///
/// # Example
///
/// ```ignore
/// let store = InMemoryDocumentStore::new();
/// store.set(&"tasks".into(), &"1".into(), document).await?;
/// let mut subscription = store.subscribe(&"tasks".into()).await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    collections: RwLock<Collections>,
    subscribers: Mutex<Subscribers>,
    write_gate: Arc<RwLock<()>>,
    faults: FailInjectionConfig,
    rng: RngProvider,
    forced_failures: AtomicUsize,
    writes_received: AtomicU64,
}

#[derive(Debug, Clone, Copy)]
enum WriteKind {
    Set,
    Update,
    Delete,
}

impl WriteKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl InMemoryDocumentStore {
    /// Creates an empty store without fail injection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store that applies `faults` to every write.
    #[must_use]
    pub fn with_faults(faults: FailInjectionConfig, rng: RngProvider) -> Self {
        Self {
            inner: Arc::new(Inner {
                faults,
                rng,
                ..Inner::default()
            }),
        }
    }

    /// Makes the next `count` writes fail with [`StoreError::Unavailable`].
    pub fn fail_next_writes(&self, count: usize) {
        self.inner.forced_failures.store(count, Ordering::SeqCst);
    }

    /// Returns how many writes (`set`, `update`, `delete`) were issued.
    #[must_use]
    pub fn writes_received(&self) -> u64 {
        self.inner.writes_received.load(Ordering::SeqCst)
    }

    /// Holds back every write until the returned guard is dropped.
    pub async fn hold_writes(&self) -> WriteHold {
        let guard = Arc::clone(&self.inner.write_gate).write_owned().await;
        WriteHold { _guard: guard }
    }

    /// Fails every open subscription on `collection` with `error`.
    ///
    /// The subscriptions are closed afterwards; new subscriptions may be
    /// opened again.
    pub fn sever_subscriptions(&self, collection: &CollectionName, error: &StoreError) {
        let severed = self.inner.subscribers.lock().remove(collection);
        for sender in severed.into_iter().flatten() {
            let _ = sender.send(SubscriptionEvent::Failed(error.clone()));
        }
        tracing::warn!(%collection, %error, "Subscriptions severed");
    }

    /// Returns the number of open subscriptions on `collection`.
    #[must_use]
    pub fn subscriber_count(&self, collection: &CollectionName) -> usize {
        self.inner
            .subscribers
            .lock()
            .get(collection)
            .map_or(0, |senders| senders.iter().filter(|sender| !sender.is_closed()).count())
    }
}

impl Inner {
    fn take_forced_failure(&self) -> bool {
        self.forced_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
    }

    /// Pushes the full collection to every live subscriber, pruning closed ones.
    fn broadcast(&self, collection: &CollectionName, documents: &BTreeMap<DocumentId, Document>) {
        let mut subscribers = self.subscribers.lock();
        let Some(senders) = subscribers.get_mut(collection) else {
            return;
        };
        let snapshot = snapshot_of(documents);
        senders.retain(|sender| {
            sender
                .send(SubscriptionEvent::Snapshot(snapshot.clone()))
                .is_ok()
        });
    }

    fn register(
        &self,
        collection: &CollectionName,
        sender: mpsc::UnboundedSender<SubscriptionEvent>,
    ) {
        self.subscribers
            .lock()
            .entry(collection.clone())
            .or_default()
            .push(sender);
    }

    async fn write<F>(
        &self,
        kind: WriteKind,
        collection: CollectionName,
        id: DocumentId,
        apply: F,
    ) -> Result<(), StoreError>
    where
        F: FnOnce(&mut BTreeMap<DocumentId, Document>) -> Result<(), StoreError> + Send,
    {
        self.writes_received.fetch_add(1, Ordering::SeqCst);
        let _gate = self.write_gate.read().await;

        if self.faults.is_enabled() {
            let mut rng = self
                .rng
                .for_operation(collection.as_str(), id.as_str(), kind.as_str());
            if let Err(error) = apply_injection(&self.faults, &mut rng).await {
                tracing::warn!(%collection, document_id = %id, operation = kind.as_str(), %error, "Injected write failure");
                return Err(error);
            }
        }

        if self.take_forced_failure() {
            tracing::warn!(%collection, document_id = %id, operation = kind.as_str(), "Forced write failure");
            return Err(StoreError::Unavailable("forced write failure".to_string()));
        }

        let mut collections = self.collections.write().await;
        let documents = collections.entry(collection.clone()).or_default();
        apply(documents)?;
        self.broadcast(&collection, documents);
        drop(collections);

        tracing::debug!(%collection, document_id = %id, operation = kind.as_str(), "Write applied");
        Ok(())
    }
}

fn snapshot_of(documents: &BTreeMap<DocumentId, Document>) -> Vec<StoredDocument> {
    documents
        .iter()
        .map(|(id, data)| StoredDocument::new(id.clone(), data.clone()))
        .collect()
}

/// Replaces every server timestamp sentinel in `document` with the current
/// time, encoded as a store-native timestamp object.
fn materialize_server_timestamps(document: &mut Document) {
    let now = Utc::now();
    let stamp = json!({
        "seconds": now.timestamp(),
        "nanoseconds": now.timestamp_subsec_nanos(),
    });
    for value in document.values_mut() {
        replace_sentinels(value, &stamp);
    }
}

fn replace_sentinels(value: &mut Value, stamp: &Value) {
    if is_server_timestamp(value) {
        *value = stamp.clone();
        return;
    }
    match value {
        Value::Object(object) => {
            for nested in object.values_mut() {
                replace_sentinels(nested, stamp);
            }
        }
        Value::Array(items) => {
            for nested in items {
                replace_sentinels(nested, stamp);
            }
        }
        _ => {}
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn get_all(
        &self,
        collection: &CollectionName,
    ) -> BoxFuture<'static, Result<Vec<StoredDocument>, StoreError>> {
        let inner = Arc::clone(&self.inner);
        let collection = collection.clone();
        async move {
            let collections = inner.collections.read().await;
            Ok(collections
                .get(&collection)
                .map(snapshot_of)
                .unwrap_or_default())
        }
        .boxed()
    }

    fn subscribe(
        &self,
        collection: &CollectionName,
    ) -> BoxFuture<'static, Result<CollectionSubscription, StoreError>> {
        let inner = Arc::clone(&self.inner);
        let collection = collection.clone();
        async move {
            let (sender, receiver) = mpsc::unbounded_channel();
            // Holding the read lock orders the initial snapshot before any
            // later write's broadcast.
            let collections = inner.collections.read().await;
            let initial = collections
                .get(&collection)
                .map(snapshot_of)
                .unwrap_or_default();
            sender
                .send(SubscriptionEvent::Snapshot(initial))
                .map_err(|_| StoreError::Closed)?;
            inner.register(&collection, sender);
            drop(collections);

            tracing::debug!(%collection, "Subscription opened");
            Ok(CollectionSubscription::new(receiver))
        }
        .boxed()
    }

    fn set(
        &self,
        collection: &CollectionName,
        id: &DocumentId,
        document: Document,
    ) -> BoxFuture<'static, Result<(), StoreError>> {
        let inner = Arc::clone(&self.inner);
        let collection = collection.clone();
        let id = id.clone();
        async move {
            let key = id.clone();
            inner
                .write(WriteKind::Set, collection, id, move |documents| {
                    let mut document = document;
                    materialize_server_timestamps(&mut document);
                    documents.insert(key, document);
                    Ok(())
                })
                .await
        }
        .boxed()
    }

    fn update(
        &self,
        collection: &CollectionName,
        id: &DocumentId,
        fields: Document,
    ) -> BoxFuture<'static, Result<(), StoreError>> {
        let inner = Arc::clone(&self.inner);
        let collection = collection.clone();
        let id = id.clone();
        async move {
            let key = id.clone();
            let collection_name = collection.to_string();
            inner
                .write(WriteKind::Update, collection, id, move |documents| {
                    let Some(existing) = documents.get_mut(&key) else {
                        return Err(StoreError::NotFound {
                            collection: collection_name,
                            id: key.to_string(),
                        });
                    };
                    let mut fields = fields;
                    materialize_server_timestamps(&mut fields);
                    existing.extend(fields);
                    Ok(())
                })
                .await
        }
        .boxed()
    }

    fn delete(
        &self,
        collection: &CollectionName,
        id: &DocumentId,
    ) -> BoxFuture<'static, Result<(), StoreError>> {
        let inner = Arc::clone(&self.inner);
        let collection = collection.clone();
        let id = id.clone();
        async move {
            let key = id.clone();
            inner
                .write(WriteKind::Delete, collection, id, move |documents| {
                    documents.remove(&key);
                    Ok(())
                })
                .await
        }
        .boxed()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::store::server_timestamp;
    use rstest::rstest;

    fn tasks() -> CollectionName {
        CollectionName::new("tasks")
    }

    fn document(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    async fn next_snapshot(subscription: &mut CollectionSubscription) -> Vec<StoredDocument> {
        match subscription.next().await {
            SubscriptionEvent::Snapshot(documents) => documents,
            SubscriptionEvent::Failed(error) => panic!("unexpected failure: {error}"),
        }
    }

    #[rstest]
    #[tokio::test]
    async fn test_set_then_get_all() {
        let store = InMemoryDocumentStore::new();
        store
            .set(&tasks(), &"1".into(), document(json!({ "title": "A" })))
            .await
            .unwrap();
        let all = store.get_all(&tasks()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id.as_str(), "1");
        assert_eq!(all[0].data["title"], json!("A"));
    }

    #[rstest]
    #[tokio::test]
    async fn test_get_all_on_unknown_collection_is_empty() {
        let store = InMemoryDocumentStore::new();
        assert!(store.get_all(&"nothing".into()).await.unwrap().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn test_subscribe_delivers_initial_and_later_snapshots() {
        let store = InMemoryDocumentStore::new();
        store
            .set(&tasks(), &"1".into(), document(json!({ "title": "A" })))
            .await
            .unwrap();

        let mut subscription = store.subscribe(&tasks()).await.unwrap();
        assert_eq!(next_snapshot(&mut subscription).await.len(), 1);

        store
            .set(&tasks(), &"2".into(), document(json!({ "title": "B" })))
            .await
            .unwrap();
        assert_eq!(next_snapshot(&mut subscription).await.len(), 2);

        store.delete(&tasks(), &"1".into()).await.unwrap();
        let after_delete = next_snapshot(&mut subscription).await;
        assert_eq!(after_delete.len(), 1);
        assert_eq!(after_delete[0].id.as_str(), "2");
    }

    #[rstest]
    #[tokio::test]
    async fn test_update_merges_fields() {
        let store = InMemoryDocumentStore::new();
        store
            .set(
                &tasks(),
                &"1".into(),
                document(json!({ "title": "A", "status": "todo" })),
            )
            .await
            .unwrap();
        store
            .update(&tasks(), &"1".into(), document(json!({ "status": "done" })))
            .await
            .unwrap();
        let all = store.get_all(&tasks()).await.unwrap();
        assert_eq!(all[0].data["title"], json!("A"));
        assert_eq!(all[0].data["status"], json!("done"));
    }

    #[rstest]
    #[tokio::test]
    async fn test_update_missing_document_fails() {
        let store = InMemoryDocumentStore::new();
        let result = store
            .update(&tasks(), &"404".into(), document(json!({ "status": "done" })))
            .await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[rstest]
    #[tokio::test]
    async fn test_server_timestamp_is_materialized() {
        let store = InMemoryDocumentStore::new();
        store
            .set(
                &tasks(),
                &"1".into(),
                document(json!({ "createdAt": server_timestamp() })),
            )
            .await
            .unwrap();
        let all = store.get_all(&tasks()).await.unwrap();
        let created_at = &all[0].data["createdAt"];
        assert!(created_at["seconds"].as_i64().unwrap() > 0);
        assert!(created_at.get(".sv").is_none());
    }

    #[rstest]
    #[tokio::test]
    async fn test_forced_failures_are_consumed() {
        let store = InMemoryDocumentStore::new();
        store.fail_next_writes(1);
        let first = store
            .set(&tasks(), &"1".into(), document(json!({})))
            .await;
        assert!(matches!(first, Err(StoreError::Unavailable(_))));
        let second = store
            .set(&tasks(), &"1".into(), document(json!({})))
            .await;
        assert!(second.is_ok());
        assert_eq!(store.writes_received(), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn test_injected_failure_leaves_data_untouched() {
        let faults = FailInjectionConfig::default().with_failure_rate(1.0);
        let store = InMemoryDocumentStore::with_faults(faults, RngProvider::new_seeded(1));
        let result = store
            .set(&tasks(), &"1".into(), document(json!({ "title": "A" })))
            .await;
        assert!(matches!(result, Err(StoreError::InjectedFailure(_))));
        assert!(store.get_all(&tasks()).await.unwrap().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn test_sever_subscriptions_reports_error() {
        let store = InMemoryDocumentStore::new();
        let mut subscription = store.subscribe(&tasks()).await.unwrap();
        let _ = next_snapshot(&mut subscription).await;
        assert_eq!(store.subscriber_count(&tasks()), 1);

        let error = StoreError::PermissionDenied("revoked".to_string());
        store.sever_subscriptions(&tasks(), &error);
        assert_eq!(subscription.next().await, SubscriptionEvent::Failed(error));
        assert_eq!(store.subscriber_count(&tasks()), 0);
    }

    #[rstest]
    #[tokio::test]
    async fn test_hold_writes_blocks_until_released() {
        let store = InMemoryDocumentStore::new();
        let hold = store.hold_writes().await;

        let writer = tokio::spawn({
            let store = store.clone();
            async move {
                store
                    .set(&tasks(), &"1".into(), document(json!({ "title": "A" })))
                    .await
            }
        });
        tokio::task::yield_now().await;
        assert!(store.get_all(&tasks()).await.unwrap().is_empty());

        drop(hold);
        writer.await.unwrap().unwrap();
        assert_eq!(store.get_all(&tasks()).await.unwrap().len(), 1);
    }
}
