//! Remote collection subscription.
//!
//! A [`CollectionListener`] keeps a [`SnapshotStore`] in step with one
//! collection. Every push from the store is normalised, sorted and written
//! to the snapshot as a whole; the listener never patches the snapshot
//! incrementally.
//!
//! When the subscription fails the snapshot is cleared and the listener
//! stops. It does not retry.

use std::cmp::Ordering;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::error::EngineError;
use super::snapshot::SnapshotStore;
use crate::infrastructure::{CollectionName, DocumentStore, StoreError, StoredDocument, SubscriptionEvent};

/// Lifecycle of a [`CollectionListener`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerState {
    /// Waiting for the first push.
    Connecting,
    /// At least one push has been applied.
    Live,
    /// The subscription failed; the snapshot was cleared.
    Failed(StoreError),
}

/// Background task feeding a snapshot from a collection subscription.
///
/// The task is aborted when the listener is dropped.
#[derive(Debug)]
pub struct CollectionListener {
    collection: CollectionName,
    state: watch::Receiver<ListenerState>,
    handle: JoinHandle<()>,
}

impl CollectionListener {
    /// Opens a subscription on `collection` and starts applying its pushes.
    ///
    /// `normalize` converts each stored document; `order` sorts the result
    /// before it is published.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn<T, N, O>(
        store: Arc<dyn DocumentStore>,
        collection: CollectionName,
        snapshot: SnapshotStore<T>,
        normalize: N,
        order: O,
    ) -> Self
    where
        T: Clone + Send + Sync + 'static,
        N: Fn(&StoredDocument) -> T + Send + 'static,
        O: Fn(&T, &T) -> Ordering + Send + 'static,
    {
        let (state_sender, state) = watch::channel(ListenerState::Connecting);
        let task_collection = collection.clone();

        let handle = tokio::spawn(async move {
            let collection = task_collection;
            let mut subscription = match store.subscribe(&collection).await {
                Ok(subscription) => subscription,
                Err(error) => {
                    tracing::error!(%collection, %error, "Failed to open subscription");
                    snapshot.clear();
                    state_sender.send_replace(ListenerState::Failed(error));
                    return;
                }
            };

            loop {
                match subscription.next().await {
                    SubscriptionEvent::Snapshot(documents) => {
                        let mut items: Vec<T> = documents.iter().map(&normalize).collect();
                        items.sort_by(&order);
                        tracing::debug!(%collection, count = items.len(), "Snapshot received");
                        snapshot.replace(items);
                        state_sender.send_if_modified(|state| {
                            if *state == ListenerState::Live {
                                false
                            } else {
                                *state = ListenerState::Live;
                                true
                            }
                        });
                    }
                    SubscriptionEvent::Failed(error) => {
                        tracing::error!(%collection, %error, "Subscription failed, clearing snapshot");
                        snapshot.clear();
                        state_sender.send_replace(ListenerState::Failed(error));
                        return;
                    }
                }
            }
        });

        Self {
            collection,
            state,
            handle,
        }
    }

    /// Returns the collection this listener follows.
    #[must_use]
    pub const fn collection(&self) -> &CollectionName {
        &self.collection
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> ListenerState {
        self.state.borrow().clone()
    }

    /// Returns a receiver that sees every state change.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ListenerState> {
        self.state.clone()
    }

    /// Waits until the first push has been applied.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SubscriptionFailed`] if the subscription fails
    /// first, or [`EngineError::Interrupted`] if the listener task is gone.
    pub async fn wait_live(&self) -> Result<(), EngineError> {
        let mut state = self.state.clone();
        let settled = state
            .wait_for(|state| *state != ListenerState::Connecting)
            .await
            .map_err(|_| EngineError::Interrupted("listener task ended".to_string()))?;
        match &*settled {
            ListenerState::Failed(error) => Err(EngineError::SubscriptionFailed(error.clone())),
            ListenerState::Live | ListenerState::Connecting => Ok(()),
        }
    }

    /// Waits until the subscription has failed and returns the reason.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Interrupted`] if the listener task ends
    /// without reporting a failure.
    pub async fn wait_failed(&self) -> Result<StoreError, EngineError> {
        let mut state = self.state.clone();
        let settled = state
            .wait_for(|state| matches!(state, ListenerState::Failed(_)))
            .await
            .map_err(|_| EngineError::Interrupted("listener task ended".to_string()))?;
        match &*settled {
            ListenerState::Failed(error) => Ok(error.clone()),
            ListenerState::Live | ListenerState::Connecting => {
                Err(EngineError::Interrupted("listener did not fail".to_string()))
            }
        }
    }
}

impl Drop for CollectionListener {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// =============================================================================
// Orderings
// =============================================================================

/// Newest first.
#[must_use]
pub fn newest_task_first(left: &crate::domain::Task, right: &crate::domain::Task) -> Ordering {
    right.created_at.cmp(&left.created_at)
}

/// Alphabetical by full name, ignoring case.
#[must_use]
pub fn contact_name_order(left: &crate::domain::Contact, right: &crate::domain::Contact) -> Ordering {
    left.full_name()
        .to_lowercase()
        .cmp(&right.full_name().to_lowercase())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Task;
    use crate::infrastructure::{DocumentId, InMemoryDocumentStore};
    use crate::sync::normalize::normalize_task;
    use rstest::rstest;
    use serde_json::json;

    fn tasks() -> CollectionName {
        CollectionName::new("tasks")
    }

    async fn seed(store: &InMemoryDocumentStore, id: &str, seconds: i64) {
        let document = json!({ "title": id, "createdAt": { "seconds": seconds } });
        store
            .set(&tasks(), &DocumentId::new(id), document.as_object().cloned().unwrap())
            .await
            .unwrap();
    }

    fn spawn_listener(store: &InMemoryDocumentStore, snapshot: &SnapshotStore<Task>) -> CollectionListener {
        CollectionListener::spawn(
            Arc::new(store.clone()),
            tasks(),
            snapshot.clone(),
            normalize_task,
            newest_task_first,
        )
    }

    #[rstest]
    #[tokio::test]
    async fn test_listener_publishes_sorted_snapshot() {
        let store = InMemoryDocumentStore::new();
        seed(&store, "old", 100).await;
        seed(&store, "new", 200).await;

        let snapshot = SnapshotStore::new();
        let listener = spawn_listener(&store, &snapshot);
        listener.wait_live().await.unwrap();

        let ids: Vec<String> = snapshot.current().iter().map(|task| task.id.to_string()).collect();
        assert_eq!(ids, vec!["new", "old"]);
        assert_eq!(listener.state(), ListenerState::Live);
    }

    #[rstest]
    #[tokio::test]
    async fn test_listener_follows_remote_changes() {
        let store = InMemoryDocumentStore::new();
        let snapshot = SnapshotStore::new();
        let listener = spawn_listener(&store, &snapshot);
        listener.wait_live().await.unwrap();
        assert!(snapshot.current().is_empty());

        let mut observer = snapshot.observe();
        let _ = observer.next().await;
        seed(&store, "1", 100).await;
        let pushed = observer.next().await.unwrap();
        assert_eq!(pushed.len(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_listener_clears_snapshot_on_failure() {
        let store = InMemoryDocumentStore::new();
        seed(&store, "1", 100).await;
        let snapshot = SnapshotStore::new();
        let listener = spawn_listener(&store, &snapshot);
        listener.wait_live().await.unwrap();
        assert_eq!(snapshot.current().len(), 1);

        let error = StoreError::PermissionDenied("revoked".to_string());
        store.sever_subscriptions(&tasks(), &error);
        assert_eq!(listener.wait_failed().await.unwrap(), error);
        assert!(snapshot.current().is_empty());
        assert_eq!(
            listener.wait_live().await,
            Err(EngineError::SubscriptionFailed(error))
        );
    }

    #[rstest]
    fn test_contact_order_ignores_case() {
        let anna = crate::domain::ContactDraft {
            first_name: "anna".to_string(),
            email: "a@x.com".to_string(),
            ..Default::default()
        }
        .into_contact();
        let ben = crate::domain::ContactDraft {
            first_name: "Ben".to_string(),
            email: "b@x.com".to_string(),
            ..Default::default()
        }
        .into_contact();
        assert_eq!(contact_name_order(&anna, &ben), Ordering::Less);
    }
}
