//! Local snapshot store.
//!
//! Holds the latest normalised contents of one collection and publishes
//! every new version to observers. Built on [`tokio::sync::watch`]:
//!
//! - New observers receive the current value immediately
//! - Slow observers may skip intermediate versions but never miss the latest
//! - Writers are serialised by the channel's lock, so a read-modify-write
//!   through [`SnapshotStore::modify`] is atomic with respect to every reader
//!   and every other writer
//!
//! Snapshots are handed out as `Arc<[T]>` and cannot be changed in place.

use std::sync::Arc;

use futures::Stream;
use tokio::sync::watch;

#[derive(Debug)]
struct Published<T> {
    version: u64,
    items: Arc<[T]>,
}

// =============================================================================
// Snapshot Store
// =============================================================================

/// Replay-latest store for one collection snapshot.
///
/// Cloning is cheap; clones publish to the same observers.
#[derive(Debug)]
pub struct SnapshotStore<T> {
    sender: Arc<watch::Sender<Published<T>>>,
}

impl<T> Clone for SnapshotStore<T> {
    fn clone(&self) -> Self {
        Self {
            sender: Arc::clone(&self.sender),
        }
    }
}

impl<T> Default for SnapshotStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SnapshotStore<T> {
    /// Creates an empty store at version 0.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(Published {
            version: 0,
            items: Arc::from(Vec::new()),
        });
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Returns the latest snapshot.
    #[must_use]
    pub fn current(&self) -> Arc<[T]> {
        Arc::clone(&self.sender.borrow().items)
    }

    /// Returns the number of versions published so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.sender.borrow().version
    }

    /// Starts observing the snapshot.
    ///
    /// The first call to [`SnapshotStream::next`] resolves immediately with
    /// the current snapshot.
    #[must_use]
    pub fn observe(&self) -> SnapshotStream<T> {
        SnapshotStream {
            receiver: self.sender.subscribe(),
            primed: false,
        }
    }

    /// Replaces the whole snapshot and publishes it.
    pub fn replace(&self, items: Vec<T>) {
        self.sender.send_modify(|published| {
            published.version += 1;
            published.items = Arc::from(items);
        });
    }

    /// Publishes an empty snapshot.
    pub fn clear(&self) {
        self.replace(Vec::new());
    }
}

impl<T: Clone> SnapshotStore<T> {
    /// Runs a read-modify-write on the snapshot.
    ///
    /// `change` receives a copy of the current items. Returning `Some` stores
    /// the edited copy and publishes it; returning `None` discards the copy
    /// and publishes nothing. No other writer can interleave with `change`.
    pub fn modify<R, F>(&self, change: F) -> Option<R>
    where
        F: FnOnce(&mut Vec<T>) -> Option<R>,
    {
        let mut outcome = None;
        self.sender.send_if_modified(|published| {
            let mut items = published.items.to_vec();
            match change(&mut items) {
                Some(result) => {
                    outcome = Some(result);
                    published.version += 1;
                    published.items = Arc::from(items);
                    true
                }
                None => false,
            }
        });
        outcome
    }
}

// =============================================================================
// Snapshot Stream
// =============================================================================

/// Observer handle returned by [`SnapshotStore::observe`].
#[derive(Debug)]
pub struct SnapshotStream<T> {
    receiver: watch::Receiver<Published<T>>,
    primed: bool,
}

impl<T> SnapshotStream<T> {
    /// Waits for the next snapshot.
    ///
    /// Returns `None` once every [`SnapshotStore`] handle has been dropped.
    pub async fn next(&mut self) -> Option<Arc<[T]>> {
        if self.primed {
            self.receiver.changed().await.ok()?;
        } else {
            self.primed = true;
        }
        Some(Arc::clone(&self.receiver.borrow_and_update().items))
    }

    /// Returns the version of the snapshot this observer saw last.
    #[must_use]
    pub fn seen_version(&self) -> u64 {
        self.receiver.borrow().version
    }
}

impl<T> SnapshotStream<T>
where
    T: Send + Sync + 'static,
{
    /// Converts the observer into a [`Stream`].
    pub fn into_stream(self) -> impl Stream<Item = Arc<[T]>> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            let items = stream.next().await?;
            Some((items, stream))
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
