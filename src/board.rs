//! Composition root.
//!
//! A [`Board`] wires one store and one identity provider into the task
//! snapshot, its listener, the mutation engine and the contact directory.
//! It also holds the daily quota that gates external submissions.
//! Nothing here is global; an application builds one board and passes it
//! (or the parts it needs) to its views.

use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::watch;

use crate::config::SyncConfig;
use crate::domain::{SubtaskId, Task, TaskDraft, TaskId, TaskSource, UserIdentity};
use crate::infrastructure::{
    DocumentStore, IdentityProvider, InMemoryDocumentStore, RngProvider,
};
use crate::sync::{
    BoardColumns, BoardStats, CollectionListener, ContactDirectory, DailyLimit, EngineError,
    MutationOutcome, PendingMutation, SnapshotStore, SnapshotStream, TaskEngine, ToggleDebouncer,
    by_status, newest_task_first, next_urgent_deadline, normalize_task, search, stats, urgent,
};

/// A connected task board.
#[derive(Debug)]
pub struct Board {
    tasks: SnapshotStore<Task>,
    task_listener: CollectionListener,
    engine: TaskEngine,
    contacts: ContactDirectory,
    debouncer: ToggleDebouncer,
    daily_limit: DailyLimit,
    auth: watch::Receiver<Option<UserIdentity>>,
    config: SyncConfig,
}

impl Board {
    /// Opens the task and contact subscriptions and builds the engine.
    ///
    /// Returns immediately; use [`Board::wait_live`] to wait for the first
    /// pushes.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn connect(
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
        config: SyncConfig,
    ) -> Self {
        let tasks = SnapshotStore::new();
        let task_listener = CollectionListener::spawn(
            Arc::clone(&store),
            config.tasks_collection.clone(),
            tasks.clone(),
            normalize_task,
            newest_task_first,
        );
        let auth = identity.on_auth_change();
        let engine = TaskEngine::new(
            Arc::clone(&store),
            tasks.clone(),
            identity,
            config.tasks_collection.clone(),
        );
        let daily_limit = DailyLimit::new(
            Arc::clone(&store),
            config.daily_limits_collection.clone(),
            config.daily_submission_limit,
        );
        let contacts = ContactDirectory::connect(store, config.contacts_collection.clone());
        tracing::info!(
            tasks = %config.tasks_collection,
            contacts = %config.contacts_collection,
            "Board connected"
        );
        Self {
            tasks,
            task_listener,
            engine,
            contacts,
            debouncer: ToggleDebouncer::new(config.subtask_debounce),
            daily_limit,
            auth,
            config,
        }
    }

    /// Connects to a fresh in-memory store with the configured fail injection.
    ///
    /// Returns the store too, so callers can seed or inspect it.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn in_memory(
        identity: Arc<dyn IdentityProvider>,
        config: SyncConfig,
    ) -> (Self, InMemoryDocumentStore) {
        let store =
            InMemoryDocumentStore::with_faults(config.store_faults.clone(), RngProvider::default());
        let board = Self::connect(Arc::new(store.clone()), identity, config);
        (board, store)
    }

    /// Waits until both subscriptions have delivered their first push.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SubscriptionFailed`] if either subscription
    /// fails first.
    pub async fn wait_live(&self) -> Result<(), EngineError> {
        self.task_listener.wait_live().await?;
        self.contacts.listener().wait_live().await
    }

    /// Returns the configuration the board was built with.
    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the latest task snapshot, newest first.
    #[must_use]
    pub fn tasks(&self) -> Arc<[Task]> {
        self.tasks.current()
    }

    /// Observes the task snapshot.
    #[must_use]
    pub fn observe_tasks(&self) -> SnapshotStream<Task> {
        self.tasks.observe()
    }

    /// Returns the listener feeding the task snapshot.
    #[must_use]
    pub const fn task_listener(&self) -> &CollectionListener {
        &self.task_listener
    }

    /// Returns the task mutation engine.
    #[must_use]
    pub const fn engine(&self) -> &TaskEngine {
        &self.engine
    }

    /// Returns the contact directory.
    #[must_use]
    pub const fn contacts(&self) -> &ContactDirectory {
        &self.contacts
    }

    /// Returns the subtask toggle debouncer.
    #[must_use]
    pub const fn debouncer(&self) -> &ToggleDebouncer {
        &self.debouncer
    }

    /// Returns the daily submission quota.
    #[must_use]
    pub const fn daily_limit(&self) -> &DailyLimit {
        &self.daily_limit
    }

    /// Returns the signed-in user as last reported by the identity provider.
    #[must_use]
    pub fn current_user(&self) -> Option<UserIdentity> {
        self.auth.borrow().clone()
    }

    /// Observes sign-ins and sign-outs.
    #[must_use]
    pub fn auth_changes(&self) -> watch::Receiver<Option<UserIdentity>> {
        self.auth.clone()
    }

    /// Board columns for the current snapshot.
    #[must_use]
    pub fn columns(&self) -> BoardColumns {
        by_status(&self.tasks())
    }

    /// Open urgent tasks in the current snapshot.
    #[must_use]
    pub fn urgent(&self) -> Vec<Task> {
        urgent(&self.tasks())
    }

    /// Tasks in the current snapshot matching `query`.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<Task> {
        search(&self.tasks(), query)
    }

    /// Earliest due date among open urgent tasks.
    #[must_use]
    pub fn next_urgent_deadline(&self) -> Option<NaiveDate> {
        next_urgent_deadline(&self.tasks())
    }

    /// Summary counts for the current snapshot.
    #[must_use]
    pub fn stats(&self) -> BoardStats {
        stats(&self.tasks())
    }

    /// Toggles a subtask unless the same subtask was toggled within the
    /// debounce window.
    pub fn toggle_subtask_debounced(
        &self,
        task_id: &TaskId,
        subtask_id: &SubtaskId,
    ) -> Option<PendingMutation> {
        self.debouncer
            .should_fire(task_id, subtask_id)
            .then(|| self.engine.toggle_subtask(task_id, subtask_id))
    }

    /// Creates a task on behalf of someone outside the board.
    ///
    /// The daily quota is checked first. The draft is marked as an external
    /// submission, and after a successful write the quota cache is dropped
    /// so the next check sees the backend's new count.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DailyLimitReached`] without writing when
    /// today's quota is used up, or whatever the creation itself fails with.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub async fn submit_external(
        &self,
        mut draft: TaskDraft,
    ) -> Result<MutationOutcome, EngineError> {
        let quota = self.daily_limit.fetch(false).await;
        if quota.is_limit_reached {
            tracing::warn!(
                count = quota.current_count,
                limit = quota.max_limit,
                "External submission rejected, daily limit reached"
            );
            return Err(EngineError::DailyLimitReached {
                limit: quota.max_limit,
            });
        }
        draft.source = TaskSource::External;
        let outcome = self.engine.create(draft).await?;
        self.daily_limit.invalidate();
        Ok(outcome)
    }
}

// =============================================================================
// Tests
// =============================================================================
