//! Optimistic mutation engine for tasks.
//!
//! Every mutating operation returns a [`PendingMutation`] right away. The
//! remote write runs on a spawned task, so callers may drop the handle and
//! forget about it; awaiting it reports how the operation ended.
//!
//! Status and subtask completion changes are optimistic: the local snapshot
//! is edited and republished before the operation returns, and restored if
//! the store rejects the write. Other operations write remotely only and
//! wait for the subscription to bring the result back.
//!
//! # Concurrency
//!
//! There is no per-record lock. Concurrent writes to the same task are
//! last-writer-wins at the store. A revert only restores the previous
//! value while the snapshot still shows the optimistic one, so a failed
//! write never undoes a newer local mutation or subscription push.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::task::JoinHandle;

use super::error::EngineError;
use super::normalize::{patch_to_document, subtasks_document, task_to_document};
use super::reconcile::{LocalChange, Reconciliation, apply_then_reconcile};
use super::snapshot::SnapshotStore;
use crate::domain::{
    ANONYMOUS_UID, Creator, Status, Subtask, SubtaskId, Task, TaskDraft, TaskId, TaskPatch,
    Timestamp,
};
use crate::infrastructure::{
    CollectionName, Document, DocumentId, DocumentStore, IdentityProvider, StoreError,
    server_timestamp,
};

// =============================================================================
// Outcomes
// =============================================================================

/// Why an operation left everything as it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnchangedReason {
    /// The record is not in the local snapshot.
    Missing,
    /// The record already holds the requested value.
    AlreadyApplied,
    /// The patch contained no fields.
    EmptyPatch,
}

/// How a successful operation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// A task was written under the given id.
    Created(TaskId),
    /// A subtask was appended under the given id.
    SubtaskAdded(SubtaskId),
    /// The write was accepted by the store.
    Applied,
    /// Nothing was written.
    Unchanged(UnchangedReason),
}

// =============================================================================
// Pending Mutation
// =============================================================================

/// Handle to an issued mutation.
///
/// Resolves once the remote write has finished (and, on failure, after the
/// local revert). Dropping the handle does not cancel the write.
#[derive(Debug)]
#[must_use = "the mutation runs regardless, but its outcome is only visible by awaiting"]
pub struct PendingMutation {
    state: PendingState,
}

#[derive(Debug)]
enum PendingState {
    Ready(Option<Result<MutationOutcome, EngineError>>),
    Spawned(JoinHandle<Result<MutationOutcome, EngineError>>),
}

impl PendingMutation {
    /// A mutation that finished without touching the store.
    pub const fn ready(result: Result<MutationOutcome, EngineError>) -> Self {
        Self {
            state: PendingState::Ready(Some(result)),
        }
    }

    /// Runs `operation` on a new Tokio task.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn<F>(operation: F) -> Self
    where
        F: Future<Output = Result<MutationOutcome, EngineError>> + Send + 'static,
    {
        Self {
            state: PendingState::Spawned(tokio::spawn(operation)),
        }
    }

    /// Returns `true` if the outcome is already known without awaiting.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self.state, PendingState::Ready(_))
    }
}

impl Future for PendingMutation {
    type Output = Result<MutationOutcome, EngineError>;

    fn poll(self: Pin<&mut Self>, context: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            PendingState::Ready(result) => Poll::Ready(result.take().unwrap_or_else(|| {
                Err(EngineError::Interrupted(
                    "mutation polled after completion".to_string(),
                ))
            })),
            PendingState::Spawned(handle) => Pin::new(handle).poll(context).map(|joined| {
                joined.unwrap_or_else(|error| Err(EngineError::Interrupted(error.to_string())))
            }),
        }
    }
}

// =============================================================================
// Task Engine
// =============================================================================

/// Issues task mutations against the store and the local snapshot.
///
/// Cloning is cheap; clones share the store, snapshot and identity.
#[derive(Clone)]
pub struct TaskEngine {
    store: Arc<dyn DocumentStore>,
    tasks: SnapshotStore<Task>,
    identity: Arc<dyn IdentityProvider>,
    collection: CollectionName,
}

impl std::fmt::Debug for TaskEngine {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("TaskEngine")
            .field("collection", &self.collection)
            .field("snapshot_version", &self.tasks.version())
            .finish_non_exhaustive()
    }
}

fn with_updated_at(mut document: Document) -> Document {
    document.insert("updatedAt".into(), server_timestamp());
    document
}

impl TaskEngine {
    /// Creates an engine writing to `collection` and editing `tasks`.
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        tasks: SnapshotStore<Task>,
        identity: Arc<dyn IdentityProvider>,
        collection: CollectionName,
    ) -> Self {
        Self {
            store,
            tasks,
            identity,
            collection,
        }
    }

    /// Returns the snapshot this engine edits.
    #[must_use]
    pub const fn snapshot(&self) -> &SnapshotStore<Task> {
        &self.tasks
    }

    /// Returns the task with the given id from the current snapshot.
    #[must_use]
    pub fn task(&self, task_id: &TaskId) -> Option<Task> {
        self.tasks
            .current()
            .iter()
            .find(|task| &task.id == task_id)
            .cloned()
    }

    fn document_id(task_id: &TaskId) -> DocumentId {
        DocumentId::new(task_id.as_str())
    }

    fn remote_update(
        &self,
        task_id: &TaskId,
        fields: Document,
    ) -> BoxFuture<'static, Result<(), StoreError>> {
        self.store
            .update(&self.collection, &Self::document_id(task_id), with_updated_at(fields))
    }

    // -------------------------------------------------------------------------
    // Create
    // -------------------------------------------------------------------------

    /// Writes a new task.
    ///
    /// The id is generated here. `createdAt` and `updatedAt` are stamped by
    /// the store and `createdBy` is the signed-in uid (or `"anonymous"`).
    /// The snapshot is not touched; the task appears with the next push.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn create(&self, draft: TaskDraft) -> PendingMutation {
        let task_id = TaskId::generate();
        let created_by = self
            .identity
            .current_user()
            .map_or_else(|| ANONYMOUS_UID.to_string(), |user| user.uid);

        let task = Task {
            id: task_id.clone(),
            title: draft.title,
            description: draft.description,
            category: draft.category,
            priority: draft.priority,
            status: draft.status,
            assigned_to: draft.assigned_to,
            due_date: draft.due_date,
            subtasks: draft.subtasks,
            created_at: Timestamp::now(),
            updated_at: None,
            source: draft.source,
            creator: Creator {
                created_by: Some(created_by),
                creator_type: draft.source,
                name: draft.creator_name,
                email: draft.creator_email,
            },
        };
        let mut document = task_to_document(&task);
        document.insert("createdAt".into(), server_timestamp());
        document.insert("updatedAt".into(), server_timestamp());

        tracing::info!(task_id = %task_id, status = task.status.as_str(), "Creating task");
        let write = self
            .store
            .set(&self.collection, &Self::document_id(&task_id), document);
        PendingMutation::spawn(async move {
            match write.await {
                Ok(()) => Ok(MutationOutcome::Created(task_id)),
                Err(error) => {
                    tracing::warn!(task_id = %task_id, %error, "Task creation failed");
                    Err(EngineError::RemoteWriteFailed(error))
                }
            }
        })
    }

    // -------------------------------------------------------------------------
    // Status
    // -------------------------------------------------------------------------

    /// Moves a task to another workflow stage.
    ///
    /// The snapshot shows the new status before this returns. A missing task
    /// or an unchanged status resolves to [`MutationOutcome::Unchanged`]
    /// without any remote write. If the store rejects the write the previous
    /// status is restored and the handle resolves to
    /// [`EngineError::RemoteWriteFailed`].
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn update_status(&self, task_id: &TaskId, status: Status) -> PendingMutation {
        let revert_snapshot = self.tasks.clone();
        let revert_id = task_id.clone();

        let reconciliation = apply_then_reconcile(
            || {
                let mut skipped = UnchangedReason::Missing;
                let previous = self.tasks.modify(|tasks| {
                    let task = tasks.iter_mut().find(|task| &task.id == task_id)?;
                    if task.status == status {
                        skipped = UnchangedReason::AlreadyApplied;
                        return None;
                    }
                    Some(std::mem::replace(&mut task.status, status))
                });
                previous.map_or(LocalChange::Skipped(skipped), LocalChange::Applied)
            },
            |_: &Status| {
                let mut fields = Document::new();
                fields.insert("status".into(), Value::String(status.as_str().into()));
                self.remote_update(task_id, fields)
            },
            move |previous: Status, error: &StoreError| {
                tracing::warn!(task_id = %revert_id, status = status.as_str(), %error, "Status update failed, reverting");
                let restored = revert_snapshot.modify(|tasks| {
                    let task = tasks
                        .iter_mut()
                        .find(|task| task.id == revert_id && task.status == status)?;
                    task.status = previous;
                    Some(())
                });
                if restored.is_none() {
                    tracing::debug!(task_id = %revert_id, "Task changed since the optimistic update, revert skipped");
                }
            },
        );

        match reconciliation {
            Reconciliation::Skipped(reason) => {
                if reason == UnchangedReason::Missing {
                    tracing::info!(task_id = %task_id, "Status update for a task that is not in the snapshot");
                }
                PendingMutation::ready(Ok(MutationOutcome::Unchanged(reason)))
            }
            Reconciliation::InFlight(commit) => {
                tracing::debug!(task_id = %task_id, status = status.as_str(), "Status applied locally");
                PendingMutation::spawn(async move {
                    commit
                        .await
                        .map(|()| MutationOutcome::Applied)
                        .map_err(EngineError::RemoteWriteFailed)
                })
            }
        }
    }

    // -------------------------------------------------------------------------
    // Subtasks
    // -------------------------------------------------------------------------

    /// Sets the completed flag of one subtask.
    ///
    /// Follows the same optimistic discipline as [`update_status`]. The
    /// remote write carries the whole subtask list. A missing task or
    /// subtask resolves to [`EngineError::NotFound`].
    ///
    /// [`update_status`]: Self::update_status
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn update_subtask_completion(
        &self,
        task_id: &TaskId,
        subtask_id: &SubtaskId,
        completed: bool,
    ) -> PendingMutation {
        let revert_snapshot = self.tasks.clone();
        let revert_task_id = task_id.clone();
        let revert_subtask_id = subtask_id.clone();

        let reconciliation = apply_then_reconcile(
            || {
                let mut skipped = Err(EngineError::not_found("task", task_id));
                let subtasks = self.tasks.modify(|tasks| {
                    let task = tasks.iter_mut().find(|task| &task.id == task_id)?;
                    let Some(subtask) = task
                        .subtasks
                        .iter_mut()
                        .find(|subtask| &subtask.id == subtask_id)
                    else {
                        skipped = Err(EngineError::not_found("subtask", subtask_id));
                        return None;
                    };
                    if subtask.completed == completed {
                        skipped = Ok(UnchangedReason::AlreadyApplied);
                        return None;
                    }
                    subtask.completed = completed;
                    Some(task.subtasks.clone())
                });
                subtasks.map_or(LocalChange::Skipped(skipped), LocalChange::Applied)
            },
            |subtasks: &Vec<Subtask>| self.remote_update(task_id, subtasks_document(subtasks)),
            move |_: Vec<Subtask>, error: &StoreError| {
                tracing::warn!(task_id = %revert_task_id, subtask_id = %revert_subtask_id, %error, "Subtask update failed, reverting");
                let restored = revert_snapshot.modify(|tasks| {
                    let subtask = tasks
                        .iter_mut()
                        .find(|task| task.id == revert_task_id)?
                        .subtasks
                        .iter_mut()
                        .find(|subtask| {
                            subtask.id == revert_subtask_id && subtask.completed == completed
                        })?;
                    subtask.completed = !completed;
                    Some(())
                });
                if restored.is_none() {
                    tracing::debug!(task_id = %revert_task_id, "Subtask changed since the optimistic update, revert skipped");
                }
            },
        );

        match reconciliation {
            Reconciliation::Skipped(Ok(reason)) => {
                PendingMutation::ready(Ok(MutationOutcome::Unchanged(reason)))
            }
            Reconciliation::Skipped(Err(error)) => {
                tracing::warn!(task_id = %task_id, subtask_id = %subtask_id, %error, "Subtask update rejected");
                PendingMutation::ready(Err(error))
            }
            Reconciliation::InFlight(commit) => PendingMutation::spawn(async move {
                commit
                    .await
                    .map(|()| MutationOutcome::Applied)
                    .map_err(EngineError::RemoteWriteFailed)
            }),
        }
    }

    /// Flips the completed flag of one subtask.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn toggle_subtask(&self, task_id: &TaskId, subtask_id: &SubtaskId) -> PendingMutation {
        let Some(task) = self.task(task_id) else {
            return PendingMutation::ready(Err(EngineError::not_found("task", task_id)));
        };
        let Some(subtask) = task.subtask(subtask_id) else {
            return PendingMutation::ready(Err(EngineError::not_found("subtask", subtask_id)));
        };
        self.update_subtask_completion(task_id, subtask_id, !subtask.completed)
    }

    /// Appends an open subtask. Not optimistic.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn add_subtask(&self, task_id: &TaskId, title: impl Into<String>) -> PendingMutation {
        let Some(task) = self.task(task_id) else {
            return PendingMutation::ready(Err(EngineError::not_found("task", task_id)));
        };
        let subtask = Subtask::new(SubtaskId::generate(), title);
        let subtask_id = subtask.id.clone();
        let mut subtasks = task.subtasks;
        subtasks.push(subtask);

        let write = self.remote_update(task_id, subtasks_document(&subtasks));
        let task_id = task_id.clone();
        PendingMutation::spawn(async move {
            write
                .await
                .map(|()| MutationOutcome::SubtaskAdded(subtask_id))
                .map_err(|error| EngineError::from_write("task", &task_id, error))
        })
    }

    /// Removes a subtask. Not optimistic.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn remove_subtask(&self, task_id: &TaskId, subtask_id: &SubtaskId) -> PendingMutation {
        let Some(task) = self.task(task_id) else {
            return PendingMutation::ready(Err(EngineError::not_found("task", task_id)));
        };
        if task.subtask(subtask_id).is_none() {
            return PendingMutation::ready(Ok(MutationOutcome::Unchanged(
                UnchangedReason::Missing,
            )));
        }
        let subtasks: Vec<Subtask> = task
            .subtasks
            .into_iter()
            .filter(|subtask| &subtask.id != subtask_id)
            .collect();

        let write = self.remote_update(task_id, subtasks_document(&subtasks));
        let task_id = task_id.clone();
        PendingMutation::spawn(async move {
            write
                .await
                .map(|()| MutationOutcome::Applied)
                .map_err(|error| EngineError::from_write("task", &task_id, error))
        })
    }

    // -------------------------------------------------------------------------
    // Update and Delete
    // -------------------------------------------------------------------------

    /// Merges the patched fields into the stored task in a single write.
    ///
    /// The snapshot is left alone; the change arrives with the next push.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn update(&self, task_id: &TaskId, patch: &TaskPatch) -> PendingMutation {
        if patch.is_empty() {
            return PendingMutation::ready(Ok(MutationOutcome::Unchanged(
                UnchangedReason::EmptyPatch,
            )));
        }
        let write = self.remote_update(task_id, patch_to_document(patch));
        let task_id = task_id.clone();
        PendingMutation::spawn(async move {
            match write.await {
                Ok(()) => Ok(MutationOutcome::Applied),
                Err(error) => {
                    tracing::warn!(task_id = %task_id, %error, "Task update failed");
                    Err(EngineError::from_write("task", &task_id, error))
                }
            }
        })
    }

    /// Deletes a task from the store.
    ///
    /// The snapshot is left alone; the task disappears with the next push.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn delete(&self, task_id: &TaskId) -> PendingMutation {
        let write = self
            .store
            .delete(&self.collection, &Self::document_id(task_id));
        let task_id = task_id.clone();
        tracing::info!(task_id = %task_id, "Deleting task");
        PendingMutation::spawn(async move {
            match write.await {
                Ok(()) => Ok(MutationOutcome::Applied),
                Err(error) => {
                    tracing::warn!(task_id = %task_id, %error, "Task deletion failed");
                    Err(EngineError::RemoteWriteFailed(error))
                }
            }
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
