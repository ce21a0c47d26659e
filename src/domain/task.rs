//! Task domain model.
//!
//! Tasks are the records shown on the board. Each task moves through the
//! fixed workflow stages in [`Status`] and owns an ordered list of
//! [`Subtask`]s.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::contact::ContactId;

// =============================================================================
// Value Objects - Newtypes
// =============================================================================

/// Unique identifier for a task.
///
/// Ids received from the store are kept verbatim, so this wraps a string
/// rather than a UUID. Locally generated ids are UUID v7: a millisecond
/// timestamp prefix followed by random bits, which keeps collisions out of
/// reach even for rapid creation from a single client.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a `TaskId` from an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a new time-ordered `TaskId`.
    ///
    /// **Note**: This is an impure function (side effect: time + random).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Unique identifier for a subtask.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubtaskId(String);

impl SubtaskId {
    /// Creates a `SubtaskId` from an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a new time-ordered `SubtaskId`.
    ///
    /// **Note**: This is an impure function (side effect: time + random).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubtaskId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl From<&str> for SubtaskId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A timestamp wrapper for `DateTime<Utc>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a `Timestamp` from a `DateTime<Utc>`.
    #[must_use]
    pub const fn from_datetime(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }

    /// Returns the inner `DateTime<Utc>`.
    #[must_use]
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Returns the current time as a `Timestamp`.
    ///
    /// **Note**: This is an impure function (side effect: system clock).
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

// =============================================================================
// Enums
// =============================================================================

/// The workflow stage of a task.
///
/// Stages are ordered from left to right as they appear on the board.
/// Any stage may be reached from any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    /// Not started.
    Todo,
    /// Being worked on.
    InProgress,
    /// Waiting for feedback from someone else.
    AwaitFeedback,
    /// Finished. The only terminal stage.
    Done,
}

impl Status {
    /// The stage a task starts in, and the fallback for unknown values.
    pub const FIRST: Self = Self::Todo;

    /// All stages in board order.
    pub const ALL: [Self; 4] = [Self::Todo, Self::InProgress, Self::AwaitFeedback, Self::Done];

    /// Returns `true` for the terminal stage.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done)
    }

    /// Returns the position of this stage on the board.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Todo => 0,
            Self::InProgress => 1,
            Self::AwaitFeedback => 2,
            Self::Done => 3,
        }
    }

    /// Returns the canonical wire form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in-progress",
            Self::AwaitFeedback => "await-feedback",
            Self::Done => "done",
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::FIRST
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Todo => write!(formatter, "To do"),
            Self::InProgress => write!(formatter, "In progress"),
            Self::AwaitFeedback => write!(formatter, "Await feedback"),
            Self::Done => write!(formatter, "Done"),
        }
    }
}

/// The priority level of a task.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Low priority.
    Low,
    /// Medium priority.
    #[default]
    Medium,
    /// Urgent. The highest priority.
    Urgent,
}

impl Priority {
    /// The highest priority level.
    pub const HIGHEST: Self = Self::Urgent;

    /// Returns the canonical wire form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::Urgent => "urgent",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(formatter, "Low"),
            Self::Medium => write!(formatter, "Medium"),
            Self::Urgent => write!(formatter, "Urgent"),
        }
    }
}

/// Where a task came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskSource {
    /// Created by a board member.
    #[default]
    Member,
    /// Submitted from outside the board (e.g. a request form).
    External,
}

impl TaskSource {
    /// Returns the canonical wire form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::External => "external",
        }
    }
}

// =============================================================================
// Subtask
// =============================================================================

/// A checklist item within a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    /// Unique identifier for the subtask.
    pub id: SubtaskId,
    /// Title of the subtask.
    pub title: String,
    /// Whether the subtask has been completed.
    pub completed: bool,
}

impl Subtask {
    /// Creates a new, open subtask.
    #[must_use]
    pub fn new(id: SubtaskId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            completed: false,
        }
    }

    /// Returns a new subtask with the completed flag set to the given value.
    #[must_use]
    pub fn with_completed(self, completed: bool) -> Self {
        Self { completed, ..self }
    }
}

// =============================================================================
// Provenance
// =============================================================================

/// Who created a task.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Creator {
    /// Uid of the signed-in user, or `"anonymous"`.
    pub created_by: Option<String>,
    /// Kind of creator.
    pub creator_type: TaskSource,
    /// Display name supplied by the creator.
    pub name: Option<String>,
    /// Email supplied by the creator.
    pub email: Option<String>,
}

// =============================================================================
// Task
// =============================================================================

/// A task on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier. Immutable once assigned.
    pub id: TaskId,
    /// Title of the task.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Category label (e.g. "Technical Task", "User Story").
    pub category: String,
    /// Priority level.
    pub priority: Priority,
    /// Current workflow stage.
    pub status: Status,
    /// Contacts the task is assigned to. Order is irrelevant.
    pub assigned_to: BTreeSet<ContactId>,
    /// Calendar due date, if one was set.
    pub due_date: Option<NaiveDate>,
    /// Checklist items in insertion order.
    pub subtasks: Vec<Subtask>,
    /// When the task was created.
    pub created_at: Timestamp,
    /// When the task was last written, if ever.
    pub updated_at: Option<Timestamp>,
    /// Where the task came from.
    pub source: TaskSource,
    /// Creator provenance.
    pub creator: Creator,
}

impl Task {
    /// Creates a task with default fields.
    ///
    /// This is a pure function; obtain `id` and `created_at` at the
    /// effect boundary.
    #[must_use]
    pub fn new(id: TaskId, title: impl Into<String>, created_at: Timestamp) -> Self {
        Self {
            id,
            title: title.into(),
            description: String::new(),
            category: String::new(),
            priority: Priority::default(),
            status: Status::FIRST,
            assigned_to: BTreeSet::new(),
            due_date: None,
            subtasks: Vec::new(),
            created_at,
            updated_at: None,
            source: TaskSource::default(),
            creator: Creator::default(),
        }
    }

    /// Returns a new task with the given status.
    #[must_use]
    pub fn with_status(self, status: Status) -> Self {
        Self { status, ..self }
    }

    /// Returns a new task with the given priority.
    #[must_use]
    pub fn with_priority(self, priority: Priority) -> Self {
        Self { priority, ..self }
    }

    /// Returns a new task with the given description.
    #[must_use]
    pub fn with_description(self, description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..self
        }
    }

    /// Returns a new task with the given category.
    #[must_use]
    pub fn with_category(self, category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            ..self
        }
    }

    /// Returns a new task with the given due date.
    #[must_use]
    pub fn with_due_date(self, due_date: NaiveDate) -> Self {
        Self {
            due_date: Some(due_date),
            ..self
        }
    }

    /// Returns a new task with the given subtasks (replacing existing ones).
    #[must_use]
    pub fn with_subtasks(self, subtasks: Vec<Subtask>) -> Self {
        Self { subtasks, ..self }
    }

    /// Returns the subtask with the given id.
    #[must_use]
    pub fn subtask(&self, subtask_id: &SubtaskId) -> Option<&Subtask> {
        self.subtasks.iter().find(|subtask| &subtask.id == subtask_id)
    }

    /// Returns the number of completed subtasks.
    #[must_use]
    pub fn completed_subtask_count(&self) -> usize {
        self.subtasks
            .iter()
            .filter(|subtask| subtask.completed)
            .count()
    }

    /// Returns the progress of subtasks as a ratio (0.0 to 1.0).
    ///
    /// Returns 0.0 if there are no subtasks, matching an empty progress bar.
    #[must_use]
    pub fn subtask_progress(&self) -> f64 {
        let total = self.subtasks.len();
        if total == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let progress = self.completed_subtask_count() as f64 / total as f64;
        progress
    }

    /// Returns `true` if the task is in the terminal stage.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// =============================================================================
// Drafts and Patches
// =============================================================================

/// Caller-supplied fields for a new task.
///
/// The engine assigns the id, timestamps and creator uid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskDraft {
    /// Title of the task.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Category label.
    pub category: String,
    /// Priority level.
    pub priority: Priority,
    /// Initial workflow stage.
    pub status: Status,
    /// Assignees.
    pub assigned_to: BTreeSet<ContactId>,
    /// Due date.
    pub due_date: Option<NaiveDate>,
    /// Initial subtasks.
    pub subtasks: Vec<Subtask>,
    /// Where the task came from.
    pub source: TaskSource,
    /// Creator name for external submissions.
    pub creator_name: Option<String>,
    /// Creator email for external submissions.
    pub creator_email: Option<String>,
}

impl TaskDraft {
    /// Creates a draft with the given title and defaults for everything else.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// A partial update to a task. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New category.
    pub category: Option<String>,
    /// New priority.
    pub priority: Option<Priority>,
    /// New status.
    pub status: Option<Status>,
    /// Replacement assignee set.
    pub assigned_to: Option<BTreeSet<ContactId>>,
    /// New due date. `Some(None)` clears it.
    pub due_date: Option<Option<NaiveDate>>,
    /// Wholesale replacement of the subtask list.
    pub subtasks: Option<Vec<Subtask>>,
}

impl TaskPatch {
    /// Returns `true` if the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.priority.is_none()
            && self.status.is_none()
            && self.assigned_to.is_none()
            && self.due_date.is_none()
            && self.subtasks.is_none()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn test_task(title: &str) -> Task {
        Task::new(TaskId::generate(), title, Timestamp::now())
    }

    fn test_subtask(title: &str) -> Subtask {
        Subtask::new(SubtaskId::generate(), title)
    }

    #[rstest]
    fn test_task_id_generate_creates_unique_ids() {
        let ids: std::collections::HashSet<TaskId> = (0..1000).map(|_| TaskId::generate()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[rstest]
    fn test_task_id_keeps_legacy_ids_verbatim() {
        let task_id = TaskId::new("1712345678-abc123xyz");
        assert_eq!(task_id.as_str(), "1712345678-abc123xyz");
        assert_eq!(format!("{task_id}"), "1712345678-abc123xyz");
    }

    #[rstest]
    fn test_status_order_follows_board() {
        assert!(Status::Todo < Status::InProgress);
        assert!(Status::InProgress < Status::AwaitFeedback);
        assert!(Status::AwaitFeedback < Status::Done);
        assert_eq!(Status::FIRST, Status::Todo);
    }

    #[rstest]
    #[case(Status::Todo, false)]
    #[case(Status::InProgress, false)]
    #[case(Status::AwaitFeedback, false)]
    #[case(Status::Done, true)]
    fn test_status_is_terminal(#[case] status: Status, #[case] expected: bool) {
        assert_eq!(status.is_terminal(), expected);
    }

    #[rstest]
    fn test_status_index_matches_all() {
        for (position, status) in Status::ALL.iter().enumerate() {
            assert_eq!(status.index(), position);
        }
    }

    #[rstest]
    fn test_status_serializes_kebab_case() {
        let json = serde_json::to_string(&Status::AwaitFeedback).unwrap();
        assert_eq!(json, "\"await-feedback\"");
        assert_eq!(Status::AwaitFeedback.as_str(), "await-feedback");
    }

    #[rstest]
    fn test_priority_ordering() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::Medium < Priority::Urgent);
        assert_eq!(Priority::HIGHEST, Priority::Urgent);
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[rstest]
    fn test_task_new_defaults() {
        let task = test_task("Write docs");
        assert_eq!(task.status, Status::Todo);
        assert_eq!(task.priority, Priority::Medium);
        assert!(task.subtasks.is_empty());
        assert!(task.due_date.is_none());
        assert_eq!(task.source, TaskSource::Member);
    }

    #[rstest]
    fn test_subtask_progress() {
        let task = test_task("Test").with_subtasks(vec![
            test_subtask("One").with_completed(true),
            test_subtask("Two"),
        ]);
        assert_eq!(task.completed_subtask_count(), 1);
        assert!((task.subtask_progress() - 0.5).abs() < f64::EPSILON);
    }

    #[rstest]
    fn test_subtask_progress_empty() {
        let task = test_task("Test");
        assert!(task.subtask_progress().abs() < f64::EPSILON);
    }

    #[rstest]
    fn test_subtask_lookup() {
        let subtask = test_subtask("Find me");
        let task = test_task("Test").with_subtasks(vec![test_subtask("Other"), subtask.clone()]);
        assert_eq!(task.subtask(&subtask.id), Some(&subtask));
        assert!(task.subtask(&SubtaskId::new("missing")).is_none());
    }

    #[rstest]
    fn test_task_patch_is_empty() {
        assert!(TaskPatch::default().is_empty());
        let patch = TaskPatch {
            due_date: Some(None),
            ..TaskPatch::default()
        };
        assert!(!patch.is_empty());
    }
}
