//! Derived views over a task snapshot.
//!
//! Every function here is pure: it reads a slice of tasks and returns new
//! values without touching the input. Boards hold tens to low hundreds of
//! tasks, so each view is a plain linear pass recomputed on every push.

use chrono::NaiveDate;

use crate::domain::{Priority, Status, Task};

// =============================================================================
// Board Columns
// =============================================================================

/// Tasks partitioned by workflow stage, one column per [`Status`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardColumns {
    columns: [Vec<Task>; 4],
}

impl BoardColumns {
    /// Returns the tasks in the column for `status`.
    #[must_use]
    pub fn column(&self, status: Status) -> &[Task] {
        &self.columns[status.index()]
    }

    /// Iterates over the columns in board order.
    pub fn iter(&self) -> impl Iterator<Item = (Status, &[Task])> {
        Status::ALL
            .iter()
            .map(|status| (*status, self.column(*status)))
    }

    /// Returns the total number of tasks across all columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.iter().map(Vec::len).sum()
    }

    /// Returns `true` if every column is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.iter().all(Vec::is_empty)
    }
}

/// Partitions tasks into board columns, keeping snapshot order within each.
#[must_use]
pub fn by_status(tasks: &[Task]) -> BoardColumns {
    let mut columns = BoardColumns::default();
    for task in tasks {
        columns.columns[task.status.index()].push(task.clone());
    }
    columns
}

// =============================================================================
// Filters
// =============================================================================

fn is_open_urgent(task: &Task) -> bool {
    !task.status.is_terminal() && task.priority == Priority::HIGHEST
}

/// Open tasks at the highest priority.
#[must_use]
pub fn urgent(tasks: &[Task]) -> Vec<Task> {
    tasks.iter().filter(|task| is_open_urgent(task)).cloned().collect()
}

/// Case-insensitive substring search over title, description and category.
///
/// A blank query matches every task.
#[must_use]
pub fn search(tasks: &[Task], query: &str) -> Vec<Task> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return tasks.to_vec();
    }
    tasks
        .iter()
        .filter(|task| {
            [&task.title, &task.description, &task.category]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle))
        })
        .cloned()
        .collect()
}

/// Earliest due date among open urgent tasks, or `None` when there is none.
#[must_use]
pub fn next_urgent_deadline(tasks: &[Task]) -> Option<NaiveDate> {
    tasks
        .iter()
        .filter(|task| is_open_urgent(task))
        .filter_map(|task| task.due_date)
        .min()
}

// =============================================================================
// Summary
// =============================================================================

/// Counts shown on the board summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoardStats {
    /// All tasks.
    pub total: usize,
    /// Tasks in [`Status::Todo`].
    pub todo: usize,
    /// Tasks in [`Status::InProgress`].
    pub in_progress: usize,
    /// Tasks in [`Status::AwaitFeedback`].
    pub await_feedback: usize,
    /// Tasks in [`Status::Done`].
    pub done: usize,
    /// Open tasks at the highest priority.
    pub urgent: usize,
}

/// Summarises a snapshot.
#[must_use]
pub fn stats(tasks: &[Task]) -> BoardStats {
    tasks.iter().fold(
        BoardStats {
            total: tasks.len(),
            ..BoardStats::default()
        },
        |mut stats, task| {
            match task.status {
                Status::Todo => stats.todo += 1,
                Status::InProgress => stats.in_progress += 1,
                Status::AwaitFeedback => stats.await_feedback += 1,
                Status::Done => stats.done += 1,
            }
            if is_open_urgent(task) {
                stats.urgent += 1;
            }
            stats
        },
    )
}

// =============================================================================
// Tests
// =============================================================================
