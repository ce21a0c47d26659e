//! Domain models for the task board.
//!
//! This module contains the core domain types:
//! - Task: the records on the board, with subtasks and provenance
//! - Contact: assignees, with derived ids and avatars
//! - Identity: the signed-in user

pub mod contact;
pub mod identity;
pub mod task;

pub use contact::{
    AVATAR_PALETTE, Contact, ContactDraft, ContactId, ContactPatch, avatar_color, canonical_email,
    initials, split_display_name,
};
pub use identity::{ANONYMOUS_UID, UserIdentity};
pub use task::{
    Creator, Priority, Status, Subtask, SubtaskId, Task, TaskDraft, TaskId, TaskPatch, TaskSource,
    Timestamp,
};
