//! Client-side synchronisation core.
//!
//! - `listener`: keeps a snapshot in step with a remote collection
//! - `snapshot`: replay-latest store for the current collection contents
//! - `engine`: optimistic task mutations with revert on failure
//! - `projections`: pure views over a task snapshot
//! - `contacts`: the contact directory
//! - `daily_limit`: the daily quota for external submissions
//! - `normalize`: lenient decoding of stored documents

pub mod contacts;
pub mod daily_limit;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod listener;
pub mod normalize;
pub mod projections;
pub mod reconcile;
pub mod snapshot;

pub use contacts::ContactDirectory;
pub use daily_limit::{DEFAULT_DAILY_LIMIT, DailyLimit, DailyLimitInfo, LIMIT_CACHE_TTL};
pub use debounce::{DEFAULT_TOGGLE_WINDOW, ToggleDebouncer};
pub use engine::{MutationOutcome, PendingMutation, TaskEngine, UnchangedReason};
pub use error::EngineError;
pub use listener::{CollectionListener, ListenerState, contact_name_order, newest_task_first};
pub use normalize::{normalize_contact, normalize_priority, normalize_status, normalize_task};
pub use projections::{
    BoardColumns, BoardStats, by_status, next_urgent_deadline, search, stats, urgent,
};
pub use reconcile::{LocalChange, Reconciliation, apply_then_reconcile};
pub use snapshot::{SnapshotStore, SnapshotStream};
