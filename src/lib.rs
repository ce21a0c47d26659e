//! # taskboard
//!
//! Client-side synchronisation core for a shared task board.
//!
//! ## Overview
//!
//! The crate keeps a local, always-readable snapshot of a remote document
//! collection, applies task mutations optimistically and reverts them when
//! the remote write fails, and derives board views from the snapshot. It
//! includes:
//!
//! - **Domain**: tasks, subtasks, contacts and the signed-in identity
//! - **Infrastructure**: the document store and identity seams, plus an
//!   in-memory store with fail injection
//! - **Sync**: collection listeners, snapshot stores, the mutation engine,
//!   the contact directory and the pure projections
//! - **Board**: the composition root wiring all of the above together
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use taskboard::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), EngineError> {
//! let identity = Arc::new(SessionIdentity::anonymous());
//! let (board, _store) = Board::in_memory(identity, SyncConfig::default());
//! board.wait_live().await?;
//!
//! let outcome = board.engine().create(TaskDraft::new("Write release notes")).await?;
//! assert!(matches!(outcome, MutationOutcome::Created(_)));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_closure_for_method_calls)]

/// Prelude module for convenient imports.
///
/// # Usage
///
/// ```rust
/// use taskboard::prelude::*;
/// ```
pub mod prelude {
    pub use crate::board::Board;
    pub use crate::config::{LogFormat, SyncConfig};
    pub use crate::domain::*;
    pub use crate::infrastructure::{
        DocumentStore, IdentityProvider, InMemoryDocumentStore, SessionIdentity, StoreError,
    };
    pub use crate::sync::{
        BoardColumns, BoardStats, ContactDirectory, DailyLimit, DailyLimitInfo, EngineError,
        MutationOutcome, PendingMutation, TaskEngine, UnchangedReason,
    };
}

pub mod board;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod sync;
pub mod telemetry;

pub use board::Board;
pub use config::SyncConfig;
