//! Common test helpers for integration tests.
//!
//! Builds boards over the in-memory store, seeds raw documents the way
//! another client would write them, and waits for the task snapshot to
//! reach an expected state.
//!
//! # Usage
//!
//! ```ignore
//! mod common;
//! use common::{connected_board, seed, settle};
//! ```
//!
//! # Note
//!
//! Each integration test file is compiled as its own crate, so helpers used
//! by only some of them would otherwise trigger dead code warnings.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use taskboard::Board;
use taskboard::config::SyncConfig;
use taskboard::domain::{Task, UserIdentity};
use taskboard::infrastructure::{
    CollectionName, Document, DocumentId, DocumentStore, InMemoryDocumentStore, SessionIdentity,
};

/// How long a test waits for the snapshot to catch up with the store.
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Board Creation Helpers
// =============================================================================

/// Connects a board for `uid-1` over a fresh in-memory store and waits for
/// both subscriptions to go live.
pub async fn connected_board() -> (Board, InMemoryDocumentStore) {
    connected_board_with(SyncConfig::default()).await
}

/// Same as [`connected_board`] with an explicit configuration.
pub async fn connected_board_with(config: SyncConfig) -> (Board, InMemoryDocumentStore) {
    let identity = Arc::new(SessionIdentity::signed_in(UserIdentity::new("uid-1")));
    let (board, store) = Board::in_memory(identity, config);
    board.wait_live().await.expect("board should go live");
    (board, store)
}

// =============================================================================
// Seeding Helpers
// =============================================================================

/// Converts a JSON object literal into a document body.
pub fn document(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Writes a raw document directly to the store, bypassing the engine.
pub async fn seed(store: &InMemoryDocumentStore, collection: &CollectionName, id: &str, value: Value) {
    store
        .set(collection, &DocumentId::new(id), document(value))
        .await
        .expect("seed write should succeed");
}

/// Writes a raw task document to the default tasks collection.
pub async fn seed_task(board: &Board, store: &InMemoryDocumentStore, id: &str, value: Value) {
    seed(store, &board.config().tasks_collection, id, value).await;
}

// =============================================================================
// Snapshot Helpers
// =============================================================================

/// Waits until the task snapshot satisfies `predicate` and returns it.
///
/// # Panics
///
/// Panics if the snapshot does not settle within [`SETTLE_TIMEOUT`].
pub async fn settle<F>(board: &Board, predicate: F) -> Arc<[Task]>
where
    F: Fn(&[Task]) -> bool,
{
    let mut stream = board.observe_tasks();
    tokio::time::timeout(SETTLE_TIMEOUT, async {
        loop {
            match stream.next().await {
                Some(tasks) if predicate(&tasks) => return tasks,
                Some(_) => {}
                None => panic!("task snapshot closed"),
            }
        }
    })
    .await
    .expect("task snapshot did not settle")
}

/// Finds a task in a snapshot by id.
pub fn find<'a>(tasks: &'a [Task], id: &str) -> &'a Task {
    tasks
        .iter()
        .find(|task| task.id.as_str() == id)
        .unwrap_or_else(|| panic!("task {id} missing from snapshot"))
}
