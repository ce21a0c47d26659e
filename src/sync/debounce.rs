//! Debouncing for repeated subtask toggles.
//!
//! A double click on a checkbox should flip it once, not twice. The
//! debouncer drops toggles of the same subtask that arrive within a short
//! window of the last accepted one. It is a UI smoothing aid; the engine
//! never consults it.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::domain::{SubtaskId, TaskId};

/// Default window between accepted toggles of the same subtask.
pub const DEFAULT_TOGGLE_WINDOW: Duration = Duration::from_millis(300);

const PRUNE_THRESHOLD: usize = 256;

/// Leading-edge debouncer keyed by task and subtask.
#[derive(Debug)]
pub struct ToggleDebouncer {
    window: Duration,
    accepted: Mutex<HashMap<(TaskId, SubtaskId), Instant>>,
}

impl Default for ToggleDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_TOGGLE_WINDOW)
    }
}

impl ToggleDebouncer {
    /// Creates a debouncer. A zero window accepts every toggle.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            accepted: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the configured window.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Returns `true` if a toggle of this subtask should go through now.
    ///
    /// An accepted toggle starts a new window; rejected ones do not extend it.
    pub fn should_fire(&self, task_id: &TaskId, subtask_id: &SubtaskId) -> bool {
        if self.window.is_zero() {
            return true;
        }
        let now = Instant::now();
        let mut accepted = self.accepted.lock();
        let key = (task_id.clone(), subtask_id.clone());
        if let Some(last) = accepted.get(&key)
            && now.duration_since(*last) < self.window
        {
            tracing::debug!(task_id = %task_id, subtask_id = %subtask_id, "Toggle debounced");
            return false;
        }
        accepted.insert(key, now);
        if accepted.len() > PRUNE_THRESHOLD {
            let window = self.window;
            accepted.retain(|_, last| now.duration_since(*last) < window);
        }
        true
    }
}
